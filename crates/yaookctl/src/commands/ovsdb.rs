//! `yaookctl ovsdb ...`

use anyhow::Result;
use clap::{Args, Subcommand};
use kube::Client;
use yaookctl::confirm::confirmer_for;
use yaookctl::control::KubeControlPlane;
use yaookctl::recovery::{ForcedRecoveryOrchestrator, RecoveryVariant};
use yaookctl::{ui, CtlConfig};

/// Utilities to work with OVSDB clusters.
#[derive(Subcommand)]
pub enum OvsdbCommand {
    /// Rebuild the raft cluster from a single replica.
    ///
    /// The OVSDBService must be paused and its StatefulSet scaled to zero.
    DisasterRecovery(DisasterRecoveryCommand),
}

impl OvsdbCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        match self {
            Self::DisasterRecovery(cmd) => cmd.run(config, client).await,
        }
    }
}

#[derive(Args)]
pub struct DisasterRecoveryCommand {
    /// Name of the OVSDBService.
    name: String,

    /// Ordinal of the replica whose data is used.
    index: u32,
}

impl DisasterRecoveryCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        let control = KubeControlPlane::new(client);
        let confirmer = confirmer_for(config.assume_yes);
        let plan = ForcedRecoveryOrchestrator::new(&control, confirmer.as_ref(), &config.namespace)
            .force_bootstrap(RecoveryVariant::Ovsdb, &self.name, self.index)
            .await?;

        ui::print_success(&format!(
            "StatefulSet {}/{} recovers from {} with {} replica(s)",
            config.namespace,
            plan.workload,
            plan.source_pvc(),
            plan.replica_count_override
        ));
        ui::print_info("restore the replica count and health probes once the cluster is up");
        Ok(())
    }
}
