//! `yaookctl galera ...`

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Subcommand};
use kube::Client;
use tracing::info;
use yaookctl::collector::ReplicaStateCollector;
use yaookctl::confirm::confirmer_for;
use yaookctl::control::KubeControlPlane;
use yaookctl::lookups::{find_downscaled_stateful_set, find_replica_pvcs};
use yaookctl::probe::KubeReplicaProbe;
use yaookctl::recovery::galera::galera_image;
use yaookctl::recovery::{ForcedRecoveryOrchestrator, RecoveryVariant};
use yaookctl::resolver::{resolve, SelectionReason};
use yaookctl::{ui, CtlConfig, RecoveryError, ResourceKind};

/// Utilities to work with Galera clusters.
#[derive(Subcommand)]
pub enum GaleraCommand {
    /// Find the replica a stopped cluster should be bootstrapped from.
    ///
    /// Reads grastate.dat of every replica volume, falling back to
    /// `mysqld --wsrep-recover` when the position is unknown. The MySQLService
    /// must be paused and its StatefulSet scaled to zero.
    FindWsrepPositions(FindWsrepPositionsCommand),

    /// Force the cluster to bootstrap from one replica.
    ForceBootstrap(ForceBootstrapCommand),
}

impl GaleraCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        match self {
            Self::FindWsrepPositions(cmd) => cmd.run(config, client).await,
            Self::ForceBootstrap(cmd) => cmd.run(config, client).await,
        }
    }
}

#[derive(Args)]
pub struct FindWsrepPositionsCommand {
    /// Name of the MySQLService.
    name: String,

    /// Only print the name of the PVC to bootstrap from.
    #[arg(short, long)]
    quiet: bool,
}

impl FindWsrepPositionsCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        let ns = &config.namespace;
        let kind = ResourceKind::MySqlService;
        let control = KubeControlPlane::new(client.clone());

        let sts = find_downscaled_stateful_set(&control, ns, kind, &self.name).await?;
        let sts_name = sts.metadata.name.clone().unwrap_or_default();
        let image = galera_image(&sts)?;
        let pvcs = find_replica_pvcs(&control, ns, kind, &self.name, &sts_name).await?;
        info!(statefulset = %sts_name, replicas = pvcs.len(), "collecting replica state");

        let probe = KubeReplicaProbe::new(client, ns.clone(), image, config.probe.clone());
        let records = ReplicaStateCollector::new(Arc::new(probe))
            .collect_all(&pvcs)
            .await;
        let result = resolve(&records);

        if self.quiet {
            for line in ui::quiet_report(&result) {
                eprintln!("{line}");
            }
            return match &result.chosen_replica_id {
                Some(chosen) => {
                    println!("{chosen}");
                    Ok(())
                }
                None => Err(RecoveryError::NoBootstrapSource.into()),
            };
        }

        println!("{}", ui::replica_table(&result));
        for diagnostic in &result.diagnostics {
            ui::print_diagnostic(diagnostic);
        }

        match (&result.chosen_replica_id, result.reason) {
            (Some(chosen), Some(SelectionReason::SafeToBootstrap)) => {
                ui::print_success(&format!("{chosen} is marked safe to bootstrap"));
            }
            (Some(chosen), _) => {
                ui::print_success(&format!("{chosen} has the most recent position"));
            }
            (None, _) => return Err(RecoveryError::NoBootstrapSource.into()),
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ForceBootstrapCommand {
    /// Name of the MySQLService.
    name: String,

    /// Ordinal of the replica to bootstrap from.
    index: u32,
}

impl ForceBootstrapCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        let control = KubeControlPlane::new(client);
        let confirmer = confirmer_for(config.assume_yes);
        let plan = ForcedRecoveryOrchestrator::new(&control, confirmer.as_ref(), &config.namespace)
            .force_bootstrap(RecoveryVariant::Galera, &self.name, self.index)
            .await?;

        ui::print_success(&format!(
            "StatefulSet {}/{} bootstraps from {} with {} replica(s)",
            config.namespace,
            plan.workload,
            plan.source_pvc(),
            plan.replica_count_override
        ));
        for guard in &plan.removed_guards {
            ui::print_info(&format!("removed {guard}"));
        }
        Ok(())
    }
}
