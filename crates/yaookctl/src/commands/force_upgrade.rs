//! `yaookctl force-upgrade`

use anyhow::Result;
use clap::Args;
use kube::Client;
use yaookctl::confirm::confirmer_for;
use yaookctl::control::KubeControlPlane;
use yaookctl::upgrade::ForceUpgradeOrchestrator;
use yaookctl::{ui, CtlConfig, ResourceKind};

/// Force the upgrade of a stateful Yaook agent.
///
/// Strips the finalizer of the resource and thus skips any cleanup steps. If
/// the service does not come up properly afterwards, loss of the data plane
/// (running VMs, network routes) may be caused.
#[derive(Args)]
pub struct ForceUpgradeCommand {
    /// Kind of the resource: compute, l2, l3, dhcp or bgp.
    kind: String,

    /// Name of the resource, which is also the name of its node.
    name: String,

    /// Break the resource even if it is neither deleting nor requires recreation.
    #[arg(long)]
    break_even_if_unnecessary: bool,
}

impl ForceUpgradeCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        let kind = ResourceKind::parse_upgradable(&self.kind)?;
        let control = KubeControlPlane::new(client);
        let confirmer = confirmer_for(config.assume_yes);

        let report = ForceUpgradeOrchestrator::new(&control, confirmer.as_ref(), &config.namespace)
            .force_upgrade(kind, &self.name, self.break_even_if_unnecessary)
            .await?;

        ui::print_success(&format!(
            "{kind} {}/{} force-deleted (was {})",
            config.namespace, self.name, report.initial
        ));
        if !report.lock_removed {
            ui::print_info("no maintenance lock was held on the node");
        }
        Ok(())
    }
}
