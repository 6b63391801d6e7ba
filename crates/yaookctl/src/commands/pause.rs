//! `yaookctl pause` / `yaookctl unpause`

use anyhow::Result;
use clap::Args;
use kube::Client;
use yaookctl::control::KubeControlPlane;
use yaookctl::{pause, ui, CtlConfig, ResourceKind};

/// Add the pause annotation to a Yaook resource.
///
/// Only the kinds yaookctl knows are accepted: mysql, ovsdb, compute, l2, l3,
/// dhcp and bgp. To keep a StatefulSet from being updated, pause its parent
/// Yaook resource.
#[derive(Args)]
pub struct PauseCommand {
    /// Kind of the resource: mysql, ovsdb, compute, l2, l3, dhcp or bgp
    /// (plurals such as `mysqlservices` work too).
    kind: String,

    name: String,

    /// Annotation value, defaults to a timestamped note.
    #[arg(long)]
    comment: Option<String>,
}

impl PauseCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        let kind: ResourceKind = self.kind.parse()?;
        let control = KubeControlPlane::new(client);
        let value = pause::pause(
            &control,
            &config.namespace,
            kind,
            &self.name,
            self.comment.clone(),
        )
        .await?;
        ui::print_success(&format!(
            "{kind} {}/{} paused: {value}",
            config.namespace, self.name
        ));
        Ok(())
    }
}

/// Remove the pause annotation from a Yaook resource.
#[derive(Args)]
pub struct UnpauseCommand {
    /// Kind of the resource: mysql, ovsdb, compute, l2, l3, dhcp or bgp
    /// (plurals such as `mysqlservices` work too).
    kind: String,

    name: String,
}

impl UnpauseCommand {
    pub async fn run(&self, config: &CtlConfig, client: Client) -> Result<()> {
        let kind: ResourceKind = self.kind.parse()?;
        let control = KubeControlPlane::new(client);
        if pause::unpause(&control, &config.namespace, kind, &self.name).await? {
            ui::print_success(&format!("{kind} {}/{} unpaused", config.namespace, self.name));
        } else {
            ui::print_info(&format!("{kind} {}/{} was not paused", config.namespace, self.name));
        }
        Ok(())
    }
}
