//! Process-wide configuration.
//!
//! Built once from the command line in `main` and handed by reference to
//! every command; nothing reads ambient state after that.

use std::time::Duration;

use anyhow::{Context, Result};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::debug;

/// Immutable settings shared by all commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtlConfig {
    /// Namespace holding the Yaook resources.
    pub namespace: String,
    /// Kubeconfig context, `None` for the current one.
    pub context: Option<String>,
    /// Skip interactive confirmation prompts.
    pub assume_yes: bool,
    pub probe: ProbeSettings,
}

impl CtlConfig {
    /// Build the kube client and settle the namespace.
    ///
    /// An explicit namespace wins; otherwise the context's default namespace
    /// is used.
    pub async fn connect(
        namespace: Option<String>,
        context: Option<String>,
        assume_yes: bool,
    ) -> Result<(Self, Client)> {
        let kube_config = if context.is_some() {
            let options = KubeConfigOptions {
                context: context.clone(),
                ..KubeConfigOptions::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("Failed to load kube context {context:?}"))?
        } else {
            Config::infer().await.context("Failed to infer kube config")?
        };

        let namespace = namespace.unwrap_or_else(|| kube_config.default_namespace.clone());
        debug!(%namespace, context = ?context, cluster = %kube_config.cluster_url, "connecting");

        let client = Client::try_from(kube_config).context("Failed to create kube client")?;
        let config = Self {
            namespace,
            context,
            assume_yes,
            probe: ProbeSettings::default(),
        };
        Ok((config, client))
    }
}

/// Tunables for the one-shot pods that inspect replica volumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Upper bound for a probe pod to run to completion.
    pub timeout: Duration,
    pub image_pull_policy: String,
    /// `generateName` prefix of probe pods.
    pub name_prefix: String,
    /// Mount point of the Galera data volume inside the probe.
    pub data_dir: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            image_pull_policy: "IfNotPresent".to_string(),
            name_prefix: "yaookctl-probe-".to_string(),
            data_dir: "/var/lib/mysql".to_string(),
        }
    }
}
