//! One-shot pods that inspect a Galera data volume.
//!
//! Each probe mounts the replica's PVC read-only into a pod running the
//! service's own MariaDB image, waits for it to terminate, reads its log and
//! deletes it again. The recovery scan runs `mysqld --wsrep-recover` on a
//! scratch copy of the data directory so the volume itself is never written.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume,
    VolumeMount,
};
use kube::api::{Api, DeleteParams, LogParams, ObjectMeta, PostParams};
use kube::runtime::wait::await_condition;
use kube::Client;
use tracing::{debug, warn};

use crate::collector::{ProbeError, ReplicaStateSource};
use crate::config::ProbeSettings;
use crate::error::ControlPlaneError;

/// Label put on every probe pod so leftovers are easy to find.
pub const PROBE_LABEL: &str = "yaookctl.yaook.cloud/probe";

const SCRATCH_DIR: &str = "/tmp/wsrep-recover";

/// Which inspection a probe performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    ReadGrastate,
    WsrepRecover,
}

impl ProbeKind {
    fn label_value(self) -> &'static str {
        match self {
            Self::ReadGrastate => "grastate",
            Self::WsrepRecover => "wsrep-recover",
        }
    }

    /// Container command for this probe.
    pub fn command(self, data_dir: &str) -> Vec<String> {
        let script = match self {
            Self::ReadGrastate => format!("cat {data_dir}/grastate.dat"),
            Self::WsrepRecover => format!(
                "cp -a {data_dir}/. {SCRATCH_DIR}/ && \
                 exec mysqld --user=mysql --datadir={SCRATCH_DIR} \
                 --wsrep-recover --log-error=/dev/stderr 2>&1"
            ),
        };
        vec!["bash".to_string(), "-ec".to_string(), script]
    }
}

/// Build the pod manifest for a probe against `pvc`.
pub fn probe_pod(
    kind: ProbeKind,
    pvc: &str,
    image: &str,
    settings: &ProbeSettings,
) -> Pod {
    let labels = BTreeMap::from([(PROBE_LABEL.to_string(), kind.label_value().to_string())]);

    let mut volumes = vec![Volume {
        name: "data".to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: pvc.to_string(),
            read_only: Some(true),
        }),
        ..Volume::default()
    }];
    let mut mounts = vec![VolumeMount {
        name: "data".to_string(),
        mount_path: settings.data_dir.clone(),
        read_only: Some(true),
        ..VolumeMount::default()
    }];
    if kind == ProbeKind::WsrepRecover {
        volumes.push(Volume {
            name: "scratch".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        });
        mounts.push(VolumeMount {
            name: "scratch".to_string(),
            mount_path: SCRATCH_DIR.to_string(),
            ..VolumeMount::default()
        });
    }

    Pod {
        metadata: ObjectMeta {
            generate_name: Some(settings.name_prefix.clone()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: "probe".to_string(),
                image: Some(image.to_string()),
                image_pull_policy: Some(settings.image_pull_policy.clone()),
                command: Some(kind.command(&settings.data_dir)),
                volume_mounts: Some(mounts),
                ..Container::default()
            }],
            volumes: Some(volumes),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

fn is_finished(pod: Option<&Pod>) -> bool {
    pod.and_then(pod_phase)
        .is_some_and(|phase| phase == "Succeeded" || phase == "Failed")
}

/// [`ReplicaStateSource`] that spawns probe pods in the service namespace.
#[derive(Clone)]
pub struct KubeReplicaProbe {
    client: Client,
    namespace: String,
    image: String,
    settings: ProbeSettings,
}

impl KubeReplicaProbe {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        image: impl Into<String>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            image: image.into(),
            settings,
        }
    }

    async fn run(&self, kind: ProbeKind, pvc: &str) -> Result<String, ProbeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let manifest = probe_pod(kind, pvc, &self.image, &self.settings);

        let created = pods
            .create(&PostParams::default(), &manifest)
            .await
            .map_err(ControlPlaneError::from_kube)?;
        let name = created.metadata.name.clone().unwrap_or_default();
        debug!(pod = %name, replica = %pvc, probe = kind.label_value(), "probe pod created");

        let result = self.await_output(&pods, &name, pvc).await;

        if let Err(e) = pods.delete(&name, &DeleteParams::background()).await {
            warn!(pod = %name, error = %e, "failed to delete probe pod");
        }
        result
    }

    async fn await_output(
        &self,
        pods: &Api<Pod>,
        name: &str,
        pvc: &str,
    ) -> Result<String, ProbeError> {
        let finished = tokio::time::timeout(
            self.settings.timeout,
            await_condition(pods.clone(), name, is_finished),
        )
        .await
        .map_err(|_| ProbeError::Timeout {
            replica: pvc.to_string(),
            seconds: self.settings.timeout.as_secs(),
        })?
        .map_err(|e| ProbeError::Failed {
            replica: pvc.to_string(),
            message: e.to_string(),
        })?;

        let logs = pods
            .logs(name, &LogParams::default())
            .await
            .map_err(ControlPlaneError::from_kube)?;

        match finished.as_ref().and_then(pod_phase) {
            Some("Succeeded") => Ok(logs),
            phase => Err(ProbeError::Failed {
                replica: pvc.to_string(),
                message: format!(
                    "pod ended in phase {}: {}",
                    phase.unwrap_or("Unknown"),
                    logs.lines().last().unwrap_or_default()
                ),
            }),
        }
    }
}

#[async_trait]
impl ReplicaStateSource for KubeReplicaProbe {
    async fn read_replica_state(&self, replica_id: &str) -> Result<String, ProbeError> {
        self.run(ProbeKind::ReadGrastate, replica_id).await
    }

    async fn derive_replica_state_via_log_scan(
        &self,
        replica_id: &str,
    ) -> Result<String, ProbeError> {
        self.run(ProbeKind::WsrepRecover, replica_id).await
    }
}
