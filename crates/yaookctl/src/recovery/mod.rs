//! Forced recovery of a replicated data-engine StatefulSet.
//!
//! Both variants follow the same shape: locate the downscaled StatefulSet,
//! build one JSON patch that rewrites the data-engine entrypoint for the
//! target ordinal, scales to `index + 1` and strips the health gates, ask the
//! operator, then apply the patch in a single call.

pub mod galera;
pub mod ovsdb;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Container, PodSpec};
use tracing::{debug, info};

use crate::confirm::{self, Confirmer};
use crate::control::ControlPlane;
use crate::error::RecoveryError;
use crate::kinds::ResourceKind;
use crate::lookups::{find_downscaled_stateful_set, find_replica_pvcs, replica_pvc_name};
use crate::patch::JsonPatch;

pub(crate) const CONTAINERS_PATH: &str = "/spec/template/spec/containers";
pub(crate) const INIT_CONTAINERS_PATH: &str = "/spec/template/spec/initContainers";

/// Which data engine is being recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryVariant {
    Galera,
    Ovsdb,
}

impl RecoveryVariant {
    /// Yaook resource kind owning the StatefulSet.
    pub fn service_kind(self) -> ResourceKind {
        match self {
            Self::Galera => ResourceKind::MySqlService,
            Self::Ovsdb => ResourceKind::OvsdbService,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Galera => "MySQL",
            Self::Ovsdb => "OVSDB",
        }
    }

    /// Build the recovery patch for `sts` without touching the cluster.
    pub fn plan(
        self,
        sts: &StatefulSet,
        target_index: u32,
    ) -> Result<RecoveryWorkloadPatch, RecoveryError> {
        match self {
            Self::Galera => galera::plan(sts, target_index),
            Self::Ovsdb => ovsdb::plan(sts, target_index),
        }
    }
}

/// The mutation applied to the StatefulSet, with the pieces it was built from.
#[derive(Debug, Clone)]
pub struct RecoveryWorkloadPatch {
    pub workload: String,
    pub target_replica_index: u32,
    /// New last argument of the data-engine container command.
    pub container_command_override: String,
    /// Replacement init-container command (OVSDB only).
    pub init_command_override: Option<Vec<String>>,
    pub replica_count_override: i32,
    /// JSON pointers removed by the patch.
    pub removed_guards: Vec<String>,
    pub patch: JsonPatch,
}

impl RecoveryWorkloadPatch {
    /// PVC the recovery will bootstrap from.
    pub fn source_pvc(&self) -> String {
        replica_pvc_name(&self.workload, self.target_replica_index)
    }
}

/// Fields stripped from a container so a recovering replica is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    Lifecycle,
    LivenessProbe,
    ReadinessProbe,
    StartupProbe,
    SecurityContext,
}

impl Guard {
    fn field(self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::LivenessProbe => "livenessProbe",
            Self::ReadinessProbe => "readinessProbe",
            Self::StartupProbe => "startupProbe",
            Self::SecurityContext => "securityContext",
        }
    }

    fn is_set(self, container: &Container) -> bool {
        match self {
            Self::Lifecycle => container.lifecycle.is_some(),
            Self::LivenessProbe => container.liveness_probe.is_some(),
            Self::ReadinessProbe => container.readiness_probe.is_some(),
            Self::StartupProbe => container.startup_probe.is_some(),
            Self::SecurityContext => container.security_context.is_some(),
        }
    }
}

/// Collects patch operations and the list of stripped paths side by side.
#[derive(Debug, Default)]
pub(crate) struct PlanBuilder {
    pub patch: JsonPatch,
    pub removed: Vec<String>,
}

impl PlanBuilder {
    /// Emit a remove for each guard actually present on `container`.
    pub fn strip_guards(&mut self, container_path: &str, container: &Container, guards: &[Guard]) {
        for guard in guards.iter().filter(|g| g.is_set(container)) {
            self.remove(format!("{container_path}/{}", guard.field()));
        }
    }

    pub fn remove(&mut self, path: String) {
        self.patch.remove(path.clone());
        self.removed.push(path);
    }
}

pub(crate) fn workload_name(sts: &StatefulSet) -> Result<&str, RecoveryError> {
    sts.metadata
        .name
        .as_deref()
        .ok_or_else(|| RecoveryError::ConfigurationMismatch("StatefulSet has no name".into()))
}

pub(crate) fn pod_spec(sts: &StatefulSet) -> Result<&PodSpec, RecoveryError> {
    sts.spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .ok_or_else(|| {
            RecoveryError::ConfigurationMismatch(format!(
                "StatefulSet {} has no pod template",
                sts.metadata.name.as_deref().unwrap_or_default()
            ))
        })
}

/// Find a container by name, returning its index.
pub(crate) fn locate<'a>(
    containers: &'a [Container],
    name: &str,
    section: &str,
) -> Result<(usize, &'a Container), RecoveryError> {
    containers
        .iter()
        .enumerate()
        .find(|(_, c)| c.name == name)
        .ok_or_else(|| {
            RecoveryError::ConfigurationMismatch(format!("{section} container {name} not found"))
        })
}

/// Index and value of the script argument a container runs (its last command argument).
pub(crate) fn entrypoint_script(container: &Container) -> Result<(usize, &str), RecoveryError> {
    container
        .command
        .as_deref()
        .and_then(|cmd| cmd.last().map(|script| (cmd.len() - 1, script.as_str())))
        .ok_or_else(|| {
            RecoveryError::ConfigurationMismatch(format!(
                "container {} has no command to inject into",
                container.name
            ))
        })
}

pub(crate) fn replica_count(target_index: u32) -> Result<i32, RecoveryError> {
    i32::try_from(u64::from(target_index) + 1).map_err(|_| {
        RecoveryError::validation(format!("replica index {target_index} is out of range"), None)
    })
}

/// Drives a forced recovery against the control plane.
pub struct ForcedRecoveryOrchestrator<'a> {
    control: &'a dyn ControlPlane,
    confirmer: &'a dyn Confirmer,
    namespace: &'a str,
}

impl<'a> ForcedRecoveryOrchestrator<'a> {
    pub fn new(control: &'a dyn ControlPlane, confirmer: &'a dyn Confirmer, namespace: &'a str) -> Self {
        Self {
            control,
            confirmer,
            namespace,
        }
    }

    /// Force replica `target_index` of service `name` into recovery.
    ///
    /// Nothing is mutated unless the operator confirms. The returned plan is
    /// what was applied.
    pub async fn force_bootstrap(
        &self,
        variant: RecoveryVariant,
        name: &str,
        target_index: u32,
    ) -> Result<RecoveryWorkloadPatch, RecoveryError> {
        let kind = variant.service_kind();
        let sts = find_downscaled_stateful_set(self.control, self.namespace, kind, name).await?;
        let sts_name = workload_name(&sts)?;

        let source_pvc = replica_pvc_name(sts_name, target_index);
        let pvcs = find_replica_pvcs(self.control, self.namespace, kind, name, sts_name).await?;
        if !pvcs.contains(&source_pvc) {
            return Err(RecoveryError::NotFound(format!(
                "PersistentVolumeClaim {}/{source_pvc}",
                self.namespace
            )));
        }

        let plan = variant.plan(&sts, target_index)?;
        plan.patch.validate()?;
        debug!(
            statefulset = %sts_name,
            ops = plan.patch.len(),
            removed = ?plan.removed_guards,
            "recovery patch prepared"
        );

        confirm::require(
            self.confirmer,
            &format!(
                "The {} service {}/{sts_name} will be forced to recover from the PVC {source_pvc}. \
                 This is destructive. Continue?",
                variant.label(),
                self.namespace
            ),
            "force recovery",
        )?;

        self.control
            .patch_stateful_set(self.namespace, sts_name, &plan.patch)
            .await?;
        info!(
            statefulset = %sts_name,
            replicas = plan.replica_count_override,
            pvc = %source_pvc,
            "forced recovery patch applied"
        );
        Ok(plan)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Probe};
    use kube::api::ObjectMeta;

    pub fn container(name: &str, script: &str) -> Container {
        Container {
            name: name.to_string(),
            command: Some(vec!["bash".into(), "-ec".into(), script.to_string()]),
            liveness_probe: Some(Probe::default()),
            readiness_probe: Some(Probe::default()),
            ..Container::default()
        }
    }

    pub fn stateful_set(name: &str, containers: Vec<Container>, init: Vec<Container>) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::new()),
                ..ObjectMeta::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(0),
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers,
                        init_containers: (!init.is_empty()).then_some(init),
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                ..StatefulSetSpec::default()
            }),
            ..StatefulSet::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::container;
    use super::*;

    #[test]
    fn test_guard_removal_skips_absent_fields() {
        let mut c = container("db", "run");
        c.startup_probe = None;
        let mut builder = PlanBuilder::default();
        builder.strip_guards(
            "/spec/template/spec/containers/0",
            &c,
            &[Guard::LivenessProbe, Guard::StartupProbe, Guard::ReadinessProbe],
        );
        assert_eq!(
            builder.removed,
            vec![
                "/spec/template/spec/containers/0/livenessProbe",
                "/spec/template/spec/containers/0/readinessProbe",
            ]
        );
        assert_eq!(builder.patch.len(), 2);
    }

    #[test]
    fn test_entrypoint_script_is_last_argument() {
        let c = container("db", "exec mysqld");
        assert_eq!(entrypoint_script(&c).unwrap(), (2, "exec mysqld"));

        let bare = Container {
            name: "db".into(),
            ..Container::default()
        };
        assert!(matches!(
            entrypoint_script(&bare),
            Err(RecoveryError::ConfigurationMismatch(_))
        ));
    }

    #[test]
    fn test_locate_reports_missing_container() {
        let containers = vec![container("a", "x")];
        assert_eq!(locate(&containers, "a", "main").unwrap().0, 0);
        let err = locate(&containers, "b", "main").unwrap_err();
        assert_eq!(err.to_string(), "configuration mismatch: main container b not found");
    }

    #[test]
    fn test_replica_count() {
        assert_eq!(replica_count(0).unwrap(), 1);
        assert_eq!(replica_count(2).unwrap(), 3);
        assert!(replica_count(u32::MAX).is_err());
    }
}
