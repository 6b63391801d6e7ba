//! Galera force-bootstrap.
//!
//! The target replica gets `safe_to_bootstrap: 1` written into its
//! `grastate.dat` right before the regular startup script runs, which makes
//! the MariaDB entrypoint start a new primary component from that data.
//! Replicas below the target start unmodified and rejoin it.

use k8s_openapi::api::apps::v1::StatefulSet;

use super::{
    entrypoint_script, locate, pod_spec, replica_count, workload_name, Guard, PlanBuilder,
    RecoveryWorkloadPatch, CONTAINERS_PATH,
};
use crate::error::RecoveryError;

/// Name of the data-engine container in a MySQLService StatefulSet.
pub const GALERA_CONTAINER: &str = "mariadb-galera";

pub const GALERA_DATA_DIR: &str = "/var/lib/mysql";

const STRIPPED: [Guard; 3] = [Guard::LivenessProbe, Guard::StartupProbe, Guard::ReadinessProbe];

/// Prefix `script` with the bootstrap marker for ordinal `index` of `sts_name`.
pub fn inject_recovery_command(script: &str, index: u32, sts_name: &str) -> String {
    format!(
        "if [ \"$(hostname)\" = \"{sts_name}-{index}\" ]; then\n\
         \x20 echo 'yaookctl: forcing bootstrap from this replica' >&2\n\
         \x20 if grep -q '^safe_to_bootstrap:' {GALERA_DATA_DIR}/grastate.dat; then\n\
         \x20   sed -i 's/^safe_to_bootstrap:.*/safe_to_bootstrap: 1/' {GALERA_DATA_DIR}/grastate.dat\n\
         \x20 else\n\
         \x20   echo 'safe_to_bootstrap: 1' >> {GALERA_DATA_DIR}/grastate.dat\n\
         \x20 fi\n\
         fi\n\
         {script}"
    )
}

/// Image of the Galera container, reused for probe pods.
pub fn galera_image(sts: &StatefulSet) -> Result<String, RecoveryError> {
    let (_, container) = locate(&pod_spec(sts)?.containers, GALERA_CONTAINER, "main")?;
    container.image.clone().ok_or_else(|| {
        RecoveryError::ConfigurationMismatch(format!("container {GALERA_CONTAINER} has no image"))
    })
}

pub(super) fn plan(sts: &StatefulSet, target_index: u32) -> Result<RecoveryWorkloadPatch, RecoveryError> {
    let sts_name = workload_name(sts)?;
    let pod = pod_spec(sts)?;
    let (idx, container) = locate(&pod.containers, GALERA_CONTAINER, "main")?;
    let (arg_index, script) = entrypoint_script(container)?;

    let container_path = format!("{CONTAINERS_PATH}/{idx}");
    let command = inject_recovery_command(script, target_index, sts_name);
    let replicas = replica_count(target_index)?;

    let mut builder = PlanBuilder::default();
    builder
        .patch
        .replace(format!("{container_path}/command/{arg_index}"), command.clone())
        .replace("/spec/replicas", replicas);
    if sts.spec.as_ref().and_then(|s| s.min_ready_seconds).is_some() {
        builder.remove("/spec/minReadySeconds".to_string());
    }
    builder.strip_guards(&container_path, container, &STRIPPED);

    Ok(RecoveryWorkloadPatch {
        workload: sts_name.to_string(),
        target_replica_index: target_index,
        container_command_override: command,
        init_command_override: None,
        replica_count_override: replicas,
        removed_guards: builder.removed,
        patch: builder.patch,
    })
}
