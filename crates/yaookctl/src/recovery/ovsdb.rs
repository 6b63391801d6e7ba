//! OVSDB disaster recovery.
//!
//! The raft cluster is rebuilt from one replica's database files. The setup
//! init container is replaced by a script that converts the target's clustered
//! databases into standalone copies and moves every replica's clustered files
//! aside. The ovsdb container then creates a fresh single-member cluster from
//! those copies on the target before its regular startup script runs; the
//! other replicas find no database and join it.

use k8s_openapi::api::apps::v1::StatefulSet;

use super::{
    entrypoint_script, locate, pod_spec, replica_count, workload_name, Guard, PlanBuilder,
    RecoveryWorkloadPatch, CONTAINERS_PATH, INIT_CONTAINERS_PATH,
};
use crate::error::RecoveryError;

pub const OVSDB_CONTAINER: &str = "ovsdb";
pub const SETUP_CONTAINER: &str = "setup-ovsdb";
pub const MONITORING_CONTAINER: &str = "ovsdb-monitoring";
pub const TLS_CONTAINER: &str = "ssl-terminator";

pub const OVSDB_DATA_DIR: &str = "/var/lib/openvswitch";

const STRIPPED: [Guard; 5] = [
    Guard::Lifecycle,
    Guard::LivenessProbe,
    Guard::ReadinessProbe,
    Guard::StartupProbe,
    Guard::SecurityContext,
];
const STRIPPED_TLS: [Guard; 2] = [Guard::LivenessProbe, Guard::ReadinessProbe];

/// Init-stage script preparing the data directory of every replica.
pub fn inject_init_recovery_command(index: u32, sts_name: &str) -> String {
    format!(
        "for db in {OVSDB_DATA_DIR}/*.db; do\n\
         \x20 [ -e \"$db\" ] || continue\n\
         \x20 if [ \"$(hostname)\" = \"{sts_name}-{index}\" ]; then\n\
         \x20   if ovsdb-tool db-is-clustered \"$db\"; then\n\
         \x20     ovsdb-tool cluster-to-standalone \"$db.standalone\" \"$db\"\n\
         \x20   else\n\
         \x20     cp -a \"$db\" \"$db.standalone\"\n\
         \x20   fi\n\
         \x20 fi\n\
         \x20 mv \"$db\" \"$db.pre-recovery\"\n\
         done\n"
    )
}

/// Prefix the ovsdb startup `script` with the cluster re-creation for the target.
pub fn inject_ovsdb_recovery_command(script: &str, index: u32, sts_name: &str) -> String {
    format!(
        "if [ \"$(hostname)\" = \"{sts_name}-{index}\" ]; then\n\
         \x20 for standalone in {OVSDB_DATA_DIR}/*.db.standalone; do\n\
         \x20   [ -e \"$standalone\" ] || continue\n\
         \x20   db=\"${{standalone%.standalone}}\"\n\
         \x20   [ -e \"$db\" ] || ovsdb-tool create-cluster \"$db\" \"$standalone\" \
         \"tcp:$(hostname -f):${{OVSDB_RAFT_PORT:-6644}}\"\n\
         \x20 done\n\
         fi\n\
         {script}"
    )
}

pub(super) fn plan(sts: &StatefulSet, target_index: u32) -> Result<RecoveryWorkloadPatch, RecoveryError> {
    let sts_name = workload_name(sts)?;
    let pod = pod_spec(sts)?;
    let (ovsdb_idx, ovsdb) = locate(&pod.containers, OVSDB_CONTAINER, "main")?;
    let init_containers = pod.init_containers.as_deref().unwrap_or_default();
    let (init_idx, _) = locate(init_containers, SETUP_CONTAINER, "init")?;
    let (arg_index, script) = entrypoint_script(ovsdb)?;

    let tls = locate(&pod.containers, TLS_CONTAINER, "sidecar").ok();
    let monitoring = locate(&pod.containers, MONITORING_CONTAINER, "sidecar").ok();

    let ovsdb_path = format!("{CONTAINERS_PATH}/{ovsdb_idx}");
    let init_path = format!("{INIT_CONTAINERS_PATH}/{init_idx}");
    let command = inject_ovsdb_recovery_command(script, target_index, sts_name);
    let init_command = vec![
        "bash".to_string(),
        "-ec".to_string(),
        inject_init_recovery_command(target_index, sts_name),
    ];
    let replicas = replica_count(target_index)?;

    let mut builder = PlanBuilder::default();
    builder
        .patch
        .add(format!("{init_path}/command"), init_command.clone())
        .replace(format!("{ovsdb_path}/command/{arg_index}"), command.clone())
        .replace("/spec/replicas", replicas);
    builder.strip_guards(&ovsdb_path, ovsdb, &STRIPPED);
    if let Some((idx, container)) = tls {
        builder.strip_guards(&format!("{CONTAINERS_PATH}/{idx}"), container, &STRIPPED_TLS);
    }
    // Must stay last: removing a container shifts the indices after it.
    if let Some((idx, _)) = monitoring {
        builder.remove(format!("{CONTAINERS_PATH}/{idx}"));
    }

    Ok(RecoveryWorkloadPatch {
        workload: sts_name.to_string(),
        target_replica_index: target_index,
        container_command_override: command,
        init_command_override: Some(init_command),
        replica_count_override: replicas,
        removed_guards: builder.removed,
        patch: builder.patch,
    })
}
