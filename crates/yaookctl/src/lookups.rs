//! Locating the Kubernetes objects that back a Yaook replicated service.

use k8s_openapi::api::apps::v1::StatefulSet;
use tracing::debug;

use crate::control::ControlPlane;
use crate::error::RecoveryError;
use crate::kinds::ResourceKind;

pub const LABEL_PARENT_GROUP: &str = "state.yaook.cloud/parent-group";
pub const LABEL_PARENT_NAME: &str = "state.yaook.cloud/parent-name";
pub const LABEL_PARENT_PLURAL: &str = "state.yaook.cloud/parent-plural";

/// Name of the volume claim template holding the data-engine state.
pub const DATA_VOLUME: &str = "data";

/// Label selector matching children of the given Yaook resource.
pub fn parent_selector(kind: ResourceKind, name: &str) -> String {
    format!(
        "{LABEL_PARENT_GROUP}={},{LABEL_PARENT_NAME}={name},{LABEL_PARENT_PLURAL}={}",
        kind.group(),
        kind.plural()
    )
}

/// Name of the PVC backing ordinal `index` of a StatefulSet.
pub fn replica_pvc_name(sts_name: &str, index: u32) -> String {
    format!("{DATA_VOLUME}-{sts_name}-{index}")
}

/// Ordinal of a data PVC, if it belongs to `sts_name`.
pub fn pvc_ordinal(pvc_name: &str, sts_name: &str) -> Option<u32> {
    pvc_name
        .strip_prefix(&format!("{DATA_VOLUME}-{sts_name}-"))?
        .parse()
        .ok()
}

/// Find the single StatefulSet of a service and check that it is scaled to zero.
pub async fn find_downscaled_stateful_set(
    control: &dyn ControlPlane,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
) -> Result<StatefulSet, RecoveryError> {
    let selector = parent_selector(kind, name);
    let mut matches = control.list_stateful_sets(namespace, &selector).await?;
    debug!(%selector, count = matches.len(), "statefulsets matched");

    let sts = match matches.len() {
        0 => {
            return Err(RecoveryError::NotFound(format!(
                "StatefulSet of {kind} {namespace}/{name}"
            )))
        }
        1 => matches.remove(0),
        n => {
            return Err(RecoveryError::precondition(
                format!("{kind} {namespace}/{name} owns {n} StatefulSets, expected exactly one"),
                None,
            ))
        }
    };

    let sts_name = sts.metadata.name.clone().unwrap_or_default();
    let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    if replicas != 0 {
        return Err(RecoveryError::precondition(
            format!("StatefulSet {namespace}/{sts_name} still has {replicas} replicas"),
            Some(&format!(
                "pause the service (yaookctl pause {} {name}) and scale the StatefulSet to 0 first",
                kind.alias()
            )),
        ));
    }
    Ok(sts)
}

/// Data PVCs of a StatefulSet, ordered by replica ordinal.
pub async fn find_replica_pvcs(
    control: &dyn ControlPlane,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
    sts_name: &str,
) -> Result<Vec<String>, RecoveryError> {
    let pvcs = control
        .list_pvcs(namespace, &parent_selector(kind, name))
        .await?;

    let mut owned: Vec<(u32, String)> = pvcs
        .into_iter()
        .filter_map(|pvc| pvc.metadata.name)
        .filter_map(|pvc| pvc_ordinal(&pvc, sts_name).map(|ordinal| (ordinal, pvc)))
        .collect();
    owned.sort_by_key(|(ordinal, _)| *ordinal);

    Ok(owned.into_iter().map(|(_, pvc)| pvc).collect())
}
