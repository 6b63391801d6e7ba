//! Control plane access.
//!
//! [`ControlPlane`] is the narrow set of calls the orchestrators need. The
//! production implementation talks to the Kubernetes API through kube; tests
//! substitute an in-memory fake.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

use crate::error::{ControlPlaneError, RecoveryError};
use crate::kinds::ResourceKind;
use crate::patch::{JsonPatch, PatchError};

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Failure of a patch call.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Invalid(#[from] PatchError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

/// Calls against the orchestration store used by the recovery workflows.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch a Yaook custom resource.
    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ControlPlaneError>;

    /// Delete a Yaook custom resource. An already deleted object is not an error.
    async fn delete_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome, ControlPlaneError>;

    /// Apply a JSON patch to a Yaook custom resource.
    async fn patch_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<(), ApplyError>;

    /// Apply a JSON patch to a cluster-scoped Node.
    async fn patch_node(&self, name: &str, patch: &JsonPatch) -> Result<(), ApplyError>;

    /// List StatefulSets matching a label selector.
    async fn list_stateful_sets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<StatefulSet>, ControlPlaneError>;

    /// Apply a JSON patch to a StatefulSet.
    async fn patch_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<(), ApplyError>;

    /// List PersistentVolumeClaims matching a label selector.
    async fn list_pvcs(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PersistentVolumeClaim>, ControlPlaneError>;
}

/// [`ControlPlane`] backed by a kube client.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

fn json_patch(patch: &JsonPatch) -> Result<Patch<()>, PatchError> {
    Ok(Patch::Json(patch.to_wire()?))
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ControlPlaneError> {
        self.dynamic(kind, namespace)
            .get(name)
            .await
            .map_err(ControlPlaneError::from_kube)
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome, ControlPlaneError> {
        match self
            .dynamic(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(ControlPlaneError::from_kube)
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(e),
        }
    }

    async fn patch_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<(), ApplyError> {
        debug!(%kind, %namespace, %name, ops = patch.len(), "patching resource");
        let patch = json_patch(patch)?;
        self.dynamic(kind, namespace)
            .patch(name, &PatchParams::default(), &patch)
            .await
            .map_err(ControlPlaneError::from_kube)?;
        Ok(())
    }

    async fn patch_node(&self, name: &str, patch: &JsonPatch) -> Result<(), ApplyError> {
        debug!(node = %name, ops = patch.len(), "patching node");
        let patch = json_patch(patch)?;
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes
            .patch(name, &PatchParams::default(), &patch)
            .await
            .map_err(ControlPlaneError::from_kube)?;
        Ok(())
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<StatefulSet>, ControlPlaneError> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(ControlPlaneError::from_kube)?;
        Ok(list.items)
    }

    async fn patch_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<(), ApplyError> {
        debug!(statefulset = %name, %namespace, ops = patch.len(), "patching statefulset");
        let patch = json_patch(patch)?;
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &patch)
            .await
            .map_err(ControlPlaneError::from_kube)?;
        Ok(())
    }

    async fn list_pvcs(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PersistentVolumeClaim>, ControlPlaneError> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(ControlPlaneError::from_kube)?;
        Ok(list.items)
    }
}

impl From<ApplyError> for RecoveryError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Invalid(e) => Self::Patch(e),
            ApplyError::ControlPlane(e) => Self::ControlPlane(e),
        }
    }
}
