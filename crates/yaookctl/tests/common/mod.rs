//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, PodSpec, PodTemplateSpec, Probe,
};
use kube::api::{DynamicObject, ObjectMeta};
use serde_json::Value;
use yaookctl::confirm::Confirmer;
use yaookctl::control::{ApplyError, ControlPlane, DeleteOutcome};
use yaookctl::lookups::{parent_selector, replica_pvc_name};
use yaookctl::patch::JsonPatch;
use yaookctl::{ControlPlaneError, RecoveryError, ResourceKind};

// =============================================================================
// Recorded calls
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Delete { kind: ResourceKind, name: String },
    PatchResource { kind: ResourceKind, name: String, patch: Value },
    PatchNode { name: String, patch: Value },
    PatchStatefulSet { name: String, patch: Value },
}

/// Scripted outcome for the next patch of a given target.
pub enum Scripted {
    Unprocessable,
    NotFound,
    Conflict,
}

impl Scripted {
    fn into_error(self) -> ControlPlaneError {
        match self {
            Self::Unprocessable => ControlPlaneError::Unprocessable("path does not exist".into()),
            Self::NotFound => ControlPlaneError::NotFound("gone".into()),
            Self::Conflict => ControlPlaneError::Conflict("object has been modified".into()),
        }
    }
}

// =============================================================================
// Fake control plane
// =============================================================================

#[derive(Default)]
pub struct FakeControlPlane {
    pub resources: HashMap<(ResourceKind, String), DynamicObject>,
    pub stateful_sets: HashMap<String, Vec<StatefulSet>>,
    pub pvcs: HashMap<String, Vec<PersistentVolumeClaim>>,
    pub delete_outcome: Option<DeleteOutcome>,
    /// Resources the API server no longer knows about.
    removed: Mutex<HashSet<(ResourceKind, String)>>,
    resource_errors: Mutex<VecDeque<Scripted>>,
    node_errors: Mutex<VecDeque<Scripted>>,
    pub calls: Mutex<Vec<Call>>,
    pub reads: AtomicUsize,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, kind: ResourceKind, obj: DynamicObject) -> Self {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.resources.insert((kind, name), obj);
        self
    }

    /// Register a StatefulSet owned by `service` and one data PVC per ordinal.
    pub fn with_stateful_set(
        mut self,
        kind: ResourceKind,
        service: &str,
        sts: StatefulSet,
        pvc_count: u32,
    ) -> Self {
        let selector = parent_selector(kind, service);
        let sts_name = sts.metadata.name.clone().unwrap_or_default();
        let claims = (0..pvc_count)
            .rev()
            .map(|i| PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(replica_pvc_name(&sts_name, i)),
                    ..ObjectMeta::default()
                },
                ..PersistentVolumeClaim::default()
            })
            .collect();
        self.stateful_sets.entry(selector.clone()).or_default().push(sts);
        self.pvcs.insert(selector, claims);
        self
    }

    pub fn fail_next_resource_patch(&self, outcome: Scripted) {
        self.resource_errors.lock().unwrap().push_back(outcome);
    }

    pub fn fail_next_node_patch(&self, outcome: Scripted) {
        self.node_errors.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn wire(patch: &JsonPatch) -> Value {
    serde_json::to_value(patch).unwrap()
}

fn scripted(queue: &Mutex<VecDeque<Scripted>>) -> Result<(), ApplyError> {
    match queue.lock().unwrap().pop_front() {
        Some(outcome) => Err(ApplyError::ControlPlane(outcome.into_error())),
        None => Ok(()),
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_resource(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ControlPlaneError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.resources
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound(name.to_string()))
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome, ControlPlaneError> {
        self.record(Call::Delete {
            kind,
            name: name.to_string(),
        });
        let key = (kind, name.to_string());
        let outcome = self.delete_outcome.unwrap_or(DeleteOutcome::Deleted);
        let has_finalizers = self
            .resources
            .get(&key)
            .and_then(|obj| obj.metadata.finalizers.as_ref())
            .is_some_and(|f| !f.is_empty());
        // without finalizers the object disappears as soon as it is deleted
        if outcome == DeleteOutcome::AlreadyGone || !has_finalizers {
            self.removed.lock().unwrap().insert(key);
        }
        Ok(outcome)
    }

    async fn patch_resource(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<(), ApplyError> {
        patch.validate()?;
        self.record(Call::PatchResource {
            kind,
            name: name.to_string(),
            patch: wire(patch),
        });
        if self.removed.lock().unwrap().contains(&(kind, name.to_string())) {
            return Err(ApplyError::ControlPlane(ControlPlaneError::NotFound(name.to_string())));
        }
        scripted(&self.resource_errors)
    }

    async fn patch_node(&self, name: &str, patch: &JsonPatch) -> Result<(), ApplyError> {
        patch.validate()?;
        self.record(Call::PatchNode {
            name: name.to_string(),
            patch: wire(patch),
        });
        scripted(&self.node_errors)
    }

    async fn list_stateful_sets(
        &self,
        _namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<StatefulSet>, ControlPlaneError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .stateful_sets
            .get(label_selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn patch_stateful_set(
        &self,
        _namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<(), ApplyError> {
        patch.validate()?;
        self.record(Call::PatchStatefulSet {
            name: name.to_string(),
            patch: wire(patch),
        });
        Ok(())
    }

    async fn list_pvcs(
        &self,
        _namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PersistentVolumeClaim>, ControlPlaneError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.pvcs.get(label_selector).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Fake confirmer
// =============================================================================

pub struct FakeConfirmer {
    answer: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeConfirmer {
    pub fn yes() -> Self {
        Self {
            answer: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirmer for FakeConfirmer {
    fn confirm(&self, message: &str) -> Result<bool, RecoveryError> {
        self.prompts.lock().unwrap().push(message.to_string());
        Ok(self.answer)
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn container(name: &str, script: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(format!("registry.yaook.cloud/yaook/{name}:1.0")),
        command: Some(vec!["bash".into(), "-ec".into(), script.to_string()]),
        liveness_probe: Some(Probe::default()),
        readiness_probe: Some(Probe::default()),
        startup_probe: Some(Probe::default()),
        ..Container::default()
    }
}

pub fn stateful_set(
    name: &str,
    replicas: i32,
    containers: Vec<Container>,
    init_containers: Vec<Container>,
) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            min_ready_seconds: Some(30),
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers,
                    init_containers: Some(init_containers),
                    ..PodSpec::default()
                }),
                ..PodTemplateSpec::default()
            },
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    }
}

/// A Yaook custom resource as returned by the API.
pub fn resource(kind: ResourceKind, name: &str, data: Value) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &kind.api_resource()).data(data);
    obj.metadata.annotations = Some(BTreeMap::new());
    obj
}
