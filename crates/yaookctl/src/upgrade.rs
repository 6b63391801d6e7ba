//! Force-upgrade of per-node Yaook agents.
//!
//! Tears down a resource that is stuck mid-lifecycle by deleting it, stripping
//! its finalizers and releasing the maintenance lock it holds on its node.
//! Cleanup normally done by the owning operator is skipped.

use std::fmt;

use kube::api::DynamicObject;
use tracing::{debug, info};

use crate::confirm::{self, Confirmer};
use crate::control::{ApplyError, ControlPlane, DeleteOutcome};
use crate::error::{ControlPlaneError, RecoveryError};
use crate::kinds::ResourceKind;
use crate::patch::{escape_segment, JsonPatch};

/// Prefix of the per-node maintenance lock annotation.
pub const LOCK_ANNOTATION_PREFIX: &str = "l2-lock.maintenance.yaook.cloud";

const RECREATION_CONDITION: &str = "RequiresRecreation";

/// Lifecycle position of a resource during a forced upgrade.
///
/// `Gone` is only reported when the API server already answered that the
/// resource no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Active,
    PendingRecreation,
    Deleting,
    FinalizersStripped,
    LockReleased,
    Gone,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::PendingRecreation => "pending recreation",
            Self::Deleting => "deleting",
            Self::FinalizersStripped => "finalizers stripped",
            Self::LockReleased => "lock released",
            Self::Gone => "gone",
        };
        f.write_str(s)
    }
}

/// What the store says about a resource before it is torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedResourceRecoveryState {
    pub is_deleting: bool,
    pub has_finalizers: bool,
    pub requires_recreation: bool,
    /// Suffix of the lock annotation the resource takes on its node.
    pub held_lock: Option<String>,
}

impl ManagedResourceRecoveryState {
    pub fn from_object(obj: &DynamicObject, kind: ResourceKind) -> Self {
        let requires_recreation = obj
            .data
            .pointer("/status/conditions")
            .and_then(|c| c.as_array())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.get("type").and_then(|t| t.as_str()) == Some(RECREATION_CONDITION))
            });

        let lock_name = obj
            .data
            .pointer("/spec/lockName")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let object_kind = obj.types.as_ref().map(|t| t.kind.clone());

        Self {
            is_deleting: obj.metadata.deletion_timestamp.is_some(),
            has_finalizers: obj.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()),
            requires_recreation,
            held_lock: lock_name
                .or(object_kind)
                .or_else(|| Some(kind.kind().to_string())),
        }
    }

    /// Position in the upgrade state machine as observed.
    pub fn state(&self) -> UpgradeState {
        if self.is_deleting {
            UpgradeState::Deleting
        } else if self.requires_recreation {
            UpgradeState::PendingRecreation
        } else {
            UpgradeState::Active
        }
    }

    /// Full annotation key of the held lock.
    pub fn lock_annotation(&self) -> Option<String> {
        self.held_lock
            .as_deref()
            .map(|suffix| format!("{LOCK_ANNOTATION_PREFIX}/{suffix}"))
    }
}

/// What a completed force-upgrade did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub initial: UpgradeState,
    /// Last state reached, `Gone` or `LockReleased` on success.
    pub reached: UpgradeState,
    pub delete: Option<DeleteOutcome>,
    /// False when the finalizers were already gone.
    pub finalizers_removed: bool,
    /// False when the lock annotation was already absent.
    pub lock_removed: bool,
}

/// Drives the forced teardown of one resource.
pub struct ForceUpgradeOrchestrator<'a> {
    control: &'a dyn ControlPlane,
    confirmer: &'a dyn Confirmer,
    namespace: &'a str,
}

impl<'a> ForceUpgradeOrchestrator<'a> {
    pub fn new(control: &'a dyn ControlPlane, confirmer: &'a dyn Confirmer, namespace: &'a str) -> Self {
        Self {
            control,
            confirmer,
            namespace,
        }
    }

    pub async fn force_upgrade(
        &self,
        kind: ResourceKind,
        name: &str,
        break_even_if_unnecessary: bool,
    ) -> Result<UpgradeReport, RecoveryError> {
        if !kind.is_upgradable() {
            return Err(RecoveryError::validation(
                format!("{kind} is not a thing which can be force-upgraded"),
                None,
            ));
        }
        let ns = self.namespace;

        let obj = match self.control.get_resource(kind, ns, name).await {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => {
                return Err(RecoveryError::NotFound(format!("{kind} {ns}/{name}")))
            }
            Err(e) => return Err(e.into()),
        };
        let observed = ManagedResourceRecoveryState::from_object(&obj, kind);
        let initial = observed.state();
        debug!(%kind, %name, state = %initial, ?observed, "resource state read");

        if initial == UpgradeState::Active && !break_even_if_unnecessary {
            return Err(RecoveryError::validation(
                format!(
                    "{kind} {ns}/{name} is not being deleted and does not require recreation; \
                     refusing to break it"
                ),
                Some("force by passing --break-even-if-unnecessary"),
            ));
        }

        confirm::require(
            self.confirmer,
            &format!(
                "The {kind} {ns}/{name} will be force-deleted, causing potential loss of data \
                 and availability. Continue (pass --yes-i-mean-it to bypass this question)?"
            ),
            "delete the resource",
        )?;

        let mut gone = false;
        let delete = if observed.is_deleting {
            None
        } else {
            let outcome = self.control.delete_resource(kind, ns, name).await?;
            info!(%kind, %name, ?outcome, "delete requested");
            gone = outcome == DeleteOutcome::AlreadyGone;
            Some(outcome)
        };

        let finalizers_removed = if gone {
            debug!(%kind, %name, "resource already gone, skipping finalizers");
            false
        } else if let Some(removed) = self.strip_finalizers(kind, name, &observed).await? {
            debug!(%kind, %name, state = %UpgradeState::FinalizersStripped);
            removed
        } else {
            gone = true;
            false
        };

        // released even when the resource is already gone
        let lock_removed = match observed.lock_annotation() {
            Some(annotation) => self.release_lock(name, &annotation).await?,
            None => false,
        };
        let reached = if gone {
            UpgradeState::Gone
        } else {
            UpgradeState::LockReleased
        };
        debug!(%kind, %name, state = %reached);

        Ok(UpgradeReport {
            initial,
            reached,
            delete,
            finalizers_removed,
            lock_removed,
        })
    }

    /// Always attempted, since finalizers can be re-added concurrently.
    /// `None` means the resource disappeared in the meantime.
    async fn strip_finalizers(
        &self,
        kind: ResourceKind,
        name: &str,
        observed: &ManagedResourceRecoveryState,
    ) -> Result<Option<bool>, RecoveryError> {
        let mut patch = JsonPatch::new();
        patch.remove("/metadata/finalizers");

        match self.control.patch_resource(kind, self.namespace, name, &patch).await {
            Ok(()) => {
                info!(%kind, %name, "finalizers stripped");
                Ok(Some(true))
            }
            Err(ApplyError::ControlPlane(ControlPlaneError::NotFound(_))) => {
                info!(%kind, %name, "resource already gone");
                Ok(None)
            }
            Err(ApplyError::ControlPlane(ControlPlaneError::Unprocessable(msg)))
                if !observed.has_finalizers =>
            {
                debug!(%kind, %name, reason = %msg, "no finalizers to strip");
                Ok(Some(false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lock(&self, node: &str, annotation: &str) -> Result<bool, RecoveryError> {
        let mut patch = JsonPatch::new();
        patch.remove(format!("/metadata/annotations/{}", escape_segment(annotation)));

        match self.control.patch_node(node, &patch).await {
            Ok(()) => {
                info!(%node, %annotation, "maintenance lock released");
                Ok(true)
            }
            Err(ApplyError::ControlPlane(ControlPlaneError::Unprocessable(_))) => {
                debug!(%node, %annotation, "lock annotation already absent");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
