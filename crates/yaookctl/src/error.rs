//! Error types shared by the recovery components.
//!
//! Two layers exist: [`ControlPlaneError`] classifies faults coming back from
//! the Kubernetes API so callers can match on the tolerated races, and
//! [`RecoveryError`] is the operator-facing fault that decides the exit code.

use thiserror::Error;

use crate::patch::PatchError;

/// Exit code for a missing resource or a violated precondition.
pub const EXIT_NOT_FOUND: i32 = 1;
/// Exit code for invalid input (e.g. a kind that cannot be force-upgraded).
pub const EXIT_VALIDATION: i32 = 2;
/// Exit code when the operator declined the confirmation prompt.
pub const EXIT_DECLINED: i32 = 3;

/// Typed fault from the control plane.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    /// The addressed object does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency conflict (HTTP 409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request was well-formed but could not be applied (HTTP 422).
    ///
    /// A JSON patch `remove` of an absent path ends up here.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// Any other API failure.
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ControlPlaneError {
    /// Classify a kube error by its HTTP status.
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::NotFound(resp.message),
            kube::Error::Api(resp) if resp.code == 409 => Self::Conflict(resp.message),
            kube::Error::Api(resp) if resp.code == 422 => Self::Unprocessable(resp.message),
            other => Self::Api(other),
        }
    }

    /// Whether the error means the object is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Operator-facing failure of a command.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// Target resource does not exist.
    #[error("{0} does not exist")]
    NotFound(String),

    /// A state precondition does not hold.
    #[error("{message}")]
    Precondition {
        message: String,
        hint: Option<String>,
    },

    /// Input is invalid for this operation.
    #[error("{message}")]
    Validation {
        message: String,
        hint: Option<String>,
    },

    /// Operator answered "no" to a destructive prompt.
    #[error("confirmation to {action} was denied")]
    Declined { action: String },

    /// The confirmation prompt could not be shown or answered.
    #[error("confirmation prompt failed: {0}")]
    Prompt(String),

    /// The workload does not look like the tool expects (missing container).
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// Resolution found no replica to bootstrap from.
    #[error("found *no* suitable bootstrap source")]
    NoBootstrapSource,

    /// The patch builder rejected an operation.
    #[error("invalid patch: {0}")]
    Patch(#[from] PatchError),

    /// Unexpected control plane fault, propagated unmodified.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

impl RecoveryError {
    pub fn precondition(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Precondition {
            message: message.into(),
            hint: hint.map(str::to_string),
        }
    }

    pub fn validation(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            hint: hint.map(str::to_string),
        }
    }

    pub fn declined(action: impl Into<String>) -> Self {
        Self::Declined {
            action: action.into(),
        }
    }

    /// Remediation hint to show next to the error, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Precondition { hint, .. } | Self::Validation { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => EXIT_VALIDATION,
            Self::Declined { .. } | Self::Prompt(_) => EXIT_DECLINED,
            Self::NotFound(_)
            | Self::Precondition { .. }
            | Self::ConfigurationMismatch(_)
            | Self::NoBootstrapSource
            | Self::Patch(_)
            | Self::ControlPlane(_) => EXIT_NOT_FOUND,
        }
    }
}
