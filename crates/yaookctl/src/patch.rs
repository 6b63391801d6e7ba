//! Typed JSON patch (RFC 6902) builder.
//!
//! Operations are collected in order and validated as a whole before they are
//! converted into the wire representation, so a malformed pointer never makes
//! it to the API server.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while validating a patch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("patch contains no operations")]
    Empty,

    #[error("invalid JSON pointer {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("failed to encode patch: {0}")]
    Encode(String),
}

/// A single patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

/// Ordered list of patch operations applied atomically by the API server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JsonPatch {
    ops: Vec<PatchOp>,
}

impl JsonPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.ops.push(PatchOp::Add {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(PatchOp::Remove { path: path.into() });
        self
    }

    pub fn replace(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.ops.push(PatchOp::Replace {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Check every operation's path.
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.ops.is_empty() {
            return Err(PatchError::Empty);
        }
        for op in &self.ops {
            validate_pointer(op.path())?;
        }
        Ok(())
    }

    /// Validate and convert into the wire type used by kube.
    pub fn to_wire(&self) -> Result<json_patch::Patch, PatchError> {
        self.validate()?;
        let value = serde_json::to_value(self).map_err(|e| PatchError::Encode(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| PatchError::Encode(e.to_string()))
    }
}

/// Escape a single reference token (`~` -> `~0`, `/` -> `~1`).
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn validate_pointer(path: &str) -> Result<(), PatchError> {
    let invalid = |reason| PatchError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if rest.is_empty() {
        return Err(invalid("refusing to patch the document root"));
    }

    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err(invalid("empty reference token"));
        }
        let mut chars = segment.chars();
        while let Some(c) = chars.next() {
            if c == '~' && !matches!(chars.next(), Some('0' | '1')) {
                return Err(invalid("'~' must be followed by '0' or '1'"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_in_rfc6902_shape() {
        let mut patch = JsonPatch::new();
        patch
            .replace("/spec/replicas", 3)
            .remove("/metadata/finalizers")
            .add("/spec/template/spec/initContainers/0/command", json!(["bash"]));

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!([
                {"op": "replace", "path": "/spec/replicas", "value": 3},
                {"op": "remove", "path": "/metadata/finalizers"},
                {"op": "add", "path": "/spec/template/spec/initContainers/0/command", "value": ["bash"]},
            ])
        );
    }

    #[test]
    fn test_empty_patch_is_rejected() {
        assert_eq!(JsonPatch::new().validate(), Err(PatchError::Empty));
    }

    #[test]
    fn test_invalid_pointers_are_rejected() {
        for bad in ["spec/replicas", "/", "/spec//replicas", "/metadata/annotations/a~b"] {
            let mut patch = JsonPatch::new();
            patch.remove(bad);
            assert!(
                matches!(patch.validate(), Err(PatchError::InvalidPath { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_escaped_annotation_path_is_valid() {
        let key = escape_segment("l2-lock.maintenance.yaook.cloud/compute");
        assert_eq!(key, "l2-lock.maintenance.yaook.cloud~1compute");

        let mut patch = JsonPatch::new();
        patch.remove(format!("/metadata/annotations/{key}"));
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_to_wire_round_trips_through_json_patch() {
        let mut patch = JsonPatch::new();
        patch.replace("/spec/replicas", 1);
        let wire = patch.to_wire().unwrap();
        assert_eq!(wire.0.len(), 1);
    }
}
