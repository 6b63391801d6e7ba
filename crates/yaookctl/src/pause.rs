//! Pausing reconciliation of a Yaook resource.
//!
//! The operators skip any resource carrying the pause annotation, which is
//! what makes it safe to scale a service's StatefulSet down by hand.

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};

use crate::control::{ApplyError, ControlPlane};
use crate::error::{ControlPlaneError, RecoveryError};
use crate::kinds::ResourceKind;
use crate::patch::{escape_segment, JsonPatch};

pub const PAUSE_ANNOTATION: &str = "state.yaook.cloud/pause";

fn annotation_path() -> String {
    format!("/metadata/annotations/{}", escape_segment(PAUSE_ANNOTATION))
}

/// Annotation value used when no comment is given.
pub fn default_comment() -> String {
    format!(
        "paused using yaookctl on {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Add the pause annotation. Returns the value that was set.
pub async fn pause(
    control: &dyn ControlPlane,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
    comment: Option<String>,
) -> Result<String, RecoveryError> {
    let obj = match control.get_resource(kind, namespace, name).await {
        Ok(obj) => obj,
        Err(e) if e.is_not_found() => {
            return Err(RecoveryError::NotFound(format!("{kind} {namespace}/{name}")))
        }
        Err(e) => return Err(e.into()),
    };
    let value = comment.unwrap_or_else(default_comment);

    let mut patch = JsonPatch::new();
    if obj.metadata.annotations.is_some() {
        patch.add(annotation_path(), value.as_str());
    } else {
        let mut annotations = serde_json::Map::new();
        annotations.insert(PAUSE_ANNOTATION.to_string(), value.clone().into());
        patch.add("/metadata/annotations", annotations);
    }
    control.patch_resource(kind, namespace, name, &patch).await?;
    info!(%kind, %namespace, %name, "paused");
    Ok(value)
}

/// Remove the pause annotation. Returns false when it was not set.
pub async fn unpause(
    control: &dyn ControlPlane,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
) -> Result<bool, RecoveryError> {
    let mut patch = JsonPatch::new();
    patch.remove(annotation_path());

    match control.patch_resource(kind, namespace, name, &patch).await {
        Ok(()) => {
            info!(%kind, %namespace, %name, "unpaused");
            Ok(true)
        }
        Err(ApplyError::ControlPlane(ControlPlaneError::Unprocessable(_))) => {
            debug!(%kind, %namespace, %name, "pause annotation was not set");
            Ok(false)
        }
        Err(ApplyError::ControlPlane(ControlPlaneError::NotFound(_))) => Err(
            RecoveryError::NotFound(format!("{kind} {namespace}/{name}")),
        ),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_path_is_escaped() {
        assert_eq!(annotation_path(), "/metadata/annotations/state.yaook.cloud~1pause");
    }

    #[test]
    fn test_default_comment() {
        let comment = default_comment();
        assert!(comment.starts_with("paused using yaookctl on "));
        assert!(comment.ends_with('Z'));
    }
}
