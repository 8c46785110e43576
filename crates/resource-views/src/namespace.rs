//! Namespace projection.

use crate::common::{labels, parse, row};
use k8s_openapi::api::core::v1::Namespace;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Namespace row: phase and labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceView;

impl ObjectView for NamespaceView {
    fn kind(&self) -> &str {
        "Namespace"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let namespace: Namespace = parse(obj)?;
        let phase = namespace.status.and_then(|s| s.phase).unwrap_or_default();
        Ok(row(
            &namespace.metadata,
            json!({
                "status": phase,
                "labels": labels(namespace.metadata.labels.as_ref()),
            }),
        ))
    }
}
