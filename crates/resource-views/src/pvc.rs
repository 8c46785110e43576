//! Persistent volume claim projection.

use crate::common::{parse, row};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Claim row: status, capacity and storage class.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistentVolumeClaimView;

impl ObjectView for PersistentVolumeClaimView {
    fn kind(&self) -> &str {
        "PersistentVolumeClaim"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let claim: PersistentVolumeClaim = parse(obj)?;
        let spec = claim.spec.unwrap_or_default();
        let status = claim.status.unwrap_or_default();
        let capacity = status
            .capacity
            .as_ref()
            .and_then(|c| c.get("storage"))
            .map(|q| q.0.clone())
            .unwrap_or_default();

        Ok(row(
            &claim.metadata,
            json!({
                "status": status.phase.unwrap_or_default(),
                "volume": spec.volume_name.unwrap_or_default(),
                "capacity": capacity,
                "accessModes": spec.access_modes.unwrap_or_default(),
                "storageClass": spec.storage_class_name.unwrap_or_default(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_engine::mock::dynamic_object;

    #[test]
    fn test_bound_claim() {
        let obj = dynamic_object(
            "v1",
            "PersistentVolumeClaim",
            Some("db"),
            "data-postgres-0",
            json!({
                "spec": {
                    "accessModes": ["ReadWriteOnce"],
                    "storageClassName": "gp3",
                    "volumeName": "pvc-1234"
                },
                "status": { "phase": "Bound", "capacity": { "storage": "20Gi" } }
            }),
        );
        let row = PersistentVolumeClaimView.project(&obj).unwrap();
        assert_eq!(row["status"], "Bound");
        assert_eq!(row["capacity"], "20Gi");
        assert_eq!(row["accessModes"], json!(["ReadWriteOnce"]));
    }

    #[test]
    fn test_pending_claim_has_empty_fields() {
        let obj = dynamic_object("v1", "PersistentVolumeClaim", Some("db"), "scratch", json!({}));
        let row = PersistentVolumeClaimView.project(&obj).unwrap();
        assert_eq!(row["capacity"], "");
        assert_eq!(row["accessModes"], json!([]));
    }
}
