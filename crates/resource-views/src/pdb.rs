//! Pod disruption budget projection.
//!
//! `minAvailable` and `maxUnavailable` are mutually exclusive in the API; both
//! are reported, the unset one as an empty string.

use crate::common::{int_or_string, parse, row};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Disruption budget row: thresholds, healthy counts and allowed disruptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PodDisruptionBudgetView;

impl ObjectView for PodDisruptionBudgetView {
    fn kind(&self) -> &str {
        "PodDisruptionBudget"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let pdb: PodDisruptionBudget = parse(obj)?;
        let spec = pdb.spec.unwrap_or_default();
        let status = pdb.status.unwrap_or_default();

        Ok(row(
            &pdb.metadata,
            json!({
                "minAvailable": int_or_string(spec.min_available.as_ref()),
                "maxUnavailable": int_or_string(spec.max_unavailable.as_ref()),
                "currentHealthy": status.current_healthy,
                "desiredHealthy": status.desired_healthy,
                "disruptionsAllowed": status.disruptions_allowed,
                "expectedPods": status.expected_pods,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_engine::mock::dynamic_object;

    fn pdb(spec: Value) -> DynamicObject {
        dynamic_object(
            "policy/v1",
            "PodDisruptionBudget",
            Some("web"),
            "frontend",
            json!({
                "spec": spec,
                "status": {
                    "currentHealthy": 3,
                    "desiredHealthy": 2,
                    "disruptionsAllowed": 1,
                    "expectedPods": 3
                }
            }),
        )
    }

    #[test]
    fn test_min_available_is_not_overwritten() {
        let row = PodDisruptionBudgetView
            .project(&pdb(json!({ "minAvailable": 2 })))
            .unwrap();
        assert_eq!(row["minAvailable"], "2");
        assert_eq!(row["maxUnavailable"], "");
        assert_eq!(row["disruptionsAllowed"], 1);
    }

    #[test]
    fn test_max_unavailable_percentage() {
        let row = PodDisruptionBudgetView
            .project(&pdb(json!({ "maxUnavailable": "25%" })))
            .unwrap();
        assert_eq!(row["minAvailable"], "");
        assert_eq!(row["maxUnavailable"], "25%");
    }
}
