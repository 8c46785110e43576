//! Cluster role projection.

use crate::common::{parse, row};
use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Cluster role row: rule and aggregation counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterRoleView;

impl ObjectView for ClusterRoleView {
    fn kind(&self) -> &str {
        "ClusterRole"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let role: ClusterRole = parse(obj)?;
        Ok(row(
            &role.metadata,
            json!({
                "rules": role.rules.as_ref().map_or(0, Vec::len),
                "aggregated": role.aggregation_rule.is_some(),
            }),
        ))
    }

    fn detail(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let role: ClusterRole = parse(obj)?;
        let rules: Vec<Value> = role
            .rules
            .unwrap_or_default()
            .into_iter()
            .map(|rule| {
                json!({
                    "apiGroups": rule.api_groups.unwrap_or_default(),
                    "resources": rule.resources.unwrap_or_default(),
                    "verbs": rule.verbs,
                })
            })
            .collect();
        Ok(row(&role.metadata, json!({ "rules": rules })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_engine::mock::dynamic_object;

    fn view_role() -> DynamicObject {
        dynamic_object(
            "rbac.authorization.k8s.io/v1",
            "ClusterRole",
            None,
            "view",
            json!({
                "rules": [
                    { "apiGroups": [""], "resources": ["pods", "services"], "verbs": ["get", "list", "watch"] }
                ]
            }),
        )
    }

    #[test]
    fn test_rule_count() {
        let row = ClusterRoleView.project(&view_role()).unwrap();
        assert_eq!(row["rules"], 1);
        assert_eq!(row["aggregated"], false);
    }

    #[test]
    fn test_detail_expands_rules() {
        let detail = ClusterRoleView.detail(&view_role()).unwrap();
        assert_eq!(detail["rules"][0]["verbs"], json!(["get", "list", "watch"]));
    }
}
