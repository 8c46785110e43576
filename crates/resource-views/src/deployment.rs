//! Deployment projection.

use crate::common::{labels, parse, row};
use k8s_openapi::api::apps::v1::Deployment;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Deployment row: replica counts and images.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentView;

impl ObjectView for DeploymentView {
    fn kind(&self) -> &str {
        "Deployment"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let deployment: Deployment = parse(obj)?;
        let spec = deployment.spec.unwrap_or_default();
        let status = deployment.status.unwrap_or_default();
        let desired = spec.replicas.unwrap_or(1);

        let images: Vec<String> = spec
            .template
            .spec
            .map(|pod| {
                pod.containers
                    .into_iter()
                    .filter_map(|c| c.image)
                    .collect()
            })
            .unwrap_or_default();

        Ok(row(
            &deployment.metadata,
            json!({
                "ready": format!("{}/{}", status.ready_replicas.unwrap_or(0), desired),
                "upToDate": status.updated_replicas.unwrap_or(0),
                "available": status.available_replicas.unwrap_or(0),
                "images": images,
                "labels": labels(deployment.metadata.labels.as_ref()),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_engine::mock::dynamic_object;

    #[test]
    fn test_project_deployment() {
        let obj = dynamic_object(
            "apps/v1",
            "Deployment",
            Some("web"),
            "frontend",
            json!({
                "spec": {
                    "replicas": 3,
                    "selector": { "matchLabels": { "app": "frontend" } },
                    "template": { "spec": { "containers": [{ "name": "web", "image": "nginx:1.27" }] } }
                },
                "status": { "readyReplicas": 2, "updatedReplicas": 3, "availableReplicas": 2 }
            }),
        );
        let row = DeploymentView.project(&obj).unwrap();
        assert_eq!(row["ready"], "2/3");
        assert_eq!(row["upToDate"], 3);
        assert_eq!(row["images"], json!(["nginx:1.27"]));
    }

    #[test]
    fn test_missing_status_is_zeroed() {
        let obj = dynamic_object(
            "apps/v1",
            "Deployment",
            Some("web"),
            "worker",
            json!({ "spec": { "selector": {}, "template": {} } }),
        );
        let row = DeploymentView.project(&obj).unwrap();
        assert_eq!(row["ready"], "0/1");
        assert_eq!(row["available"], 0);
        assert_eq!(row["images"], json!([]));
    }
}
