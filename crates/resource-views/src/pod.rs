//! Pod projection.

use crate::common::{labels, parse, row, timestamp};
use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Pod list row: phase, readiness, restarts, node and IP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PodView;

impl ObjectView for PodView {
    fn kind(&self) -> &str {
        "Pod"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let pod: Pod = parse(obj)?;
        let spec = pod.spec.unwrap_or_default();
        let status = pod.status.unwrap_or_default();
        let statuses = status.container_statuses.unwrap_or_default();

        let ready = statuses.iter().filter(|c| c.ready).count();
        let restarts: i32 = statuses.iter().map(|c| c.restart_count).sum();

        Ok(row(
            &pod.metadata,
            json!({
                "status": status.phase.unwrap_or_default(),
                "ready": format!("{}/{}", ready, spec.containers.len()),
                "restarts": restarts,
                "node": spec.node_name.unwrap_or_default(),
                "podIP": status.pod_ip.unwrap_or_default(),
            }),
        ))
    }

    fn detail(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let pod: Pod = parse(obj)?;
        let spec = pod.spec.unwrap_or_default();
        let status = pod.status.unwrap_or_default();
        let statuses = status.container_statuses.unwrap_or_default();

        let containers: Vec<Value> = spec
            .containers
            .iter()
            .map(|container| {
                let state = statuses.iter().find(|s| s.name == container.name);
                json!({
                    "name": container.name,
                    "image": container.image.clone().unwrap_or_default(),
                    "ready": state.is_some_and(|s| s.ready),
                    "restartCount": state.map_or(0, |s| s.restart_count),
                })
            })
            .collect();

        let conditions: Vec<Value> = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| {
                json!({
                    "type": c.type_,
                    "status": c.status,
                    "lastTransitionTime": timestamp(c.last_transition_time.as_ref()),
                })
            })
            .collect();

        Ok(row(
            &pod.metadata,
            json!({
                "status": status.phase.unwrap_or_default(),
                "node": spec.node_name.unwrap_or_default(),
                "podIP": status.pod_ip.unwrap_or_default(),
                "serviceAccount": spec.service_account_name.unwrap_or_default(),
                "labels": labels(pod.metadata.labels.as_ref()),
                "containers": containers,
                "conditions": conditions,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_engine::mock::dynamic_object;

    fn running_pod() -> DynamicObject {
        dynamic_object(
            "v1",
            "Pod",
            Some("web"),
            "api-0",
            json!({
                "spec": {
                    "nodeName": "node-1",
                    "containers": [
                        { "name": "app", "image": "api:1.2" },
                        { "name": "sidecar", "image": "envoy:1.30" }
                    ]
                },
                "status": {
                    "phase": "Running",
                    "podIP": "10.0.0.7",
                    "containerStatuses": [
                        { "name": "app", "image": "api:1.2", "imageID": "", "ready": true, "restartCount": 2 },
                        { "name": "sidecar", "image": "envoy:1.30", "imageID": "", "ready": false, "restartCount": 1 }
                    ]
                }
            }),
        )
    }

    #[test]
    fn test_project_running_pod() {
        let row = PodView.project(&running_pod()).unwrap();
        assert_eq!(row["name"], "api-0");
        assert_eq!(row["namespace"], "web");
        assert_eq!(row["status"], "Running");
        assert_eq!(row["ready"], "1/2");
        assert_eq!(row["restarts"], 3);
        assert_eq!(row["node"], "node-1");
        assert_eq!(row["podIP"], "10.0.0.7");
    }

    #[test]
    fn test_pending_pod_projects_empty_values() {
        let obj = dynamic_object("v1", "Pod", Some("web"), "api-1", json!({}));
        let row = PodView.project(&obj).unwrap();
        assert_eq!(row["status"], "");
        assert_eq!(row["ready"], "0/0");
        assert_eq!(row["restarts"], 0);
        assert_eq!(row["node"], "");
    }

    #[test]
    fn test_detail_lists_containers() {
        let detail = PodView.detail(&running_pod()).unwrap();
        let containers = detail["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["image"], "api:1.2");
        assert_eq!(containers[1]["ready"], false);
        assert_eq!(detail["conditions"], json!([]));
        assert_eq!(detail["labels"], json!({}));
    }
}
