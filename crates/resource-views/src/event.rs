//! Core event projection, used for the cluster event list and for the
//! related-events stream of a detail page.

use crate::common::{parse, row, timestamp};
use k8s_openapi::api::core::v1::Event;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Event row.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventView;

impl ObjectView for EventView {
    fn kind(&self) -> &str {
        "Event"
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let event: Event = parse(obj)?;
        let involved = &event.involved_object;
        let last_seen = event
            .last_timestamp
            .as_ref()
            .or(event.first_timestamp.as_ref());

        Ok(row(
            &event.metadata,
            json!({
                "type": event.type_.clone().unwrap_or_default(),
                "reason": event.reason.clone().unwrap_or_default(),
                "message": event.message.clone().unwrap_or_default(),
                "object": format!(
                    "{}/{}",
                    involved.kind.as_deref().unwrap_or_default(),
                    involved.name.as_deref().unwrap_or_default()
                ),
                "count": event.count.unwrap_or(1),
                "source": event
                    .source
                    .as_ref()
                    .and_then(|s| s.component.clone())
                    .unwrap_or_default(),
                "lastSeen": timestamp(last_seen),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_engine::mock::dynamic_object;

    #[test]
    fn test_project_event() {
        let obj = dynamic_object(
            "v1",
            "Event",
            Some("web"),
            "api-0.17f3a",
            json!({
                "involvedObject": { "kind": "Pod", "name": "api-0", "namespace": "web" },
                "reason": "BackOff",
                "message": "Back-off restarting failed container",
                "type": "Warning",
                "count": 5,
                "source": { "component": "kubelet" },
                "lastTimestamp": "2026-10-14T08:00:00Z"
            }),
        );
        let row = EventView.project(&obj).unwrap();
        assert_eq!(row["type"], "Warning");
        assert_eq!(row["object"], "Pod/api-0");
        assert_eq!(row["count"], 5);
        assert_eq!(row["source"], "kubelet");
        assert_eq!(row["lastSeen"], "2026-10-14T08:00:00Z");
    }

    #[test]
    fn test_event_without_involved_object_is_skipped() {
        let obj = dynamic_object("v1", "Event", Some("web"), "orphan", json!({ "reason": "x" }));
        assert!(EventView.project(&obj).is_err());
    }
}
