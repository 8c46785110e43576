//! Catalog entries driven through the engine.

use resource_views::catalog;
use serde_json::{json, Value};
use std::sync::Arc;
use watch_engine::mock::dynamic_object;
use watch_engine::{EngineConfig, EngineContext, MockClusterBackend, StreamRequest, StreamScope, TenantKey};

fn request(tenant: &TenantKey, entry: catalog::CatalogEntry, scope: StreamScope) -> StreamRequest {
    StreamRequest {
        tenant: tenant.clone(),
        target: entry.target,
        scope,
        view: entry.view,
        tick: entry.tick,
    }
}

#[tokio::test(start_paused = true)]
async fn test_pod_list_is_naturally_ordered() {
    let tenant = TenantKey::new("cfg", "dev");
    let backend = MockClusterBackend::new();
    backend.add_tenant(&tenant);
    let pod = |name: &str| {
        dynamic_object("v1", "Pod", Some("web"), name, json!({ "status": { "phase": "Running" } }))
    };
    backend.seed(&tenant, "Pod", vec![pod("web-10"), pod("web-2"), pod("web-1")]);
    let engine = EngineContext::new(
        EngineConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(backend),
    );

    let entry = catalog::lookup("pods").unwrap();
    let mut subscription = engine
        .open_stream(request(&tenant, entry, StreamScope::All))
        .await
        .unwrap();

    let payload = subscription.try_recv().unwrap();
    let rows: Value = serde_json::from_str(payload.data()).unwrap();
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["web-1", "web-2", "web-10"]);
    assert_eq!(rows[0]["status"], "Running");
}

#[tokio::test(start_paused = true)]
async fn test_related_events_stream() {
    let tenant = TenantKey::new("cfg", "dev");
    let backend = MockClusterBackend::new();
    backend.add_tenant(&tenant);
    let event = |name: &str, pod: &str| {
        dynamic_object(
            "v1",
            "Event",
            Some("web"),
            name,
            json!({
                "involvedObject": { "kind": "Pod", "name": pod, "namespace": "web" },
                "reason": "Pulled",
                "type": "Normal"
            }),
        )
    };
    backend.seed(
        &tenant,
        "Event",
        vec![event("api-0.a", "api-0"), event("api-1.b", "api-1"), event("api-0.c", "api-0")],
    );
    let engine = EngineContext::new(
        EngineConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(backend),
    );

    let scope = StreamScope::RelatedEvents {
        namespace: Some("web".to_string()),
        name: "api-0".to_string(),
    };
    let mut subscription = engine
        .open_stream(request(&tenant, catalog::related_events(), scope))
        .await
        .unwrap();
    assert!(subscription.key().as_str().ends_with("-Event-events-web-api-0"));

    let payload = subscription.try_recv().unwrap();
    let rows: Value = serde_json::from_str(payload.data()).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["object"], "Pod/api-0");
}
