//! HTTP routes.
//!
//! A stream request is translated into one engine subscription; the SSE
//! connection closing drops it again. Plain JSON routes expose discovery and
//! tenant teardown.

use crate::error::ServerError;
use crate::sse;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{delete, get};
use axum::{Json, Router};
use futures::Stream;
use resource_views::catalog::{self, CatalogEntry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use watch_engine::{
    EngineError, ResourceIndex, Selector, StreamRequest, StreamScope, TeardownReport, TenantKey,
};

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/tenants/{configuration}/{cluster}", delete(remove_tenant))
        .route(
            "/api/v1/tenants/{configuration}/{cluster}/discovery",
            get(discovery).post(refresh_discovery),
        )
        .route(
            "/api/v1/tenants/{configuration}/{cluster}/streams/{kind}",
            get(stream),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Query parameters of a stream request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    /// Restrict to one namespace, or the namespace of `name`
    pub namespace: Option<String>,
    /// Stream a single object
    pub name: Option<String>,
    /// Stream the events of `name` instead of the object itself
    #[serde(default)]
    pub events: bool,
    /// Server-side label selector of the watch
    #[serde(rename = "labelSelector")]
    pub label_selector: Option<String>,
    /// Server-side field selector of the watch
    #[serde(rename = "fieldSelector")]
    pub field_selector: Option<String>,
}

impl StreamQuery {
    /// Slice of the collection the request asks for.
    pub fn scope(&self) -> Result<StreamScope, ServerError> {
        let namespace = self.namespace.clone().filter(|ns| !ns.is_empty());
        match (self.name.clone().filter(|n| !n.is_empty()), self.events) {
            (Some(name), true) => Ok(StreamScope::RelatedEvents { namespace, name }),
            (Some(name), false) => Ok(StreamScope::Item { namespace, name }),
            (None, true) => Err(ServerError::InvalidRequest(
                "an events stream needs the name of the involved object".to_string(),
            )),
            (None, false) => Ok(namespace.map_or(StreamScope::All, |namespace| {
                StreamScope::Namespace { namespace }
            })),
        }
    }

    /// Selectors applied to the watch itself.
    #[must_use]
    pub fn selector(&self) -> Selector {
        Selector {
            labels: self.label_selector.clone(),
            fields: self.field_selector.clone(),
        }
    }
}

/// Discovery results of one tenant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryResponse<'a> {
    tenant: String,
    partial: bool,
    metrics_available: bool,
    #[serde(flatten)]
    index: &'a ResourceIndex,
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.engine.registry().len(),
        "streams": state.engine.hub().stream_count(),
    }))
}

/// Resolves the catalog entry for a kind: built-in first, then discovery.
async fn resolve_entry(
    state: &AppState,
    tenant: &TenantKey,
    kind: &str,
) -> Result<CatalogEntry, ServerError> {
    if let Some(entry) = catalog::lookup(kind) {
        return Ok(entry);
    }
    let resource = state
        .engine
        .discovery()
        .resolve(tenant, kind)
        .await?
        .ok_or_else(|| EngineError::UnknownResource(kind.to_string()))?;
    debug!("Resolved {} on {} through discovery", kind, tenant);
    Ok(catalog::custom(&resource))
}

async fn stream(
    State(state): State<AppState>,
    Path((configuration, cluster, kind)): Path<(String, String, String)>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let tenant = TenantKey::new(configuration, cluster);
    let scope = query.scope()?;
    let entry = match scope {
        StreamScope::RelatedEvents { .. } => catalog::related_events(),
        _ => resolve_entry(&state, &tenant, &kind).await?,
    };

    let subscription = state
        .engine
        .open_stream(StreamRequest {
            tenant,
            target: entry.target.with_selector(query.selector()),
            scope,
            view: entry.view,
            tick: entry.tick,
        })
        .await?;
    Ok(sse::stream(subscription))
}

async fn discovery(
    State(state): State<AppState>,
    Path((configuration, cluster)): Path<(String, String)>,
) -> Result<Json<Value>, ServerError> {
    let tenant = TenantKey::new(configuration, cluster);
    let index = state.engine.discovery().resources(&tenant).await?;
    discovery_response(&state, &tenant, &index).await
}

async fn refresh_discovery(
    State(state): State<AppState>,
    Path((configuration, cluster)): Path<(String, String)>,
) -> Result<Json<Value>, ServerError> {
    let tenant = TenantKey::new(configuration, cluster);
    let index = state.engine.discovery().refresh(&tenant).await?;
    discovery_response(&state, &tenant, &index).await
}

async fn discovery_response(
    state: &AppState,
    tenant: &TenantKey,
    index: &ResourceIndex,
) -> Result<Json<Value>, ServerError> {
    let body = DiscoveryResponse {
        tenant: tenant.to_string(),
        partial: index.is_partial(),
        metrics_available: state.engine.discovery().is_metrics_available(tenant).await?,
        index,
    };
    Ok(Json(serde_json::to_value(body).map_err(EngineError::from)?))
}

async fn remove_tenant(
    State(state): State<AppState>,
    Path((configuration, cluster)): Path<(String, String)>,
) -> Json<TeardownReport> {
    let tenant = TenantKey::new(configuration, cluster);
    Json(state.engine.remove_tenant(&tenant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use watch_engine::mock::dynamic_object;
    use watch_engine::{DiscoveredResource, EngineConfig, EngineContext, MockClusterBackend};

    fn tenant() -> TenantKey {
        TenantKey::new("cfg", "dev")
    }

    fn pod(name: &str) -> kube::core::DynamicObject {
        dynamic_object(
            "v1",
            "Pod",
            Some("web"),
            name,
            json!({ "status": { "phase": "Running" } }),
        )
    }

    fn app(backend: &MockClusterBackend) -> (Router, Arc<EngineContext>) {
        let engine = Arc::new(EngineContext::new(
            EngineConfig::default(),
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
        ));
        (router(AppState::new(Arc::clone(&engine))), engine)
    }

    async fn send(router: Router, method: &str, uri: &str) -> Response {
        router
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn first_event(response: Response) -> String {
        let frame = response.into_body().frame().await.unwrap().unwrap();
        String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_query_scopes() {
        let query = |namespace: Option<&str>, name: Option<&str>, events| StreamQuery {
            namespace: namespace.map(String::from),
            name: name.map(String::from),
            events,
            ..StreamQuery::default()
        };

        assert_eq!(query(None, None, false).scope().unwrap(), StreamScope::All);
        assert_eq!(
            query(Some("web"), None, false).scope().unwrap(),
            StreamScope::Namespace { namespace: "web".to_string() }
        );
        assert_eq!(
            query(Some("web"), Some("api-0"), false).scope().unwrap(),
            StreamScope::Item {
                namespace: Some("web".to_string()),
                name: "api-0".to_string()
            }
        );
        assert_eq!(
            query(None, Some("admin"), true).scope().unwrap(),
            StreamScope::RelatedEvents {
                namespace: None,
                name: "admin".to_string()
            }
        );
        assert!(matches!(
            query(Some("web"), None, true).scope(),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_healthz() {
        let (router, _engine) = app(&MockClusterBackend::new());
        let response = send(router, "GET", "/healthz").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_stream_sends_snapshot_first() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        backend.seed(&tenant(), "Pod", vec![pod("web-10"), pod("web-2")]);
        let (router, engine) = app(&backend);

        let response = send(router, "GET", "/api/v1/tenants/cfg/dev/streams/pods").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let event = first_event(response).await;
        assert!(event.starts_with("event: snapshot\n"));
        let web_2 = event.find("web-2").unwrap();
        let web_10 = event.find("web-10").unwrap();
        assert!(web_2 < web_10);
        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_selector_streams_use_their_own_session() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        backend.seed(&tenant(), "Pod", vec![pod("web-1")]);
        let (router, engine) = app(&backend);

        let plain = send(router.clone(), "GET", "/api/v1/tenants/cfg/dev/streams/pods").await;
        assert_eq!(plain.status(), StatusCode::OK);
        let selected = send(
            router,
            "GET",
            "/api/v1/tenants/cfg/dev/streams/pods?labelSelector=app%3Dweb",
        )
        .await;
        assert_eq!(selected.status(), StatusCode::OK);

        assert_eq!(engine.registry().len(), 2);
        assert_eq!(engine.hub().stream_count(), 2);
        assert_eq!(backend.open_count(&tenant(), "Pod"), 2);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let (router, _engine) = app(&MockClusterBackend::new());
        let response = send(router, "GET", "/api/v1/tenants/cfg/missing/streams/pods").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "tenant_not_found");
    }

    #[tokio::test]
    async fn test_unknown_kind_is_not_found() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        let (router, _engine) = app(&backend);

        let response = send(router, "GET", "/api/v1/tenants/cfg/dev/streams/widgets").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "unknown_resource");
    }

    #[tokio::test]
    async fn test_events_stream_requires_name() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        let (router, _engine) = app(&backend);

        let response = send(router, "GET", "/api/v1/tenants/cfg/dev/streams/pods?events=true").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_custom_resource_stream_through_discovery() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        backend.add_resource(
            &tenant(),
            DiscoveredResource {
                group: "cert-manager.io".to_string(),
                version: "v1".to_string(),
                kind: "Certificate".to_string(),
                resource: "certificates".to_string(),
                namespaced: true,
            },
        );
        backend.seed(
            &tenant(),
            "Certificate",
            vec![dynamic_object("cert-manager.io/v1", "Certificate", Some("web"), "tls", json!({}))],
        );
        let (router, _engine) = app(&backend);

        let response = send(router, "GET", "/api/v1/tenants/cfg/dev/streams/certificates").await;
        assert_eq!(response.status(), StatusCode::OK);
        let event = first_event(response).await;
        assert!(event.contains("\"kind\":\"Certificate\""));
    }

    #[tokio::test]
    async fn test_discovery_route() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        backend.add_resource(
            &tenant(),
            DiscoveredResource {
                group: "cert-manager.io".to_string(),
                version: "v1".to_string(),
                kind: "Certificate".to_string(),
                resource: "certificates".to_string(),
                namespaced: true,
            },
        );
        let (router, _engine) = app(&backend);

        let response = send(router.clone(), "GET", "/api/v1/tenants/cfg/dev/discovery").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["tenant"], "cfg-dev");
        assert_eq!(body["partial"], false);
        assert_eq!(body["metricsAvailable"], false);
        assert_eq!(body["resources"]["Certificate"]["resource"], "certificates");

        let response = send(router, "POST", "/api/v1/tenants/cfg/dev/discovery").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(backend.probe_calls() >= 2);
    }

    #[tokio::test]
    async fn test_remove_tenant_reports_teardown() {
        let backend = MockClusterBackend::new();
        backend.add_tenant(&tenant());
        backend.seed(&tenant(), "Pod", vec![pod("web-1")]);
        let (router, engine) = app(&backend);

        let entry = catalog::lookup("pods").unwrap();
        let mut subscription = engine
            .open_stream(StreamRequest {
                tenant: tenant(),
                target: entry.target,
                scope: StreamScope::All,
                view: entry.view,
                tick: entry.tick,
            })
            .await
            .unwrap();
        assert!(subscription.try_recv().is_some());

        let response = send(router, "DELETE", "/api/v1/tenants/cfg/dev").await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["sessions"], 1);
        assert_eq!(report["subscribers"], 1);

        assert!(subscription.recv().await.is_none());
        assert_eq!(backend.released(), vec![tenant()]);
    }
}
