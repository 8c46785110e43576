//! In-memory cluster backend for tests.
//!
//! Enabled with the `test-util` feature. Watches are fed by hand through a
//! [`MockFeed`]; seeded kinds complete their initial list as soon as the
//! watch opens.

use crate::backend::{DiscoveryProbe, RawEventStream, WatchFailure, WatchSource};
use crate::discovery::{ApiGroupVersion, DiscoveredResource};
use crate::error::EngineError;
use crate::session::WatchTarget;
use crate::sync::lock;
use crate::tenant::TenantKey;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, TypeMeta};
use kube_runtime::watcher;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type FeedKey = (TenantKey, String);
type FeedItem = Result<watcher::Event<DynamicObject>, WatchFailure>;

/// Builds a dynamic object with a deterministic uid.
pub fn dynamic_object(
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
    data: Value,
) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            uid: Some(format!("{}-{}", namespace.unwrap_or_default(), name)),
            ..Default::default()
        },
        data,
    }
}

/// Handle pushing raw events into one opened mock watch.
#[derive(Debug, Clone)]
pub struct MockFeed {
    sender: mpsc::UnboundedSender<FeedItem>,
}

impl MockFeed {
    fn send(&self, item: FeedItem) -> bool {
        self.sender.send(item).is_ok()
    }

    /// Completes an initial list with `objects`.
    pub fn init(&self, objects: Vec<DynamicObject>) -> bool {
        let mut ok = self.send(Ok(watcher::Event::Init));
        for object in objects {
            ok &= self.send(Ok(watcher::Event::InitApply(object)));
        }
        ok && self.send(Ok(watcher::Event::InitDone))
    }

    /// Adds or updates an object.
    pub fn apply(&self, object: DynamicObject) -> bool {
        self.send(Ok(watcher::Event::Apply(object)))
    }

    /// Deletes an object.
    pub fn delete(&self, object: DynamicObject) -> bool {
        self.send(Ok(watcher::Event::Delete(object)))
    }

    /// Rejects the watch as unauthorized.
    pub fn deny(&self, reason: &str) -> bool {
        self.send(Err(WatchFailure::Forbidden(reason.to_string())))
    }

    /// Reports a retryable failure.
    pub fn fail(&self, reason: &str) -> bool {
        self.send(Err(WatchFailure::Transient(reason.to_string())))
    }
}

#[derive(Default)]
struct MockState {
    tenants: HashSet<TenantKey>,
    seeds: HashMap<FeedKey, Vec<DynamicObject>>,
    feeds: HashMap<FeedKey, MockFeed>,
    opens: HashMap<FeedKey, usize>,
    released: Vec<TenantKey>,
    groups: HashMap<TenantKey, Vec<ApiGroupVersion>>,
    resources: HashMap<(TenantKey, String), Vec<DiscoveredResource>>,
    failing_groups: HashSet<(TenantKey, String)>,
    probe_calls: usize,
}

/// Mock implementation of [`WatchSource`] and [`DiscoveryProbe`].
#[derive(Clone, Default)]
pub struct MockClusterBackend {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockClusterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockClusterBackend")
            .field("tenants", &state.tenants.len())
            .field("feeds", &state.feeds.len())
            .finish_non_exhaustive()
    }
}

impl MockClusterBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tenant. Opening a watch for an unknown tenant fails.
    pub fn add_tenant(&self, tenant: &TenantKey) {
        lock(&self.state).tenants.insert(tenant.clone());
    }

    /// Seeds a kind; watches opened afterwards sync immediately with `objects`.
    pub fn seed(&self, tenant: &TenantKey, kind: &str, objects: Vec<DynamicObject>) {
        lock(&self.state)
            .seeds
            .insert((tenant.clone(), kind.to_string()), objects);
    }

    /// Feed of the most recently opened watch for a kind.
    #[must_use]
    pub fn feed(&self, tenant: &TenantKey, kind: &str) -> Option<MockFeed> {
        lock(&self.state)
            .feeds
            .get(&(tenant.clone(), kind.to_string()))
            .cloned()
    }

    /// Number of watches opened for a kind.
    #[must_use]
    pub fn open_count(&self, tenant: &TenantKey, kind: &str) -> usize {
        lock(&self.state)
            .opens
            .get(&(tenant.clone(), kind.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Tenants released so far, in order.
    #[must_use]
    pub fn released(&self) -> Vec<TenantKey> {
        lock(&self.state).released.clone()
    }

    /// Registers a discoverable resource and its group version.
    pub fn add_resource(&self, tenant: &TenantKey, resource: DiscoveredResource) {
        let group = ApiGroupVersion::new(&resource.group, &resource.version);
        let mut state = lock(&self.state);
        let groups = state.groups.entry(tenant.clone()).or_default();
        if !groups.contains(&group) {
            groups.push(group.clone());
        }
        state
            .resources
            .entry((tenant.clone(), group.api_version()))
            .or_default()
            .push(resource);
    }

    /// Makes discovery of one group version (`apps/v1`, `v1`, ...) fail.
    pub fn fail_group(&self, tenant: &TenantKey, api_version: &str) {
        lock(&self.state)
            .failing_groups
            .insert((tenant.clone(), api_version.to_string()));
    }

    /// Number of group listings served.
    #[must_use]
    pub fn probe_calls(&self) -> usize {
        lock(&self.state).probe_calls
    }

    fn require_tenant(state: &MockState, tenant: &TenantKey) -> Result<(), EngineError> {
        if state.tenants.contains(tenant) {
            Ok(())
        } else {
            Err(EngineError::TenantNotFound(tenant.to_string()))
        }
    }
}

impl WatchSource for MockClusterBackend {
    fn open(&self, tenant: &TenantKey, target: &WatchTarget) -> Result<RawEventStream, EngineError> {
        let mut state = lock(&self.state);
        Self::require_tenant(&state, tenant)?;

        let key = (tenant.clone(), target.kind().to_string());
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed = MockFeed { sender };
        if let Some(objects) = state.seeds.get(&key) {
            feed.init(objects.clone());
        }
        *state.opens.entry(key.clone()).or_default() += 1;
        state.feeds.insert(key, feed);

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(stream.boxed())
    }

    fn release(&self, tenant: &TenantKey) {
        let mut state = lock(&self.state);
        state.tenants.remove(tenant);
        state.feeds.retain(|(owner, _), _| owner != tenant);
        state.released.push(tenant.clone());
    }
}

#[async_trait::async_trait]
impl DiscoveryProbe for MockClusterBackend {
    async fn api_groups(&self, tenant: &TenantKey) -> Result<Vec<ApiGroupVersion>, EngineError> {
        let mut state = lock(&self.state);
        Self::require_tenant(&state, tenant)?;
        state.probe_calls += 1;
        Ok(state.groups.get(tenant).cloned().unwrap_or_default())
    }

    async fn group_resources(
        &self,
        tenant: &TenantKey,
        group: &ApiGroupVersion,
    ) -> Result<Vec<DiscoveredResource>, EngineError> {
        let state = lock(&self.state);
        Self::require_tenant(&state, tenant)?;
        let key = (tenant.clone(), group.api_version());
        if state.failing_groups.contains(&key) {
            return Err(EngineError::Discovery(format!("{group} is unavailable")));
        }
        Ok(state.resources.get(&key).cloned().unwrap_or_default())
    }
}
