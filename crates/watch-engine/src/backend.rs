//! Cluster-API collaborators.
//!
//! The engine never speaks the watch protocol itself. A [`WatchSource`] starts
//! a raw event stream for a target and a [`DiscoveryProbe`] answers discovery
//! queries. [`KubeBackend`] implements both on top of `kube` clients, one
//! client per tenant.

use crate::discovery::{ApiGroupVersion, DiscoveredResource};
use crate::error::EngineError;
use crate::session::WatchTarget;
use crate::tenant::TenantKey;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::core::DynamicObject;
use kube::{Api, Client};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Failure reported by a raw watch stream, classified for the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchFailure {
    /// The credential lacks permission (401/403); never retried automatically
    Forbidden(String),
    /// Any other failure; the stream keeps retrying with backoff
    Transient(String),
}

impl fmt::Display for WatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden(reason) => write!(f, "forbidden: {reason}"),
            Self::Transient(reason) => write!(f, "{reason}"),
        }
    }
}

impl WatchFailure {
    /// Classifies a watcher error.
    #[must_use]
    pub fn from_watcher(err: &watcher::Error) -> Self {
        let denied = match err {
            watcher::Error::InitialListFailed(inner)
            | watcher::Error::WatchStartFailed(inner)
            | watcher::Error::WatchFailed(inner) => denial_message(inner),
            watcher::Error::WatchError(status) if is_denied_code(status.code) => {
                Some(status.message.clone())
            }
            _ => None,
        };
        match denied {
            Some(reason) => Self::Forbidden(reason),
            None => Self::Transient(err.to_string()),
        }
    }
}

fn is_denied_code(code: u16) -> bool {
    code == 401 || code == 403
}

fn denial_message(err: &kube::Error) -> Option<String> {
    match err {
        kube::Error::Api(status) if is_denied_code(status.code) => Some(status.message.clone()),
        _ => None,
    }
}

/// Raw add/update/delete notifications for one watch target.
pub type RawEventStream = BoxStream<'static, Result<watcher::Event<DynamicObject>, WatchFailure>>;

/// Starts raw watches against a cluster.
pub trait WatchSource: Send + Sync {
    /// Opens a watch stream for the target. Must not block.
    fn open(&self, tenant: &TenantKey, target: &WatchTarget) -> Result<RawEventStream, EngineError>;

    /// Forgets any per-tenant state (called on tenant deletion).
    fn release(&self, _tenant: &TenantKey) {}
}

/// Answers cluster discovery queries.
#[async_trait::async_trait]
pub trait DiscoveryProbe: Send + Sync {
    /// Lists the preferred version of every API group, core group first.
    async fn api_groups(&self, tenant: &TenantKey) -> Result<Vec<ApiGroupVersion>, EngineError>;

    /// Lists the watchable resources served by one group version.
    async fn group_resources(
        &self,
        tenant: &TenantKey,
        group: &ApiGroupVersion,
    ) -> Result<Vec<DiscoveredResource>, EngineError>;
}

/// `kube`-backed implementation of [`WatchSource`] and [`DiscoveryProbe`].
#[derive(Clone, Default)]
pub struct KubeBackend {
    clients: Arc<RwLock<HashMap<TenantKey, Client>>>,
}

impl fmt::Debug for KubeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeBackend")
            .field("tenants", &self.tenants())
            .finish()
    }
}

impl KubeBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the client for a tenant.
    pub fn insert(&self, tenant: TenantKey, client: Client) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tenant, client);
    }

    /// Removes the client for a tenant.
    pub fn remove(&self, tenant: &TenantKey) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tenant)
            .is_some()
    }

    /// True if a client is registered for the tenant.
    #[must_use]
    pub fn contains(&self, tenant: &TenantKey) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(tenant)
    }

    /// Registered tenants, sorted.
    #[must_use]
    pub fn tenants(&self) -> Vec<TenantKey> {
        let mut tenants: Vec<TenantKey> = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tenants.sort();
        tenants
    }

    /// Client for a tenant.
    pub fn client(&self, tenant: &TenantKey) -> Result<Client, EngineError> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant)
            .cloned()
            .ok_or_else(|| EngineError::TenantNotFound(tenant.to_string()))
    }
}

impl WatchSource for KubeBackend {
    fn open(&self, tenant: &TenantKey, target: &WatchTarget) -> Result<RawEventStream, EngineError> {
        let client = self.client(tenant)?;
        let api: Api<DynamicObject> = match target.namespace() {
            Some(namespace) => Api::namespaced_with(client, namespace, target.api_resource()),
            None => Api::all_with(client, target.api_resource()),
        };
        debug!("Opening watch for {} on {}", target.kind(), tenant);

        let stream = watcher(api, target.selector().watcher_config())
            .default_backoff()
            .map_err(|err| WatchFailure::from_watcher(&err));
        Ok(stream.boxed())
    }

    fn release(&self, tenant: &TenantKey) {
        if self.remove(tenant) {
            debug!("Released client for {}", tenant);
        }
    }
}

#[async_trait::async_trait]
impl DiscoveryProbe for KubeBackend {
    async fn api_groups(&self, tenant: &TenantKey) -> Result<Vec<ApiGroupVersion>, EngineError> {
        let client = self.client(tenant)?;

        let mut groups: Vec<ApiGroupVersion> = client
            .list_core_api_versions()
            .await?
            .versions
            .into_iter()
            .map(|version| ApiGroupVersion::new("", version))
            .collect();

        for group in client.list_api_groups().await?.groups {
            let preferred = group
                .preferred_version
                .map(|v| v.version)
                .or_else(|| group.versions.first().map(|v| v.version.clone()));
            if let Some(version) = preferred {
                groups.push(ApiGroupVersion::new(group.name, version));
            }
        }
        Ok(groups)
    }

    async fn group_resources(
        &self,
        tenant: &TenantKey,
        group: &ApiGroupVersion,
    ) -> Result<Vec<DiscoveredResource>, EngineError> {
        let client = self.client(tenant)?;
        let list = if group.group.is_empty() {
            client.list_core_api_resources(&group.version).await?
        } else {
            client.list_api_group_resources(&group.api_version()).await?
        };

        Ok(list
            .resources
            .into_iter()
            // Subresources such as pods/log are not watchable collections
            .filter(|r| !r.name.contains('/'))
            .filter(|r| r.verbs.iter().any(|v| v == "watch"))
            .map(|r| DiscoveredResource {
                group: group.group.clone(),
                version: group.version.clone(),
                kind: r.kind,
                resource: r.name,
                namespaced: r.namespaced,
            })
            .collect())
    }
}
