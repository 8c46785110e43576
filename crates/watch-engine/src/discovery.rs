//! Cached cluster discovery.
//!
//! Discovery is expensive and rarely changes, so the per-tenant resource
//! index and the metrics-API flag are cached with a TTL. A failing API group
//! is logged and skipped; the rest of the index is still cached and marked
//! partial.

use crate::backend::DiscoveryProbe;
use crate::cache::TtlCache;
use crate::error::{DiscoveryPartial, EngineError};
use crate::session::WatchTarget;
use crate::tenant::{Gvr, TenantKey};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const METRICS_GROUP: &str = "metrics.k8s.io";

/// Preferred version of one API group. The core group has an empty name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiGroupVersion {
    /// Group name
    pub group: String,
    /// Version served for the group
    pub version: String,
}

impl ApiGroupVersion {
    /// Creates a group version.
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// `apiVersion` string, `v1` for core and `group/version` otherwise.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ApiGroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.api_version())
    }
}

/// A watchable resource served by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredResource {
    /// API group, empty for core
    pub group: String,
    /// API version
    pub version: String,
    /// Kind, e.g. `Certificate`
    pub kind: String,
    /// Plural resource name, e.g. `certificates`
    pub resource: String,
    /// Whether objects live in namespaces
    pub namespaced: bool,
}

impl DiscoveredResource {
    /// Group/version/resource triple.
    #[must_use]
    pub fn gvr(&self) -> Gvr {
        Gvr::new(&self.group, &self.version, &self.resource)
    }

    /// Watch target for this resource, optionally restricted to a namespace.
    #[must_use]
    pub fn target(&self, namespace: Option<&str>) -> WatchTarget {
        let target = WatchTarget::dynamic(self.gvr(), &self.kind);
        match namespace {
            Some(namespace) if self.namespaced => target.in_namespace(namespace),
            _ => target,
        }
    }
}

/// Everything discovery found for one tenant.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIndex {
    /// Resources keyed by kind
    pub resources: BTreeMap<String, DiscoveredResource>,
    /// Group versions whose discovery failed
    pub failed_groups: Vec<String>,
}

impl ResourceIndex {
    /// Finds a resource by kind or plural name, ignoring case.
    #[must_use]
    pub fn get(&self, kind_or_plural: &str) -> Option<&DiscoveredResource> {
        self.resources.get(kind_or_plural).or_else(|| {
            self.resources.values().find(|r| {
                r.kind.eq_ignore_ascii_case(kind_or_plural)
                    || r.resource.eq_ignore_ascii_case(kind_or_plural)
            })
        })
    }

    /// True when at least one group failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failed_groups.is_empty()
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when no resource was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// True if any resource belongs to the group.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.resources.values().any(|r| r.group == group)
    }
}

/// TTL cache of per-tenant discovery results.
pub struct DiscoveryCache {
    probe: Arc<dyn DiscoveryProbe>,
    ttl: Duration,
    resources: TtlCache<Arc<ResourceIndex>>,
    metrics: TtlCache<bool>,
}

impl fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("ttl", &self.ttl)
            .field("resources", &self.resources.len())
            .field("metrics", &self.metrics.len())
            .finish_non_exhaustive()
    }
}

impl DiscoveryCache {
    /// Creates a cache querying `probe` on miss.
    pub fn new(probe: Arc<dyn DiscoveryProbe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            resources: TtlCache::new(),
            metrics: TtlCache::new(),
        }
    }

    /// Resource index of a tenant, discovered on first use.
    pub async fn resources(&self, tenant: &TenantKey) -> Result<Arc<ResourceIndex>, EngineError> {
        self.resources
            .get_or_compute(&tenant.all_resources_cache_key(), self.ttl, move || {
                self.discover(tenant)
            })
            .await
    }

    /// Whether the tenant serves the metrics API.
    pub async fn is_metrics_available(&self, tenant: &TenantKey) -> Result<bool, EngineError> {
        self.metrics
            .get_or_compute(&tenant.metrics_available_cache_key(), self.ttl, move || async move {
                let groups = self.probe.api_groups(tenant).await?;
                Ok(groups.iter().any(|g| g.group == METRICS_GROUP))
            })
            .await
    }

    /// Forces rediscovery of a tenant's resource index.
    pub async fn refresh(&self, tenant: &TenantKey) -> Result<Arc<ResourceIndex>, EngineError> {
        self.metrics.invalidate(&tenant.metrics_available_cache_key());
        self.resources
            .invalidate_and_recompute(&tenant.all_resources_cache_key(), self.ttl, move || {
                self.discover(tenant)
            })
            .await
    }

    /// Looks up one resource by kind or plural name.
    pub async fn resolve(
        &self,
        tenant: &TenantKey,
        kind_or_plural: &str,
    ) -> Result<Option<DiscoveredResource>, EngineError> {
        Ok(self.resources(tenant).await?.get(kind_or_plural).cloned())
    }

    /// Drops every cached entry of a tenant.
    pub fn invalidate_tenant(&self, tenant: &TenantKey) -> usize {
        let resources_key = tenant.all_resources_cache_key();
        let metrics_key = tenant.metrics_available_cache_key();
        self.resources.remove_many([resources_key.as_str()])
            + self.metrics.remove_many([metrics_key.as_str()])
    }

    async fn discover(&self, tenant: &TenantKey) -> Result<Arc<ResourceIndex>, EngineError> {
        debug!("Running discovery for {}", tenant);
        let groups = self.probe.api_groups(tenant).await?;

        let mut index = ResourceIndex::default();
        for group in &groups {
            match self.probe.group_resources(tenant, group).await {
                Ok(resources) => {
                    for resource in resources {
                        // Core group comes first; its kinds win on conflicts
                        index.resources.entry(resource.kind.clone()).or_insert(resource);
                    }
                }
                Err(err) => {
                    let partial = DiscoveryPartial {
                        group: group.to_string(),
                        reason: err.to_string(),
                    };
                    warn!("{} ({})", partial, tenant);
                    index.failed_groups.push(partial.group);
                }
            }
        }

        self.metrics.set(
            tenant.metrics_available_cache_key(),
            groups.iter().any(|g| g.group == METRICS_GROUP),
            self.ttl,
        );
        info!(
            "Discovered {} resources for {} ({} groups failed)",
            index.len(),
            tenant,
            index.failed_groups.len()
        );
        Ok(Arc::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(group: &str, kind: &str, plural: &str, namespaced: bool) -> DiscoveredResource {
        DiscoveredResource {
            group: group.to_string(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            resource: plural.to_string(),
            namespaced,
        }
    }

    #[test]
    fn test_api_version() {
        assert_eq!(ApiGroupVersion::new("", "v1").api_version(), "v1");
        assert_eq!(ApiGroupVersion::new("apps", "v1").to_string(), "apps/v1");
    }

    #[test]
    fn test_index_lookup_by_kind_or_plural() {
        let mut index = ResourceIndex::default();
        let cert = resource("cert-manager.io", "Certificate", "certificates", true);
        index.resources.insert(cert.kind.clone(), cert.clone());

        assert_eq!(index.get("Certificate"), Some(&cert));
        assert_eq!(index.get("certificates"), Some(&cert));
        assert_eq!(index.get("certificate"), Some(&cert));
        assert!(index.get("issuers").is_none());
        assert!(index.has_group("cert-manager.io"));
        assert!(!index.is_partial());
    }

    #[test]
    fn test_target_namespace_only_for_namespaced() {
        let cert = resource("cert-manager.io", "Certificate", "certificates", true);
        assert_eq!(cert.target(Some("web")).namespace(), Some("web"));

        let issuer = resource("cert-manager.io", "ClusterIssuer", "clusterissuers", false);
        assert_eq!(issuer.target(Some("web")).namespace(), None);
        assert_eq!(
            issuer.target(None).gvr(),
            Some(&Gvr::new("cert-manager.io", "v1", "clusterissuers"))
        );
    }
}
