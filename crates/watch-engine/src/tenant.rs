//! Tenant, session and stream keys.
//!
//! All per-tuple state in the engine is partitioned by [`TenantKey`]. The
//! rendered forms are stable, human-debuggable composite strings; tenant
//! teardown always compares structured keys, never string prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One logical cluster connection: a configuration and a cluster within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantKey {
    /// Identifier of the registered configuration
    pub configuration_id: String,
    /// Cluster (context) name inside the configuration
    pub cluster_name: String,
}

impl TenantKey {
    /// Creates a tenant key.
    pub fn new(configuration_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            configuration_id: configuration_id.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// Cache key for the tenant's discovered resource index.
    #[must_use]
    pub fn all_resources_cache_key(&self) -> String {
        format!("{self}-allResourcesCache")
    }

    /// Cache key for the tenant's metrics API availability flag.
    #[must_use]
    pub fn metrics_available_cache_key(&self) -> String {
        format!("{self}-isMetricServerAvailableCache")
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.configuration_id, self.cluster_name)
    }
}

/// Group/version/resource triple of a dynamic or custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gvr {
    /// API group, empty for the core group
    pub group: String,
    /// API version
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl Gvr {
    /// Creates a GVR.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

/// Server-side label and field selectors applied to a watch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    /// Label selector, e.g. `app=web`
    pub labels: Option<String>,
    /// Field selector, e.g. `spec.nodeName=node-1`
    pub fields: Option<String>,
}

impl Selector {
    /// True when neither selector is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.as_deref().is_none_or(str::is_empty)
            && self.fields.as_deref().is_none_or(str::is_empty)
    }

    /// Translates the selector into a watcher configuration.
    #[must_use]
    pub fn watcher_config(&self) -> kube_runtime::watcher::Config {
        let mut config = kube_runtime::watcher::Config::default();
        if let Some(labels) = self.labels.as_deref().filter(|l| !l.is_empty()) {
            config = config.labels(labels);
        }
        if let Some(fields) = self.fields.as_deref().filter(|f| !f.is_empty()) {
            config = config.fields(fields);
        }
        config
    }
}

/// Identity of one shared watch session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Owning tenant
    pub tenant: TenantKey,
    /// Resource kind, e.g. `Pod`
    pub kind: String,
    /// Set for dynamic resources
    pub gvr: Option<Gvr>,
    /// Namespace restriction of the watch itself
    pub namespace: Option<String>,
    /// Server-side selectors
    pub selector: Selector,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}Informer", self.tenant, self.kind)?;
        if let Some(gvr) = &self.gvr {
            write!(f, "-{}-{}-{}", gvr.group, gvr.version, gvr.resource)?;
        }
        if let Some(namespace) = &self.namespace {
            write!(f, "-ns-{namespace}")?;
        }
        for part in [&self.selector.labels, &self.selector.fields] {
            if let Some(part) = part.as_deref().filter(|p| !p.is_empty()) {
                write!(f, "-{part}")?;
            }
        }
        Ok(())
    }
}

/// Which slice of a watched collection a stream renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum StreamScope {
    /// Every object in the collection
    #[default]
    All,
    /// Objects in one namespace
    Namespace {
        /// Namespace to keep
        namespace: String,
    },
    /// A single object (detail stream)
    Item {
        /// Namespace, `None` for cluster-scoped objects
        namespace: Option<String>,
        /// Object name
        name: String,
    },
    /// Events whose `involvedObject` is the given object
    RelatedEvents {
        /// Namespace of the involved object
        namespace: Option<String>,
        /// Name of the involved object
        name: String,
    },
}

/// Identity of one logical push channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    tenant: TenantKey,
    rendered: String,
}

impl StreamKey {
    /// Derives the stream key for a tenant, kind and scope.
    #[must_use]
    pub fn new(tenant: &TenantKey, kind: &str, scope: &StreamScope) -> Self {
        let base = format!("{tenant}-{kind}");
        let rendered = match scope {
            StreamScope::All => base,
            StreamScope::Namespace { namespace } => format!("{base}-ns-{namespace}"),
            StreamScope::Item { namespace, name } => {
                format!("{base}-item-{}-{name}", namespace.as_deref().unwrap_or_default())
            }
            StreamScope::RelatedEvents { namespace, name } => {
                format!("{base}-events-{}-{name}", namespace.as_deref().unwrap_or_default())
            }
        };
        Self {
            tenant: tenant.clone(),
            rendered,
        }
    }

    /// Owning tenant.
    #[must_use]
    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// Rendered key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}
