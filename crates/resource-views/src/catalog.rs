//! Catalog of streamable resource kinds.

use crate::{
    ClusterRoleView, DeploymentView, EventView, GenericView, NamespaceView,
    PersistentVolumeClaimView, PodDisruptionBudgetView, PodView,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Namespace, PersistentVolumeClaim, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::ClusterRole;
use std::fmt;
use std::sync::Arc;
use watch_engine::{DiscoveredResource, ObjectView, TickClass, WatchTarget};

/// Everything needed to open a stream for one resource kind.
#[derive(Clone)]
pub struct CatalogEntry {
    /// Watched collection
    pub target: WatchTarget,
    /// Projection
    pub view: Arc<dyn ObjectView>,
    /// Coalescer tick class
    pub tick: TickClass,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("kind", &self.target.kind())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

/// Built-in kinds with a typed projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// `pods`
    Pod,
    /// `deployments`
    Deployment,
    /// `poddisruptionbudgets`
    PodDisruptionBudget,
    /// `events`
    Event,
    /// `namespaces`
    Namespace,
    /// `persistentvolumeclaims`
    PersistentVolumeClaim,
    /// `clusterroles`
    ClusterRole,
}

impl BuiltinKind {
    /// Every built-in kind.
    pub const ALL: [Self; 7] = [
        Self::Pod,
        Self::Deployment,
        Self::PodDisruptionBudget,
        Self::Event,
        Self::Namespace,
        Self::PersistentVolumeClaim,
        Self::ClusterRole,
    ];

    /// Plural resource name used in stream URLs.
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Pod => "pods",
            Self::Deployment => "deployments",
            Self::PodDisruptionBudget => "poddisruptionbudgets",
            Self::Event => "events",
            Self::Namespace => "namespaces",
            Self::PersistentVolumeClaim => "persistentvolumeclaims",
            Self::ClusterRole => "clusterroles",
        }
    }

    /// Resolves a plural name or kind, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.plural().eq_ignore_ascii_case(name) || kind.kind().eq_ignore_ascii_case(name)
        })
    }

    /// High-churn kinds flush on the fast tick.
    #[must_use]
    pub fn tick(self) -> TickClass {
        match self {
            Self::Pod | Self::Deployment | Self::Event => TickClass::Fast,
            Self::PodDisruptionBudget
            | Self::Namespace
            | Self::PersistentVolumeClaim
            | Self::ClusterRole => TickClass::Slow,
        }
    }

    /// Kind name as served by the API.
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::PodDisruptionBudget => "PodDisruptionBudget",
            Self::Event => "Event",
            Self::Namespace => "Namespace",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::ClusterRole => "ClusterRole",
        }
    }

    /// Cluster-wide watch target of the kind.
    #[must_use]
    pub fn target(self) -> WatchTarget {
        match self {
            Self::Pod => WatchTarget::builtin::<Pod>(),
            Self::Deployment => WatchTarget::builtin::<Deployment>(),
            Self::PodDisruptionBudget => WatchTarget::builtin::<PodDisruptionBudget>(),
            Self::Event => WatchTarget::builtin::<Event>(),
            Self::Namespace => WatchTarget::builtin::<Namespace>(),
            Self::PersistentVolumeClaim => WatchTarget::builtin::<PersistentVolumeClaim>(),
            Self::ClusterRole => WatchTarget::builtin::<ClusterRole>(),
        }
    }

    /// Typed projection of the kind.
    #[must_use]
    pub fn view(self) -> Arc<dyn ObjectView> {
        match self {
            Self::Pod => Arc::new(PodView),
            Self::Deployment => Arc::new(DeploymentView),
            Self::PodDisruptionBudget => Arc::new(PodDisruptionBudgetView),
            Self::Event => Arc::new(EventView),
            Self::Namespace => Arc::new(NamespaceView),
            Self::PersistentVolumeClaim => Arc::new(PersistentVolumeClaimView),
            Self::ClusterRole => Arc::new(ClusterRoleView),
        }
    }

    /// Catalog entry for the kind.
    #[must_use]
    pub fn entry(self) -> CatalogEntry {
        CatalogEntry {
            target: self.target(),
            view: self.view(),
            tick: self.tick(),
        }
    }
}

/// Entry for a built-in kind, by plural name or kind.
#[must_use]
pub fn lookup(name: &str) -> Option<CatalogEntry> {
    BuiltinKind::from_name(name).map(BuiltinKind::entry)
}

/// Entry for a discovered custom resource.
#[must_use]
pub fn custom(resource: &DiscoveredResource) -> CatalogEntry {
    CatalogEntry {
        target: resource.target(None),
        view: Arc::new(GenericView::new(&resource.kind)),
        tick: TickClass::Slow,
    }
}

/// Entry backing the related-events stream of a detail page.
#[must_use]
pub fn related_events() -> CatalogEntry {
    BuiltinKind::Event.entry()
}
