//! Dashboard view models for Kubernetes resources
//!
//! Each view is a thin [`ObjectView`] over a `k8s-openapi` type. The
//! [`catalog`] maps the resource names used in stream URLs to a watch target,
//! a view and a coalescer tick class; custom resources fall back to
//! [`GenericView`].

pub mod catalog;
pub mod cluster_role;
pub mod common;
pub mod deployment;
pub mod event;
pub mod generic;
pub mod namespace;
pub mod pdb;
pub mod pod;
pub mod pvc;

pub use catalog::{BuiltinKind, CatalogEntry};
pub use cluster_role::ClusterRoleView;
pub use deployment::DeploymentView;
pub use event::EventView;
pub use generic::GenericView;
pub use namespace::NamespaceView;
pub use pdb::PodDisruptionBudgetView;
pub use pod::PodView;
pub use pvc::PersistentVolumeClaimView;

pub use watch_engine::ObjectView;
