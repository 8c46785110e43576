//! Watch-and-stream engine
//!
//! Keeps one shared watch session per (configuration, cluster, resource kind)
//! tuple, coalesces bursts of change notifications into bounded-rate flushes,
//! renders deterministic snapshots of the watched collection and fans them out
//! to every subscriber of a stream.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use k8s_openapi::api::core::v1::Pod;
//! use watch_engine::{
//!     EngineConfig, EngineContext, KubeBackend, StreamRequest, StreamScope, TenantKey,
//!     TickClass, WatchTarget,
//! };
//! # use watch_engine::{ObjectView, TransformSkip};
//! # #[derive(Debug)]
//! # struct Names;
//! # impl ObjectView for Names {
//! #     fn kind(&self) -> &str { "Pod" }
//! #     fn project(&self, obj: &kube::core::DynamicObject) -> Result<serde_json::Value, TransformSkip> {
//! #         Ok(serde_json::json!(obj.metadata.name))
//! #     }
//! # }
//!
//! # async fn example(client: kube::Client) -> Result<(), Box<dyn std::error::Error>> {
//! let backend = KubeBackend::new();
//! let tenant = TenantKey::new("prod-config", "eu-west-1");
//! backend.insert(tenant.clone(), client);
//!
//! let engine = EngineContext::new(
//!     EngineConfig::default(),
//!     Arc::new(backend.clone()),
//!     Arc::new(backend),
//! );
//!
//! let mut subscription = engine
//!     .open_stream(StreamRequest {
//!         tenant,
//!         target: WatchTarget::builtin::<Pod>(),
//!         scope: StreamScope::All,
//!         view: Arc::new(Names),
//!         tick: TickClass::Fast,
//!     })
//!     .await?;
//!
//! while let Some(payload) = subscription.recv().await {
//!     println!("{}: {}", payload.event_name(), payload.data());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - **Session registry**: atomic get-or-create of watch sessions with a sync barrier
//! - **Coalescer**: bounded, latest-wins debouncer executed on a fixed tick
//! - **Stream hub**: non-blocking fan-out of payloads to subscribers
//! - **Transform**: natural-order, fault-tolerant snapshot rendering
//! - **Discovery cache**: TTL cache of cluster discovery results

pub mod backend;
pub mod cache;
pub mod coalescer;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hub;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod registry;
pub mod session;
pub mod tenant;
pub mod transform;

mod sync;

pub use backend::{DiscoveryProbe, KubeBackend, RawEventStream, WatchFailure, WatchSource};
pub use cache::TtlCache;
pub use coalescer::{Coalescer, FlushAction, TickClass};
pub use config::EngineConfig;
pub use discovery::{ApiGroupVersion, DiscoveredResource, DiscoveryCache, ResourceIndex};
pub use engine::{EngineContext, SnapshotJob, StreamRequest, TeardownReport};
pub use error::{DiscoveryPartial, EngineError, TransformSkip};
pub use hub::{Payload, StreamHub, Subscription};
#[cfg(feature = "test-util")]
pub use mock::{MockClusterBackend, MockFeed};
pub use registry::SessionRegistry;
pub use session::{SyncState, WatchSession, WatchTarget};
pub use tenant::{Gvr, Selector, SessionKey, StreamKey, StreamScope, TenantKey};
pub use transform::{natural_cmp, render, transform, ObjectView};
