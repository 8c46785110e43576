//! Engine context: wires registry, coalescers, hub and discovery together.
//!
//! Opening a stream gets or creates the shared session, waits for its initial
//! list, subscribes, binds a change listener that arms the coalescer for the
//! stream key, and sends the current snapshot to the new subscriber right away.

use crate::backend::{DiscoveryProbe, WatchSource};
use crate::coalescer::{Coalescer, FlushAction, TickClass};
use crate::config::EngineConfig;
use crate::discovery::DiscoveryCache;
use crate::error::EngineError;
use crate::hub::{Payload, StreamHub, Subscription};
use crate::registry::SessionRegistry;
use crate::session::{SyncState, WatchSession, WatchTarget};
use crate::tenant::{StreamKey, StreamScope, TenantKey};
use crate::transform::{render, ObjectView};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Parameters of one stream subscription.
#[derive(Clone)]
pub struct StreamRequest {
    /// Tenant to watch
    pub tenant: TenantKey,
    /// Watched collection
    pub target: WatchTarget,
    /// Slice of the collection the stream renders
    pub scope: StreamScope,
    /// Projection applied on every flush
    pub view: Arc<dyn ObjectView>,
    /// Coalescer tick class
    pub tick: TickClass,
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("tenant", &self.tenant)
            .field("kind", &self.target.kind())
            .field("scope", &self.scope)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

/// Renders and publishes the snapshot of one stream.
///
/// Holds the session weakly; a job outliving its session's teardown does nothing.
#[derive(Clone)]
pub struct SnapshotJob {
    key: StreamKey,
    session: Weak<WatchSession>,
    view: Arc<dyn ObjectView>,
    scope: StreamScope,
    hub: StreamHub,
}

impl fmt::Debug for SnapshotJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotJob")
            .field("key", &self.key.as_str())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl SnapshotJob {
    /// Creates a job rendering `session` through `view`.
    pub fn new(
        key: StreamKey,
        session: &Arc<WatchSession>,
        view: Arc<dyn ObjectView>,
        scope: StreamScope,
        hub: StreamHub,
    ) -> Self {
        Self {
            key,
            session: Arc::downgrade(session),
            view,
            scope,
            hub,
        }
    }

    /// Stream key this job publishes to.
    #[must_use]
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Current payload: an error once the session is denied or stopped, the
    /// rendered snapshot otherwise. `None` once the session is gone.
    #[must_use]
    pub fn payload(&self) -> Option<Payload> {
        let session = self.session.upgrade()?;
        let payload = match session.state() {
            SyncState::Denied(reason) => Payload::error("forbidden", &reason),
            SyncState::Stopped => Payload::error(
                "session_stopped",
                &format!("watch session {} has stopped", session.key()),
            ),
            SyncState::Syncing | SyncState::Ready => {
                let body = render(self.view.as_ref(), &self.scope, &session.snapshot());
                Payload::Snapshot(body.to_string().into())
            }
        };
        Some(payload)
    }

    /// Publishes the current payload to every subscriber. Skips all work when
    /// nobody is listening.
    pub fn flush(&self) -> usize {
        if self.hub.subscriber_count(&self.key) == 0 {
            debug!("No subscribers on {}, skipping flush", self.key);
            return 0;
        }
        match self.payload() {
            Some(payload) => self.hub.publish(&self.key, &payload),
            None => 0,
        }
    }

    /// One-shot coalescer action running [`SnapshotJob::flush`].
    #[must_use]
    pub fn action(&self) -> FlushAction {
        let job = self.clone();
        FlushAction::new(move || {
            job.flush();
        })
    }
}

/// What one tenant teardown removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Watch sessions stopped
    pub sessions: usize,
    /// Pending coalescer flushes dropped
    pub pending: usize,
    /// Subscribers disconnected
    pub subscribers: usize,
    /// Discovery cache entries dropped
    pub discovery_entries: usize,
}

/// Process-wide engine state. Construct once and share behind an `Arc`.
pub struct EngineContext {
    config: EngineConfig,
    source: Arc<dyn WatchSource>,
    registry: SessionRegistry,
    fast: Arc<Coalescer>,
    slow: Arc<Coalescer>,
    hub: StreamHub,
    discovery: DiscoveryCache,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("fast", &self.fast)
            .field("slow", &self.slow)
            .field("hub", &self.hub)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Builds the engine and starts both coalescer tick loops.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn WatchSource>,
        probe: Arc<dyn DiscoveryProbe>,
    ) -> Self {
        let fast = Arc::new(Coalescer::new(
            "fast",
            config.tick_for(TickClass::Fast),
            config.coalescer_capacity,
        ));
        let slow = Arc::new(Coalescer::new(
            "slow",
            config.tick_for(TickClass::Slow),
            config.coalescer_capacity,
        ));
        fast.start();
        slow.start();

        Self {
            registry: SessionRegistry::new(Arc::clone(&source)),
            hub: StreamHub::new(config.subscriber_buffer),
            discovery: DiscoveryCache::new(probe, config.discovery_ttl),
            source,
            fast,
            slow,
            config,
        }
    }

    /// Opens a stream and returns its subscription.
    ///
    /// The subscription receives the current snapshot immediately and a fresh
    /// one after every coalesced change.
    pub async fn open_stream(&self, request: StreamRequest) -> Result<Subscription, EngineError> {
        let StreamRequest {
            tenant,
            target,
            scope,
            view,
            tick,
        } = request;

        let session = self.registry.get_or_create(&tenant, &target)?;
        self.registry
            .wait_for_sync(&session, self.config.sync_timeout)
            .await?;

        let key = StreamKey::new(&tenant, &target.stream_kind(), &scope);
        let subscription = self.hub.subscribe(&key);
        let job = SnapshotJob::new(key.clone(), &session, view, scope, self.hub.clone());

        // A listener whose stream lost its last subscriber unbinds itself
        // instead of arming the coalescer.
        let coalescer = Arc::clone(self.coalescer(tick));
        let listener_job = job.clone();
        let weak_session = Arc::downgrade(&session);
        let hub = self.hub.clone();
        session.bind(
            key.clone(),
            Arc::new(move || {
                let key = listener_job.key();
                let Some(session) = weak_session.upgrade() else {
                    return;
                };
                if session.unbind_if(key, || hub.subscriber_count(key) == 0) {
                    return;
                }
                coalescer.arm(key.clone(), listener_job.action());
            }),
        );

        if let Some(payload) = job.payload() {
            self.hub.send(&key, subscription.id(), &payload);
        }
        info!("Opened stream {} (subscriber {})", key, subscription.id());
        Ok(subscription)
    }

    /// Tears down everything belonging to one tenant.
    ///
    /// The backend client is released first, so a concurrent request for the
    /// tenant fails with `TenantNotFound` instead of starting a session the
    /// teardown would miss.
    pub fn remove_tenant(&self, tenant: &TenantKey) -> TeardownReport {
        self.source.release(tenant);
        let report = TeardownReport {
            sessions: self.registry.remove_tenant(tenant),
            pending: self.fast.remove_tenant(tenant) + self.slow.remove_tenant(tenant),
            subscribers: self.hub.remove_tenant(tenant),
            discovery_entries: self.discovery.invalidate_tenant(tenant),
        };
        info!("Removed tenant {}: {:?}", tenant, report);
        report
    }

    /// Stops every session and both coalescers.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        self.fast.stop();
        self.slow.stop();
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Stream hub.
    #[must_use]
    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    /// Discovery cache.
    #[must_use]
    pub fn discovery(&self) -> &DiscoveryCache {
        &self.discovery
    }

    /// Coalescer serving a tick class.
    #[must_use]
    pub fn coalescer(&self, class: TickClass) -> &Arc<Coalescer> {
        match class {
            TickClass::Fast => &self.fast,
            TickClass::Slow => &self.slow,
        }
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
