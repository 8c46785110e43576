//! Shared watch sessions.
//!
//! A session mirrors one watched collection into a `kube_runtime` reflector
//! store and notifies every bound stream when the collection changes. The
//! store is read-only from the outside; only the session's own watch loop
//! writes to it.

use crate::backend::{RawEventStream, WatchFailure};
use crate::error::EngineError;
use crate::sync::lock;
use crate::tenant::{Gvr, Selector, SessionKey, StreamKey};
use futures::StreamExt;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::Store;
use kube_runtime::watcher;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback a session invokes after every change to its store.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle of a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Initial list still in flight
    Syncing,
    /// Store reflects the full collection
    Ready,
    /// The cluster refused the watch; terminal for this session
    Denied(String),
    /// Watch loop ended (tenant teardown or stream end)
    Stopped,
}

/// What to watch: a resource type, optionally narrowed by namespace and selectors.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    kind: String,
    api_resource: ApiResource,
    gvr: Option<Gvr>,
    namespace: Option<String>,
    selector: Selector,
}

impl WatchTarget {
    /// Target for a built-in `k8s-openapi` resource type.
    #[must_use]
    pub fn builtin<K>() -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self {
            kind: K::kind(&()).into_owned(),
            api_resource: ApiResource::erase::<K>(&()),
            gvr: None,
            namespace: None,
            selector: Selector::default(),
        }
    }

    /// Target for a dynamic or custom resource.
    #[must_use]
    pub fn dynamic(gvr: Gvr, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, &kind);
        Self {
            api_resource: ApiResource::from_gvk_with_plural(&gvk, &gvr.resource),
            kind,
            gvr: Some(gvr),
            namespace: None,
            selector: Selector::default(),
        }
    }

    /// Restricts the watch itself to one namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Applies server-side selectors.
    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Resource kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Kind as rendered into stream keys, qualified by the GVR of dynamic
    /// targets and by the watch's own namespace and selectors, so two
    /// different watches never share a stream.
    #[must_use]
    pub fn stream_kind(&self) -> String {
        let mut kind = self.kind.clone();
        if let Some(gvr) = &self.gvr {
            for part in [&gvr.group, &gvr.version, &gvr.resource] {
                kind.push('-');
                kind.push_str(part);
            }
        }
        if let Some(namespace) = &self.namespace {
            kind.push_str("-in-");
            kind.push_str(namespace);
        }
        for (marker, part) in [("-l-", &self.selector.labels), ("-f-", &self.selector.fields)] {
            if let Some(part) = part.as_deref().filter(|p| !p.is_empty()) {
                kind.push_str(marker);
                kind.push_str(part);
            }
        }
        kind
    }

    /// API resource descriptor used for the dynamic client.
    #[must_use]
    pub fn api_resource(&self) -> &ApiResource {
        &self.api_resource
    }

    /// GVR for dynamic targets.
    #[must_use]
    pub fn gvr(&self) -> Option<&Gvr> {
        self.gvr.as_ref()
    }

    /// Namespace restriction.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Server-side selectors.
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// One long-lived watch of a resource collection for a tenant.
pub struct WatchSession {
    key: SessionKey,
    target: WatchTarget,
    store: Store<DynamicObject>,
    state: watch::Sender<SyncState>,
    listeners: Mutex<HashMap<StreamKey, ChangeListener>>,
    cancel: CancellationToken,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("key", &self.key.to_string())
            .field("state", &*self.state.borrow())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    /// Creates the session and spawns its watch loop.
    ///
    /// The loop is cancelled by [`WatchSession::stop`] or by cancelling `parent`.
    pub(crate) fn start(
        key: SessionKey,
        target: WatchTarget,
        events: RawEventStream,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        let writer = Writer::new(target.api_resource.clone());
        let (state, _) = watch::channel(SyncState::Syncing);
        let session = Arc::new(Self {
            key,
            target,
            store: writer.as_reader(),
            state,
            listeners: Mutex::new(HashMap::new()),
            cancel: parent.child_token(),
        });
        tokio::spawn(run_watch_loop(Arc::clone(&session), events, writer));
        session
    }

    /// Registry key of this session.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Watch target.
    #[must_use]
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// True once the initial list has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == SyncState::Ready
    }

    /// Current store contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<DynamicObject>> {
        self.store.state()
    }

    /// Blocks until the initial list completes, the session fails, or `timeout` elapses.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), EngineError> {
        let mut rx = self.state.subscribe();
        let outcome = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| *state != SyncState::Syncing)
                .await
                .map(|state| state.clone())
        })
        .await;

        match outcome {
            Err(_) => Err(EngineError::SyncTimeout {
                session: self.key.to_string(),
                timeout,
            }),
            Ok(Err(_)) | Ok(Ok(SyncState::Stopped | SyncState::Syncing)) => {
                Err(EngineError::SessionStopped(self.key.to_string()))
            }
            Ok(Ok(SyncState::Denied(reason))) => Err(EngineError::AuthorizationDenied {
                resource: self.key.to_string(),
                reason,
            }),
            Ok(Ok(SyncState::Ready)) => Ok(()),
        }
    }

    /// Binds a change listener for a stream key, replacing any previous one.
    pub fn bind(&self, stream: StreamKey, listener: ChangeListener) {
        lock(&self.listeners).insert(stream, listener);
    }

    /// Removes the listener of `stream` when `idle` holds.
    ///
    /// `idle` is evaluated under the listener lock, so a listener bound by a
    /// concurrent [`WatchSession::bind`] is either seen by `idle` or bound
    /// after the removal.
    pub fn unbind_if(&self, stream: &StreamKey, idle: impl FnOnce() -> bool) -> bool {
        let mut listeners = lock(&self.listeners);
        if listeners.contains_key(stream) && idle() {
            listeners.remove(stream);
            debug!("Unbound idle stream {} from {}", stream, self.key);
            true
        } else {
            false
        }
    }

    /// Number of bound streams.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Stops the watch loop and drops every listener.
    pub fn stop(&self) {
        self.cancel.cancel();
        lock(&self.listeners).clear();
    }

    fn set_state(&self, next: SyncState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    fn notify(&self) {
        // Listeners arm coalescers; call them outside the listener lock.
        let listeners: Vec<ChangeListener> = lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

async fn run_watch_loop(
    session: Arc<WatchSession>,
    mut events: RawEventStream,
    mut writer: Writer<DynamicObject>,
) {
    let key = session.key.to_string();
    debug!("Starting watch loop for {}", key);

    loop {
        let next = tokio::select! {
            () = session.cancel.cancelled() => {
                debug!("Watch loop for {} cancelled", key);
                break;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                writer.apply_watcher_event(&event);
                match event {
                    watcher::Event::InitDone => {
                        if session.set_state(SyncState::Ready) {
                            info!("{} synced ({} objects)", key, session.store.state().len());
                        }
                        session.notify();
                    }
                    watcher::Event::Apply(_) | watcher::Event::Delete(_) => {
                        if session.is_ready() {
                            session.notify();
                        }
                    }
                    watcher::Event::Init | watcher::Event::InitApply(_) => {}
                }
            }
            Some(Err(WatchFailure::Forbidden(reason))) => {
                warn!("Watch for {} denied: {}", key, reason);
                session.set_state(SyncState::Denied(reason));
                session.notify();
                return;
            }
            Some(Err(WatchFailure::Transient(reason))) => {
                warn!("Watch error for {} (retrying): {}", key, reason);
            }
            None => {
                warn!("Watch stream for {} ended", key);
                break;
            }
        }
    }

    session.set_state(SyncState::Stopped);
}
