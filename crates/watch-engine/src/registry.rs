//! Watch session registry.
//!
//! Lazily creates and memoizes one [`WatchSession`] per session key. Creation
//! happens under the registry lock, so concurrent first requests for the same
//! tuple observe the same session and only one watch is ever opened.

use crate::backend::WatchSource;
use crate::error::EngineError;
use crate::session::{SyncState, WatchSession, WatchTarget};
use crate::sync::lock;
use crate::tenant::{SessionKey, TenantKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registry of shared watch sessions.
pub struct SessionRegistry {
    source: Arc<dyn WatchSource>,
    sessions: Mutex<HashMap<SessionKey, Arc<WatchSession>>>,
    shutdown: CancellationToken,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates a registry opening watches through `source`.
    pub fn new(source: Arc<dyn WatchSource>) -> Self {
        Self {
            source,
            sessions: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the live session for the tuple, starting its watch if absent.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_or_create(
        &self,
        tenant: &TenantKey,
        target: &WatchTarget,
    ) -> Result<Arc<WatchSession>, EngineError> {
        let key = SessionKey {
            tenant: tenant.clone(),
            kind: target.kind().to_string(),
            gvr: target.gvr().cloned(),
            namespace: target.namespace().map(str::to_string),
            selector: target.selector().clone(),
        };

        let mut sessions = lock(&self.sessions);
        if let Some(existing) = sessions.get(&key) {
            if existing.state() != SyncState::Stopped {
                return Ok(Arc::clone(existing));
            }
            warn!("Replacing stopped session {}", key);
        }

        let events = self.source.open(tenant, target)?;
        let session = WatchSession::start(key.clone(), target.clone(), events, &self.shutdown);
        info!("Started watch session {}", key);
        sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    /// Waits for the session's initial sync.
    ///
    /// A denied session is evicted, so a later request after a permission
    /// change opens a fresh watch instead of replaying the denial.
    pub async fn wait_for_sync(
        &self,
        session: &Arc<WatchSession>,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let result = session.wait_for_sync(timeout).await;
        if let Err(EngineError::AuthorizationDenied { .. }) = &result {
            self.evict(session);
        }
        result
    }

    /// Looks up an existing session.
    #[must_use]
    pub fn get(&self, key: &SessionKey) -> Option<Arc<WatchSession>> {
        lock(&self.sessions).get(key).cloned()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// True when no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    /// Stops and removes every session of a tenant.
    pub fn remove_tenant(&self, tenant: &TenantKey) -> usize {
        let removed: Vec<Arc<WatchSession>> = {
            let mut sessions = lock(&self.sessions);
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|key| &key.tenant == tenant)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| sessions.remove(key)).collect()
        };

        for session in &removed {
            session.stop();
        }
        if !removed.is_empty() {
            info!("Stopped {} watch sessions for {}", removed.len(), tenant);
        }
        removed.len()
    }

    /// Stops every session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<Arc<WatchSession>> =
            lock(&self.sessions).drain().map(|(_, session)| session).collect();
        for session in drained {
            session.stop();
        }
    }

    fn evict(&self, session: &Arc<WatchSession>) {
        let mut sessions = lock(&self.sessions);
        if sessions
            .get(session.key())
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(session.key());
            warn!("Evicted denied session {}", session.key());
        }
    }
}
