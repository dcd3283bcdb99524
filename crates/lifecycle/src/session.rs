//! Active input session registry.

use std::sync::{Arc, RwLock, Weak};

/// The running input session bound to system input focus.
pub trait ActiveSession: Send + Sync {
    /// Drop cached engine state and reload it. Best-effort, no result.
    fn notify_invalidate(&self);
}

/// Weak back-reference to the currently bound session, if any.
#[derive(Default)]
pub struct SessionRegistry {
    current: RwLock<Option<Weak<dyn ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `session`, replacing any previous one. The registry does not keep
    /// it alive.
    pub fn bind(&self, session: &Arc<dyn ActiveSession>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(Arc::downgrade(session));
        tracing::debug!("input session bound");
    }

    pub fn unbind(&self) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = None;
    }

    pub fn current(&self) -> Option<Arc<dyn ActiveSession>> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        current.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }

    /// Fire-and-forget invalidation. Returns whether a session was reached;
    /// no session is not an error.
    pub fn notify_invalidate(&self) -> bool {
        match self.current() {
            Some(session) => {
                session.notify_invalidate();
                tracing::info!("active session invalidated");
                true
            }
            None => {
                tracing::debug!("no active session to invalidate");
                false
            }
        }
    }
}
