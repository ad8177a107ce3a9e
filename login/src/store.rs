use crate::events::AuthEvent;
use crate::events::AuthEventBus;
use crate::events::AuthEventKind;
use crate::session::Session;
use crate::session::SessionSource;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

/// The process's current session. Every change is published on the bus.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    current: Arc<RwLock<Option<Session>>>,
    bus: AuthEventBus,
}

impl SessionStore {
    pub fn new(bus: AuthEventBus) -> Self {
        Self {
            current: Arc::default(),
            bus,
        }
    }

    pub fn bus(&self) -> &AuthEventBus {
        &self.bus
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the session and announce it with `kind`.
    pub fn set(&self, kind: AuthEventKind, session: Session) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        self.bus.publish(AuthEvent::new(kind, Some(session)));
    }

    pub fn clear(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            self.bus.publish(AuthEvent::new(AuthEventKind::SignedOut, None));
        }
    }
}

#[async_trait]
impl SessionSource for SessionStore {
    async fn current_session(&self) -> Option<Session> {
        self.snapshot()
    }
}
