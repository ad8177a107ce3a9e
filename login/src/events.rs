use crate::session::Session;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    PasswordRecovery,
    TokenRefreshed,
    UserUpdated,
}

impl AuthEventKind {
    /// Kinds that mean a usable session now exists.
    pub fn establishes_session(self) -> bool {
        matches!(
            self,
            AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed | AuthEventKind::PasswordRecovery
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

type Subscribers = HashMap<u64, mpsc::UnboundedSender<AuthEvent>>;

#[derive(Debug, Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl BusInner {
    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide "auth state changed" channel.
///
/// Listeners hold an [`AuthSubscription`] and stop receiving once it is
/// unsubscribed or dropped. Clones share the same subscriber set.
#[derive(Debug, Clone, Default)]
pub struct AuthEventBus {
    inner: Arc<BusInner>,
}

impl AuthEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> AuthSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers().insert(id, tx);
        debug!(id, "auth subscriber added");
        AuthSubscription {
            id,
            bus: Arc::downgrade(&self.inner),
            rx,
        }
    }

    /// Deliver `event` to every live subscriber and return how many got it.
    pub fn publish(&self, event: AuthEvent) -> usize {
        let mut subscribers = self.inner.subscribers();
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        debug!(kind = ?event.kind, delivered = subscribers.len(), "auth event published");
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

/// Handle for one listener on an [`AuthEventBus`].
#[derive(Debug)]
pub struct AuthSubscription {
    id: u64,
    bus: std::sync::Weak<BusInner>,
    rx: mpsc::UnboundedReceiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once unsubscribed or the bus is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    fn detach(&mut self) {
        if let Some(bus) = self.bus.upgrade()
            && bus.subscribers().remove(&self.id).is_some()
        {
            debug!(id = self.id, "auth subscriber removed");
        }
        self.rx.close();
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::User;
    use pretty_assertions::assert_eq;

    fn signed_in() -> AuthEvent {
        AuthEvent::new(
            AuthEventKind::SignedIn,
            Some(Session {
                access_token: "tok".to_string(),
                refresh_token: None,
                expires_at: None,
                user: User {
                    id: "user-1".to_string(),
                    email: None,
                },
            }),
        )
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = AuthEventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(signed_in()), 2);
        assert_eq!(
            bus.publish(AuthEvent::new(AuthEventKind::SignedOut, None)),
            2
        );

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await.map(|e| e.kind), Some(AuthEventKind::SignedIn));
            assert_eq!(sub.recv().await.map(|e| e.kind), Some(AuthEventKind::SignedOut));
        }
    }

    #[tokio::test]
    async fn unsubscribe_and_drop_both_detach() {
        let bus = AuthEventBus::new();
        let explicit = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        explicit.unsubscribe();
        drop(dropped);

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(signed_in()), 0);
    }

    #[test]
    fn event_kinds_use_wire_names() -> serde_json::Result<()> {
        assert_eq!(
            serde_json::to_string(&AuthEventKind::PasswordRecovery)?,
            r#""PASSWORD_RECOVERY""#
        );
        assert!(AuthEventKind::TokenRefreshed.establishes_session());
        assert!(!AuthEventKind::SignedOut.establishes_session());
        assert!(!AuthEventKind::UserUpdated.establishes_session());
        Ok(())
    }
}
