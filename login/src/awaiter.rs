//! Waiting for a session that someone else is busy establishing.
//!
//! Opening a recovery link hands the identity service a token; the session
//! it yields shows up asynchronously, either through the session probe or as
//! an auth event. [`SessionAwaiter`] races a bounded polling loop against the
//! event subscription and resolves with whichever produces a session first.
//! The loop is bounded by attempt count, so
//! `settle_delay + interval * max_attempts` is the effective deadline.

use crate::events::AuthEvent;
use crate::events::AuthEventBus;
use crate::events::AuthSubscription;
use crate::session::Session;
use crate::session::SessionSource;
use chrono::Utc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub const RECOVERY_LINK_EXPIRED_MESSAGE: &str =
    "The recovery link appears to have expired. Please request a new one.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitConfig {
    /// Failed polls tolerated before giving up. The initial probe is not one.
    pub max_attempts: u32,
    pub interval: Duration,
    /// Pause before the first probe so a redirect-driven exchange can land.
    pub settle_delay: Duration,
    /// Optional wall-clock cap on top of the attempt bound.
    pub hard_timeout: Option<Duration>,
}

impl Default for AwaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(500),
            settle_delay: Duration::from_millis(250),
            hard_timeout: None,
        }
    }
}

impl AwaitConfig {
    /// Longest the awaiter can take, ignoring probe latency.
    pub fn effective_deadline(&self) -> Duration {
        let polling = self.interval.saturating_mul(self.max_attempts);
        let bound = self.settle_delay.saturating_add(polling);
        match self.hard_timeout {
            Some(hard) => bound.min(hard),
            None => bound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitPhase {
    Probing,
    Polling,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitOutcome {
    Ready(Session),
    Failed(String),
}

impl AwaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, AwaitOutcome::Ready(_))
    }
}

/// Progress of one wait. `Ready` and `Failed` are terminal: once reached,
/// further probes and events leave the state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub phase: AwaitPhase,
    pub session: Option<Session>,
    pub terminal_error: Option<String>,
}

impl AwaitState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            phase: AwaitPhase::Probing,
            session: None,
            terminal_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, AwaitPhase::Ready | AwaitPhase::Failed)
    }

    pub fn session_ready(&self) -> bool {
        self.phase == AwaitPhase::Ready
    }

    pub fn outcome(&self) -> Option<AwaitOutcome> {
        match self.phase {
            AwaitPhase::Ready => self.session.clone().map(AwaitOutcome::Ready),
            AwaitPhase::Failed => Some(AwaitOutcome::Failed(
                self.terminal_error
                    .clone()
                    .unwrap_or_else(|| RECOVERY_LINK_EXPIRED_MESSAGE.to_string()),
            )),
            AwaitPhase::Probing | AwaitPhase::Polling => None,
        }
    }

    /// Fold in the result of a probe. Returns the outcome if this probe made
    /// the state terminal.
    pub fn record_probe(&mut self, session: Option<Session>) -> Option<AwaitOutcome> {
        if self.is_terminal() {
            return None;
        }
        if let Some(session) = usable(session) {
            return self.become_ready(session);
        }
        match self.phase {
            AwaitPhase::Probing => self.phase = AwaitPhase::Polling,
            _ => self.attempt += 1,
        }
        debug!(
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            "no session yet"
        );
        if self.attempt >= self.max_attempts {
            return self.fail(RECOVERY_LINK_EXPIRED_MESSAGE);
        }
        None
    }

    /// Fold in an auth event. Returns the outcome if this event made the
    /// state terminal; every other event, including repeats after `Ready`, is
    /// a no-op.
    pub fn on_auth_event(&mut self, event: &AuthEvent) -> Option<AwaitOutcome> {
        if self.is_terminal() || !event.kind.establishes_session() {
            return None;
        }
        let session = usable(event.session.clone())?;
        info!(kind = ?event.kind, "session established by auth event");
        self.become_ready(session)
    }

    pub fn fail(&mut self, message: &str) -> Option<AwaitOutcome> {
        if self.is_terminal() {
            return None;
        }
        warn!(attempt = self.attempt, "giving up on session: {message}");
        self.phase = AwaitPhase::Failed;
        self.terminal_error = Some(message.to_string());
        self.outcome()
    }

    fn become_ready(&mut self, session: Session) -> Option<AwaitOutcome> {
        info!(attempt = self.attempt, user_id = %session.user.id, "session ready");
        self.phase = AwaitPhase::Ready;
        self.session = Some(session);
        self.outcome()
    }
}

fn usable(session: Option<Session>) -> Option<Session> {
    session.filter(|session| session.is_usable_at(Utc::now()))
}

/// Resolves once a session exists or the wait is exhausted. Never errors and
/// never hangs past [`AwaitConfig::effective_deadline`].
pub struct SessionAwaiter<S: SessionSource> {
    source: S,
    bus: AuthEventBus,
    config: AwaitConfig,
}

impl<S: SessionSource> SessionAwaiter<S> {
    pub fn new(source: S, bus: AuthEventBus, config: AwaitConfig) -> Self {
        Self {
            source,
            bus,
            config,
        }
    }

    pub fn config(&self) -> &AwaitConfig {
        &self.config
    }

    /// Every call starts from a fresh [`AwaitState`].
    pub async fn await_session(&self) -> AwaitOutcome {
        let state = Mutex::new(AwaitState::new(self.config.max_attempts));
        let subscription = self.bus.subscribe();

        let race = self.race(subscription, &state);
        let outcome = match self.config.hard_timeout {
            Some(limit) => match tokio::time::timeout(limit, race).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let mut state = lock(&state);
                    state
                        .fail(RECOVERY_LINK_EXPIRED_MESSAGE)
                        .or_else(|| state.outcome())
                        .unwrap_or_else(|| {
                            AwaitOutcome::Failed(RECOVERY_LINK_EXPIRED_MESSAGE.to_string())
                        })
                }
            },
            None => race.await,
        };
        debug!(ready = outcome.is_ready(), "session wait finished");
        outcome
    }

    async fn race(
        &self,
        mut subscription: AuthSubscription,
        state: &Mutex<AwaitState>,
    ) -> AwaitOutcome {
        let outcome = tokio::select! {
            outcome = self.probe_and_poll(state) => outcome,
            outcome = listen(&mut subscription, state) => outcome,
        };
        subscription.unsubscribe();
        outcome
    }

    async fn probe_and_poll(&self, state: &Mutex<AwaitState>) -> AwaitOutcome {
        sleep(self.config.settle_delay).await;
        loop {
            let session = self.source.current_session().await;
            let settled = {
                let mut guard = lock(state);
                // `outcome()` covers the listener having got there first.
                guard.record_probe(session).or_else(|| guard.outcome())
            };
            if let Some(outcome) = settled {
                return outcome;
            }
            sleep(self.config.interval).await;
        }
    }
}

async fn listen(subscription: &mut AuthSubscription, state: &Mutex<AwaitState>) -> AwaitOutcome {
    while let Some(event) = subscription.recv().await {
        if let Some(outcome) = lock(state).on_auth_event(&event) {
            return outcome;
        }
    }
    // Bus gone: leave it to the polling loop.
    std::future::pending().await
}

fn lock(state: &Mutex<AwaitState>) -> MutexGuard<'_, AwaitState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
