use crate::transcript::Role;
use crate::transcript::Transcript;
use repochat_api::ApiError;
use repochat_api::AskClient;
use repochat_api::AskRequest;
use repochat_api::AuthProvider;
use repochat_api::BackendClient;
use repochat_api::CancelReason;
use repochat_api::CancellationController;
use repochat_api::HttpTransport;
use repochat_api::Provider;
use repochat_api::SaveOutcome;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub const APOLOGY_MESSAGE: &str = "Sorry, something went wrong while generating a response.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("an answer is still being generated")]
    TurnInFlight,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Progress of a send, for incremental rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    UserTurn(String),
    Fragment(String),
    Completed(String),
    Notice(String),
    Failed(String),
    Cancelled,
}

/// How a send resolved. Precondition failures are [`ChatError`]s instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream ended normally. Empty when the server sent no text.
    Answered(String),
    /// Rate limited before any text arrived; the transcript only gained the
    /// question.
    RateLimited(String),
    /// Stopped by [`ChatSession::cancel_in_flight`]; the partial answer
    /// stays in the transcript and is not persisted.
    Cancelled,
    /// Any other failure; an apology turn was appended.
    Failed(ApiError),
}

/// One conversation about one indexed repository.
///
/// Only one answer streams at a time: a send while another is outstanding
/// fails with [`ChatError::TurnInFlight`].
pub struct ChatSession<T: HttpTransport, A: AuthProvider> {
    ask: AskClient<T, A>,
    backend: BackendClient<T, A>,
    user_id: String,
    repo_name: String,
    answer_deadline: Duration,
    transcript: Mutex<Transcript>,
    in_flight: Mutex<Option<CancellationController>>,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl<T, A> ChatSession<T, A>
where
    T: HttpTransport + Clone,
    A: AuthProvider + Clone,
{
    pub fn new(
        transport: T,
        provider: Provider,
        auth: A,
        user_id: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        let answer_deadline = provider.request_timeout;
        Self {
            ask: AskClient::new(transport.clone(), provider.clone(), auth.clone()),
            backend: BackendClient::new(transport, provider, auth),
            user_id: user_id.into(),
            repo_name: repo_name.into(),
            answer_deadline,
            transcript: Mutex::new(Transcript::new()),
            in_flight: Mutex::new(None),
            events: None,
        }
    }
}

impl<T: HttpTransport, A: AuthProvider> ChatSession<T, A> {
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_answer_deadline(mut self, deadline: Duration) -> Self {
        self.answer_deadline = deadline;
        self
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn transcript(&self) -> Transcript {
        lock(&self.transcript).clone()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Cancel the answer being streamed, if any.
    pub fn cancel_in_flight(&self) -> bool {
        match lock(&self.in_flight).as_ref() {
            Some(controller) => {
                controller.cancel();
                true
            }
            None => false,
        }
    }

    /// Replace the transcript with the stored history of this repository.
    pub async fn load_history(&self) -> Result<usize, ChatError> {
        if self.is_busy() {
            return Err(ChatError::TurnInFlight);
        }
        let history = self
            .backend
            .chat_history(&self.user_id, &self.repo_name)
            .await?;
        let transcript = Transcript::from_history(history);
        let len = transcript.len();
        *lock(&self.transcript) = transcript;
        debug!(repo_name = %self.repo_name, turns = len, "history loaded");
        Ok(len)
    }

    /// Ask `question` and stream the answer into the transcript.
    pub async fn send(&self, question: &str) -> Result<SendOutcome, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        let slot = InFlight::claim(&self.in_flight, self.answer_deadline)?;
        let controller = slot.controller.clone();

        lock(&self.transcript).push_turn(Role::User, question);
        self.emit(ChatEvent::UserTurn(question.to_string()));

        let request = AskRequest {
            collection_name: self.repo_name.clone(),
            question: question.to_string(),
            user_id: self.user_id.clone(),
        };
        let mut answer = String::new();
        let streamed = self.ask.ask(&request, &controller, |fragment| {
            answer.push_str(fragment);
            lock(&self.transcript).append(Role::Assistant, fragment);
            self.emit(ChatEvent::Fragment(fragment.to_string()));
        });
        // The question is stored while the answer streams.
        let ((), result) = tokio::join!(self.persist(Role::User, question), streamed);
        lock(&self.transcript).close_open_turn();

        let outcome = match result {
            Ok(summary) => {
                info!(fragments = summary.fragments, "answer complete");
                if !answer.is_empty() {
                    self.persist(Role::Assistant, &answer).await;
                }
                self.emit(ChatEvent::Completed(answer.clone()));
                SendOutcome::Answered(answer)
            }
            Err(_) if controller.reason() == Some(CancelReason::Requested) => {
                info!(partial_len = answer.len(), "answer cancelled");
                self.emit(ChatEvent::Cancelled);
                SendOutcome::Cancelled
            }
            Err(err @ ApiError::RateLimited { .. }) => {
                let message = err.user_message();
                self.emit(ChatEvent::Notice(message.clone()));
                SendOutcome::RateLimited(message)
            }
            Err(err) => {
                warn!("answer failed: {err}");
                lock(&self.transcript).push_turn(Role::Assistant, APOLOGY_MESSAGE);
                self.emit(ChatEvent::Failed(err.user_message()));
                SendOutcome::Failed(err)
            }
        };
        drop(slot);
        Ok(outcome)
    }

    async fn persist(&self, role: Role, content: &str) {
        match self
            .backend
            .save_message(&self.user_id, &self.repo_name, role.into(), content)
            .await
        {
            Ok(SaveOutcome::Saved) => debug!(?role, "turn persisted"),
            Ok(SaveOutcome::Rejected(_)) => {}
            Err(err) => warn!(?role, "failed to persist turn: {err}"),
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Holds the in-flight slot for one send and frees it when dropped, even if
/// the send future itself is dropped mid-stream.
struct InFlight<'a> {
    slot: &'a Mutex<Option<CancellationController>>,
    controller: CancellationController,
}

impl<'a> InFlight<'a> {
    fn claim(
        slot: &'a Mutex<Option<CancellationController>>,
        deadline: Duration,
    ) -> Result<Self, ChatError> {
        let mut guard = lock(slot);
        if guard.is_some() {
            return Err(ChatError::TurnInFlight);
        }
        let controller = CancellationController::with_timeout(deadline);
        *guard = Some(controller.clone());
        Ok(Self { slot, controller })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.controller.disarm();
        lock(self.slot).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
