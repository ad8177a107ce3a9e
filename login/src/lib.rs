mod awaiter;
mod events;
mod identity;
mod recovery;
mod session;
mod store;

pub use awaiter::AwaitConfig;
pub use awaiter::AwaitOutcome;
pub use awaiter::AwaitPhase;
pub use awaiter::AwaitState;
pub use awaiter::RECOVERY_LINK_EXPIRED_MESSAGE;
pub use awaiter::SessionAwaiter;
pub use events::AuthEvent;
pub use events::AuthEventBus;
pub use events::AuthEventKind;
pub use events::AuthSubscription;
pub use identity::IdentityClient;
pub use identity::IdentityError;
pub use identity::MIN_PASSWORD_LEN;
pub use recovery::RecoveryLink;
pub use session::Session;
pub use session::SessionSource;
pub use session::User;
pub use store::SessionStore;
