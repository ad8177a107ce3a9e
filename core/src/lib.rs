//! Chat sessions, configuration and repository bookkeeping for the repochat
//! client, built on `repochat-api` and `repochat-login`.

pub mod chat;
pub mod config;
pub mod repos;
pub mod transcript;

pub use chat::APOLOGY_MESSAGE;
pub use chat::ChatError;
pub use chat::ChatEvent;
pub use chat::ChatSession;
pub use chat::SendOutcome;
pub use config::Config;
pub use config::ConfigError;
pub use config::ConfigOverrides;
pub use repos::MAX_REPOS;
pub use repos::RepoError;
pub use transcript::ConversationTurn;
pub use transcript::Role;
pub use transcript::Transcript;
