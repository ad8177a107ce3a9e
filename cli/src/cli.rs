use clap::Args;
use clap::Parser;
use clap::Subcommand;
use repochat_core::ConfigOverrides;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "repochat", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Base URL of the backend API, e.g. `https://host/api/v1`.
    #[arg(long = "api-url", global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Bearer token to use instead of the stored one.
    #[arg(long = "token", global = true, value_name = "TOKEN")]
    pub access_token: Option<String>,

    /// User id to act as instead of the stored one.
    #[arg(long = "user-id", global = true, value_name = "ID")]
    pub user_id: Option<String>,

    /// Give up on an answer (and on each backend call) after this long.
    #[arg(long = "timeout", global = true, value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Log debug output to stderr. `RUST_LOG` takes precedence.
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_base_url: self.api_url.clone(),
            access_token: self.access_token.clone(),
            user_id: self.user_id.clone(),
            request_timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask a single question about an indexed repository.
    Ask(AskArgs),

    /// Converse about an indexed repository. Ctrl-C stops the current answer.
    Chat(ChatArgs),

    /// Manage indexed repositories.
    Repos(ReposCommand),

    /// Print the stored conversation for a repository.
    History(RepoArgs),

    /// Sign in with email and password (password read from stdin).
    Login(LoginArgs),

    /// Sign out and forget the stored credentials.
    Logout,

    /// Complete a password reset from the link in the recovery email.
    Recover(RecoverArgs),
}

#[derive(Debug, Args)]
pub struct RepoArgs {
    /// Repository name, as shown by `repochat repos list`.
    pub repo: String,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Repository name, as shown by `repochat repos list`.
    pub repo: String,

    pub question: String,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Repository name, as shown by `repochat repos list`.
    pub repo: String,

    /// Start with an empty transcript instead of the stored conversation.
    #[arg(long = "no-history", default_value_t = false)]
    pub no_history: bool,
}

#[derive(Debug, Args)]
pub struct ReposCommand {
    #[command(subcommand)]
    pub action: ReposAction,
}

#[derive(Debug, Subcommand)]
pub enum ReposAction {
    /// List indexed repositories.
    List,

    /// Index a repository by its https URL.
    Index { url: String },

    /// Delete an indexed repository and its conversation.
    Delete { repo: String },
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    pub email: String,
}

#[derive(Debug, Args)]
pub struct RecoverArgs {
    /// The full link from the recovery email, or just its `#...` fragment.
    pub link: String,
}
