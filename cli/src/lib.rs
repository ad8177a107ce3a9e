// Answers and listings go to stdout; prompts, notices and logs go to stderr.
mod auth_cmd;
mod chat_cmd;
mod cli;
mod repos_cmd;

pub use cli::Cli;
pub use cli::Command;
use repochat_api::error::MISSING_SESSION_MESSAGE;
use repochat_client::ReqwestTransport;
use repochat_client::create_client;
use repochat_core::Config;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::ReposAction;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();

    let config = Config::load(cli.config_overrides())?;
    debug!(api_base_url = %config.api_base_url, home = %config.repochat_home.display(), "config loaded");
    let transport = ReqwestTransport::new(create_client(None)?);

    match cli.command {
        Command::Ask(args) => chat_cmd::run_ask(&config, transport, args).await,
        Command::Chat(args) => chat_cmd::run_chat(&config, transport, args).await,
        Command::History(args) => chat_cmd::run_history(&config, transport, args).await,
        Command::Repos(repos) => match repos.action {
            ReposAction::List => repos_cmd::run_list(&config, transport).await,
            ReposAction::Index { url } => repos_cmd::run_index(&config, transport, &url).await,
            ReposAction::Delete { repo } => repos_cmd::run_delete(&config, transport, &repo).await,
        },
        Command::Login(args) => auth_cmd::run_login(&config, transport, args).await,
        Command::Logout => auth_cmd::run_logout(&config, transport).await,
        Command::Recover(args) => auth_cmd::run_recover(&config, transport, args).await,
    }
}

/// Every backend call is made on behalf of a signed-in user.
fn require_user(config: &Config) -> anyhow::Result<String> {
    match (&config.user_id, &config.access_token) {
        (Some(user_id), Some(_)) => Ok(user_id.clone()),
        _ => anyhow::bail!("{MISSING_SESSION_MESSAGE}"),
    }
}
