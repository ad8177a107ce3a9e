use std::io::Write;

use repochat_client::ReqwestTransport;
use repochat_core::Config;
use repochat_core::config::IDENTITY_KEY_ENV;
use repochat_core::config::IDENTITY_URL_ENV;
use repochat_core::config::persist_credentials;
use repochat_login::AuthEventBus;
use repochat_login::AuthEventKind;
use repochat_login::AwaitOutcome;
use repochat_login::IdentityClient;
use repochat_login::IdentityError;
use repochat_login::RecoveryLink;
use repochat_login::SessionAwaiter;
use repochat_login::SessionStore;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::io::Stdin;
use tracing::info;
use tracing::warn;

use crate::cli::LoginArgs;
use crate::cli::RecoverArgs;

type StdinLines = Lines<BufReader<Stdin>>;

pub(crate) async fn run_login(
    config: &Config,
    transport: ReqwestTransport,
    args: LoginArgs,
) -> anyhow::Result<()> {
    let identity = identity_client(config, transport)?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let password = read_line(&mut stdin, "Password: ").await?;

    let session = identity
        .sign_in_with_password(args.email.trim(), &password)
        .await?;
    persist_credentials(
        &config.repochat_home,
        Some(&session.access_token),
        Some(&session.user.id),
    )?;
    let email = session.user.email.as_deref().unwrap_or(args.email.trim());
    eprintln!("Signed in as {email}.");
    Ok(())
}

pub(crate) async fn run_logout(config: &Config, transport: ReqwestTransport) -> anyhow::Result<()> {
    if let (Some(access_token), Some(_)) = (&config.access_token, &config.identity) {
        let identity = identity_client(config, transport)?;
        if let Err(err) = identity.sign_out(access_token).await {
            warn!("remote sign-out failed: {err}");
        }
    }
    persist_credentials(&config.repochat_home, None, None)?;
    eprintln!("Signed out.");
    Ok(())
}

/// Reset the password from a recovery link.
///
/// The token exchange runs alongside the session awaiter, which is what
/// decides whether the link worked: a failed exchange just means no session
/// ever shows up and the awaiter gives up with the expiry message.
pub(crate) async fn run_recover(
    config: &Config,
    transport: ReqwestTransport,
    args: RecoverArgs,
) -> anyhow::Result<()> {
    let identity = identity_client(config, transport)?;
    let Some(link) = RecoveryLink::parse(&args.link) else {
        anyhow::bail!("That is not a password recovery link.");
    };

    let bus = AuthEventBus::new();
    let store = SessionStore::new(bus.clone());
    let awaiter = SessionAwaiter::new(store.clone(), bus, config.session_wait.clone());
    let exchange = async {
        match identity.exchange_recovery(&link).await {
            Ok(session) => store.set(AuthEventKind::PasswordRecovery, session),
            Err(err) => warn!("recovery token exchange failed: {err}"),
        }
    };

    eprintln!("Verifying recovery link...");
    let ((), outcome) = tokio::join!(exchange, awaiter.await_session());
    let session = match outcome {
        AwaitOutcome::Ready(session) => session,
        AwaitOutcome::Failed(message) => anyhow::bail!("{message}"),
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let user = loop {
        let password = read_line(&mut stdin, "New password: ").await?;
        match identity
            .update_password(&session.access_token, &password)
            .await
        {
            Err(err @ IdentityError::WeakPassword { .. }) => eprintln!("{err}"),
            result => break result?,
        }
    };
    info!(user_id = %user.id, "password updated");

    if let Err(err) = identity.sign_out(&session.access_token).await {
        warn!("sign-out after password reset failed: {err}");
    }
    store.clear();
    eprintln!("Password updated. Sign in again with `repochat login`.");
    Ok(())
}

fn identity_client(
    config: &Config,
    transport: ReqwestTransport,
) -> anyhow::Result<IdentityClient<ReqwestTransport>> {
    let Some(identity) = &config.identity else {
        anyhow::bail!(
            "identity service is not configured; set {IDENTITY_URL_ENV} and {IDENTITY_KEY_ENV} or add an [identity] table to config.toml"
        );
    };
    Ok(IdentityClient::new(
        transport,
        identity.url.clone(),
        identity.anon_key.clone(),
    ))
}

async fn read_line(stdin: &mut StdinLines, prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    match stdin.next_line().await? {
        Some(line) => Ok(line.trim_end_matches('\r').to_string()),
        None => anyhow::bail!("no input"),
    }
}
