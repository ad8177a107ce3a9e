use std::io::Write;

use repochat_api::AuthProvider;
use repochat_api::BackendClient;
use repochat_api::HttpTransport;
use repochat_client::ReqwestTransport;
use repochat_core::APOLOGY_MESSAGE;
use repochat_core::ChatEvent;
use repochat_core::ChatSession;
use repochat_core::Config;
use repochat_core::Role;
use repochat_core::SendOutcome;
use repochat_core::Transcript;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::AskArgs;
use crate::cli::ChatArgs;
use crate::cli::RepoArgs;
use crate::require_user;

pub(crate) async fn run_ask(
    config: &Config,
    transport: ReqwestTransport,
    args: AskArgs,
) -> anyhow::Result<()> {
    let user_id = require_user(config)?;
    let (tx, mut events) = mpsc::unbounded_channel();
    let session = ChatSession::new(transport, config.provider(), config.auth(), user_id, args.repo)
        .with_events(tx);

    match run_turn(&session, &mut events, &args.question).await? {
        SendOutcome::Answered(_) | SendOutcome::Cancelled => Ok(()),
        // Already reported on stderr.
        SendOutcome::RateLimited(_) | SendOutcome::Failed(_) => std::process::exit(1),
    }
}

pub(crate) async fn run_chat(
    config: &Config,
    transport: ReqwestTransport,
    args: ChatArgs,
) -> anyhow::Result<()> {
    let user_id = require_user(config)?;
    let (tx, mut events) = mpsc::unbounded_channel();
    let session = ChatSession::new(transport, config.provider(), config.auth(), user_id, args.repo)
        .with_events(tx);

    if !args.no_history {
        session.load_history().await?;
        print_transcript(&mut std::io::stdout().lock(), &session.transcript())?;
    }
    eprintln!(
        "Chatting about {}. Ctrl-C stops an answer, /exit leaves.",
        session.repo_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/exit" | "/quit" => break,
            _ => {}
        }
        run_turn(&session, &mut events, question).await?;
    }
    Ok(())
}

pub(crate) async fn run_history(
    config: &Config,
    transport: ReqwestTransport,
    args: RepoArgs,
) -> anyhow::Result<()> {
    let user_id = require_user(config)?;
    let backend = BackendClient::new(transport, config.provider(), config.auth());
    let history = backend.chat_history(&user_id, &args.repo).await?;
    if history.is_empty() {
        eprintln!("No conversation stored for {}.", args.repo);
        return Ok(());
    }
    print_transcript(
        &mut std::io::stdout().lock(),
        &Transcript::from_history(history),
    )?;
    Ok(())
}

/// Send one question, rendering the answer as it streams. Ctrl-C cancels the
/// answer rather than the process.
async fn run_turn<T, A>(
    session: &ChatSession<T, A>,
    events: &mut mpsc::UnboundedReceiver<ChatEvent>,
    question: &str,
) -> anyhow::Result<SendOutcome>
where
    T: HttpTransport,
    A: AuthProvider,
{
    let mut renderer = Renderer::new(std::io::stdout(), std::io::stderr());
    let send = session.send(question);
    tokio::pin!(send);
    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome?,
            Some(event) = events.recv() => renderer.render(event)?,
            _ = tokio::signal::ctrl_c() => {
                debug!("Keyboard interrupt");
                session.cancel_in_flight();
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        renderer.render(event)?;
    }
    Ok(outcome)
}

fn print_transcript(out: &mut impl Write, transcript: &Transcript) -> std::io::Result<()> {
    for turn in transcript.turns() {
        let speaker = match turn.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        writeln!(out, "{speaker}: {}\n", turn.content)?;
    }
    Ok(())
}

/// Writes chat events as plain text: the answer to `out`, everything else
/// to `err`.
struct Renderer<O: Write, E: Write> {
    out: O,
    err: E,
    mid_line: bool,
}

impl<O: Write, E: Write> Renderer<O, E> {
    fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            mid_line: false,
        }
    }

    fn render(&mut self, event: ChatEvent) -> std::io::Result<()> {
        match event {
            ChatEvent::UserTurn(_) => {}
            ChatEvent::Fragment(text) => {
                write!(self.out, "{text}")?;
                self.out.flush()?;
                if !text.is_empty() {
                    self.mid_line = !text.ends_with('\n');
                }
            }
            ChatEvent::Completed(_) => self.end_line()?,
            ChatEvent::Notice(message) => {
                self.end_line()?;
                writeln!(self.err, "{message}")?;
            }
            ChatEvent::Failed(message) => {
                self.end_line()?;
                writeln!(self.err, "error: {message}")?;
                writeln!(self.out, "{APOLOGY_MESSAGE}")?;
            }
            ChatEvent::Cancelled => {
                self.end_line()?;
                writeln!(self.err, "(answer cancelled)")?;
            }
        }
        Ok(())
    }

    fn end_line(&mut self) -> std::io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        self.out.flush()
    }
}
