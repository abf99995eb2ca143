//! parley - terminal chat client for the parley assistant

mod commands;
mod config;
mod utils;

use clap::Parser;
use parley_api::{ApiClient, StaticToken};
use parley_session::{
    ChatSession, Message, PageOutcome, SendOutcome, SessionContext, SessionEvent,
    SessionHandle,
};
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use commands::CommandResult;

/// parley - chat with the assistant from your terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (default: config file, then PARLEY_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token (default: config file, then PARLEY_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Messages fetched per history page
    #[arg(long)]
    page_size: Option<u32>,

    /// Send a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// List saved conversations and exit
    #[arg(long)]
    conversations: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("parley=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    let Some(base_url) = cfg.base_url(args.base_url) else {
        eprintln!("Error: No backend URL configured");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  1. Pass it directly: parley --base-url https://host/api");
        eprintln!("  2. Set it in the environment: export PARLEY_BASE_URL=https://host/api");
        eprintln!("  3. Add it to config: parley --init-config");
        std::process::exit(1);
    };

    let token = cfg.token(args.token);
    if token.is_none() {
        eprintln!(
            "Warning: no token configured (set PARLEY_TOKEN or use --token); requests will be refused"
        );
    }

    let client = ApiClient::new(base_url, Arc::new(StaticToken::new(token)))?;
    let session_config = cfg.session_config(args.timeout, args.page_size);
    let timeout = session_config.request_timeout;
    let mut session = ChatSession::new(SessionContext::from_client(client.clone(), session_config));

    if args.conversations {
        return list_conversations(&mut session).await;
    }

    // Non-interactive mode
    if let Some(command) = args.command {
        return run_command(&mut session, &command).await;
    }

    run_interactive(&mut session, &client, timeout).await
}

/// Drive `request` to completion, aborting the session's in-flight call on Ctrl-C.
///
/// The request still completes (as cancelled) so the session can apply it.
async fn abortable<F: Future>(handle: &SessionHandle, request: F) -> F::Output {
    interruptible(handle, request, tokio::signal::ctrl_c).await
}

async fn interruptible<F, I, S>(handle: &SessionHandle, request: F, mut interrupt: I) -> F::Output
where
    F: Future,
    I: FnMut() -> S,
    S: Future,
{
    tokio::pin!(request);
    loop {
        tokio::select! {
            output = &mut request => return output,
            _ = interrupt() => {
                eprintln!("\n[Aborting request...]");
                handle.abort();
            }
        }
    }
}

/// What the prompt produced
#[derive(Debug, PartialEq, Eq)]
enum Prompt {
    Line(String),
    Interrupted,
    Closed,
}

/// Read stdin on its own thread so the prompt can race Ctrl-C.
fn spawn_line_reader() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn next_prompt<S: Future>(
    lines: &mut mpsc::Receiver<io::Result<String>>,
    interrupt: S,
) -> io::Result<Prompt> {
    tokio::select! {
        line = lines.recv() => match line {
            Some(line) => line.map(Prompt::Line),
            None => Ok(Prompt::Closed),
        },
        _ = interrupt => Ok(Prompt::Interrupted),
    }
}

/// Send `text`, print the new assistant messages, and save a new conversation
/// after its first exchange.
async fn send(session: &mut ChatSession, text: &str) -> bool {
    let handle = session.handle();
    let Ok(pending) = session.begin_send(text) else {
        return false;
    };

    let reply = abortable(&handle, pending.run()).await;
    match session.complete_send(reply) {
        SendOutcome::Delivered { added, needs_save } => {
            let messages = session.messages();
            print_messages(&messages[messages.len() - added..]);
            if needs_save {
                if let Some(save) = session.begin_save() {
                    let reply = abortable(&handle, save.run()).await;
                    session.complete_save(reply);
                }
            }
            true
        }
        SendOutcome::Failed(_) | SendOutcome::Discarded => false,
    }
}

async fn run_command(session: &mut ChatSession, command: &str) -> anyhow::Result<()> {
    println!("parley> {}", command);
    println!();

    let printer = spawn_event_printer(session);
    let sent = send(session, command).await;

    // Wait a bit for final events
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();

    match session.last_error() {
        Some(e) if !sent => Err(e.clone().into()),
        _ => Ok(()),
    }
}

async fn run_interactive(
    session: &mut ChatSession,
    client: &ApiClient,
    timeout: Duration,
) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("parley ({})  /help for commands", client.base_url());
        eprintln!();
    }

    let printer = spawn_event_printer(session);
    let handle = session.handle();
    let mut lines = spawn_line_reader();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let input = match next_prompt(&mut lines, tokio::signal::ctrl_c()).await? {
            Prompt::Line(input) => input,
            Prompt::Interrupted => {
                println!();
                break;
            }
            // EOF
            Prompt::Closed => break,
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, session, client.base_url()) {
            match result {
                CommandResult::Exit => break,
                CommandResult::Message(msg) => println!("{}", msg),
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
                CommandResult::NewConversation => {
                    session.start_new_conversation();
                    println!("Started a new conversation.");
                }
                CommandResult::ListHistory => {
                    if abortable(&handle, session.refresh_conversations()).await.is_ok() {
                        println!(
                            "{}",
                            commands::HistoryCommand::list_text(
                                session.conversations(),
                                session.selected_conversation_id()
                            )
                        );
                    }
                }
                CommandResult::Open(index) => {
                    let summary = session.conversations()[index].clone();
                    println!("Opening \"{}\"...", summary.title);
                    open_conversation(session, &summary, false).await;
                }
                CommandResult::LoadMore => match session.selected_summary() {
                    Some(summary) => open_conversation(session, &summary, true).await,
                    None => println!("No saved conversation is open."),
                },
                CommandResult::Delete(index) => {
                    let summary = session.conversations()[index].clone();
                    if abortable(&handle, session.delete_conversation(&summary.id))
                        .await
                        .is_ok()
                    {
                        println!("Deleted \"{}\".", summary.title);
                    }
                }
                CommandResult::Save => {
                    let saved = abortable(&handle, session.persist_conversation()).await;
                    match saved {
                        Ok(Some(summary)) => println!("Saved as \"{}\".", summary.title),
                        Ok(None) if session.selected_conversation_id().is_some() => {
                            println!("Conversation is already saved.")
                        }
                        Ok(None) => println!("Nothing to save yet."),
                        Err(_) => {}
                    }
                }
                CommandResult::Transcribe { path, language } => {
                    let text = transcribe(client, &path, language.as_deref(), timeout).await;
                    if let Some(text) = text {
                        println!("you (voice)> {}", text);
                        send(session, &text).await;
                    }
                }
            }
            println!();
            continue;
        }

        println!();
        send(session, input).await;
        println!();
    }

    printer.abort();
    Ok(())
}

/// Load a conversation (or its previous page) and print what arrived
async fn open_conversation(
    session: &mut ChatSession,
    summary: &parley_api::ConversationSummary,
    load_more: bool,
) {
    let handle = session.handle();
    let pending = match session.begin_select(summary, load_more) {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            if load_more {
                println!("No older messages.");
            } else {
                print_messages(session.messages());
            }
            return;
        }
        Err(_) => return,
    };

    let reply = abortable(&handle, pending.run()).await;
    if let PageOutcome::Loaded { count, .. } = session.complete_page(reply) {
        if load_more {
            println!("[{} older message(s)]", count);
            print_messages(&session.messages()[..count]);
        } else {
            print_messages(session.messages());
        }
        if session.cursor().has_more {
            println!("[Older messages available: /more]");
        }
    }
}

/// Upload an audio file for transcription. Errors are printed, not returned.
async fn transcribe(
    client: &ApiClient,
    path: &str,
    language: Option<&str>,
    timeout: Duration,
) -> Option<String> {
    let audio = match tokio::fs::read(path).await {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", path, e);
            return None;
        }
    };
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording.webm".to_string());

    println!("[Transcribing {}...]", file_name);
    let request = tokio::time::timeout(timeout, client.transcribe(audio, &file_name, language));
    let outcome = tokio::select! {
        outcome = request => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n[Transcription aborted]");
            return None;
        }
    };

    match outcome {
        Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
        Ok(Ok(_)) => {
            println!("No speech recognized.");
            None
        }
        Ok(Err(e)) => {
            eprintln!("Error: transcription failed: {}", e);
            None
        }
        Err(_) => {
            eprintln!("Error: transcription timed out after {:?}", timeout);
            None
        }
    }
}

async fn list_conversations(session: &mut ChatSession) -> anyhow::Result<()> {
    let handle = session.handle();
    match abortable(&handle, session.refresh_conversations()).await {
        Ok(_) => {
            println!(
                "{}",
                commands::HistoryCommand::list_text(session.conversations(), None)
            );
        }
        Err(e) => {
            eprintln!("Error listing conversations: {}", e);
        }
    }
    Ok(())
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        let who = if message.is_user() { "you" } else { "assistant" };
        match message.timestamp.and_then(utils::display_millis) {
            Some(time) => println!("[{}] {}> {}", time, who, message.text),
            None => println!("{}> {}", who, message.text),
        }
    }
}

/// Print errors and bookkeeping events as they happen
fn spawn_event_printer(session: &ChatSession) -> tokio::task::JoinHandle<()> {
    let mut receiver = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                SessionEvent::Error { error } => {
                    eprintln!("Error: {}", error);
                }
                SessionEvent::ConversationSaved { summary } => {
                    println!("[Saved as \"{}\"]", utils::truncate_chars(&summary.title, 60));
                }
                SessionEvent::ThreadChanged {
                    previous: Some(previous),
                    current,
                } => {
                    println!("[Assistant moved from thread {} to {}]", previous, current);
                }
                SessionEvent::ConversationDeleted { id } => {
                    tracing::debug!("Deleted conversation {}", id);
                }
                _ => {}
            }
        }
    })
}
