use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use docchat::export::suggested_file_name;
use docchat::{
    ChatClient, ChatHandle, ChatSnapshot, ClientConfig, FileSnapshotStore, HttpChatApi, Sender,
    TokioScheduler, WsConnector,
};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Bundled defaults, used when no .env file is present
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

/// Prefer a local .env; otherwise seed the environment from the bundled file.
/// Must run before the tokio runtime is built.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_bundled_config();
    }
}

fn load_bundled_config() {
    let entries = BUNDLED_CONFIG
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()));

    for (key, value) in entries {
        // Variables already present in the environment win.
        if std::env::var_os(key).is_some() {
            continue;
        }
        // SAFETY: `main` calls this before the tokio runtime exists, so the
        // process is still single-threaded and nothing reads the environment
        // concurrently.
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docchat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    load_dotenv();
    init_logging();

    let config = ClientConfig::from_env()?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: ClientConfig) -> Result<()> {
    let (events, inbox) = tokio::sync::mpsc::unbounded_channel();
    let client = ChatClient::new(
        config.clone(),
        Arc::new(HttpChatApi::new(config.api_base_url.clone(), config.api_timeout)?),
        Box::new(WsConnector::new(events.clone())),
        Box::new(TokioScheduler::new(events.clone())),
        Box::new(FileSnapshotStore::in_data_dir()),
    );
    let (chat, session) = docchat::session::spawn(client, events, inbox);

    let printer = tokio::spawn(print_updates(chat.subscribe()));

    println!("Type a message, or /connect /retry /disconnect /clear /export /status /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/connect" => chat.connect(),
            "/retry" => chat.retry(),
            "/disconnect" => chat.disconnect(),
            "/clear" => chat.clear_conversation().await,
            "/status" => print_status(&chat.snapshot()),
            "/export" => export_to_file(&chat).await?,
            text => {
                if !chat.send_message(text).await {
                    println!("(not sent)");
                }
            }
        }
    }

    chat.shutdown();
    session.await.context("chat session panicked")?;
    printer.abort();
    Ok(())
}

async fn export_to_file(chat: &ChatHandle) -> Result<()> {
    let Some(export) = chat.export().await else {
        println!("(session stopped)");
        return Ok(());
    };
    let path = suggested_file_name(OffsetDateTime::now_utc());
    std::fs::write(&path, export.to_json_pretty()?)
        .with_context(|| format!("failed to write {path}"))?;
    println!("Exported {} message(s) to {}", export.messages.len(), path);
    Ok(())
}

fn print_status(snapshot: &ChatSnapshot) {
    let conversation = snapshot
        .state
        .conversation_id
        .as_deref()
        .unwrap_or("none");
    println!("[{}] conversation: {}", snapshot.state.label(), conversation);
}

/// Print each message once it is complete, and every status change.
async fn print_updates(mut snapshots: watch::Receiver<ChatSnapshot>) {
    let mut printed: HashSet<String> = HashSet::new();
    let mut last_label = "";

    loop {
        {
            let snapshot = snapshots.borrow_and_update();
            let label = snapshot.state.label();
            if label != last_label {
                println!("[{label}]");
                last_label = label;
            }
            for msg in &snapshot.messages {
                if msg.is_streaming() || printed.contains(&msg.id) {
                    continue;
                }
                printed.insert(msg.id.clone());
                if msg.sender == Sender::Bot {
                    println!("bot> {}", msg.content);
                }
            }
        }
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}
