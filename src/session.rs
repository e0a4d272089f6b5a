//! Single-task event loop around a `ChatClient`.
//!
//! Channel tasks, timers and the public `ChatHandle` only push `ClientEvent`s
//! into one queue; the session task applies them to the client one at a time,
//! so client state is never touched concurrently. After each event the latest
//! `ChatSnapshot` is published on a `watch` channel.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::{ChatClient, ChatSnapshot};
use crate::export::ConversationExport;
use crate::scheduler::{TaskHandle, TimerTask};
use crate::transport::{ChannelEvent, ConnectionId};

pub enum ClientEvent {
    Channel {
        connection: ConnectionId,
        event: ChannelEvent,
    },
    Timer {
        handle: TaskHandle,
        task: TimerTask,
    },
    Command(Command),
}

pub enum Command {
    Send {
        text: String,
        accepted: oneshot::Sender<bool>,
    },
    Connect,
    Retry,
    Disconnect,
    Clear {
        done: oneshot::Sender<()>,
    },
    Export {
        reply: oneshot::Sender<ConversationExport>,
    },
    Import(ConversationExport),
    Shutdown,
}

/// Cloneable front end of a running session.
#[derive(Clone)]
pub struct ChatHandle {
    events: mpsc::UnboundedSender<ClientEvent>,
    snapshots: watch::Receiver<ChatSnapshot>,
}

impl ChatHandle {
    fn command(&self, command: Command) -> bool {
        self.events.send(ClientEvent::Command(command)).is_ok()
    }

    /// Submit a message. Resolves to false if it was rejected or the session
    /// has stopped.
    pub async fn send_message(&self, text: impl Into<String>) -> bool {
        let (accepted, rx) = oneshot::channel();
        if !self.command(Command::Send {
            text: text.into(),
            accepted,
        }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    pub fn retry(&self) {
        self.command(Command::Retry);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    pub async fn clear_conversation(&self) {
        let (done, rx) = oneshot::channel();
        if self.command(Command::Clear { done }) {
            let _ = rx.await;
        }
    }

    pub async fn export(&self) -> Option<ConversationExport> {
        let (reply, rx) = oneshot::channel();
        if !self.command(Command::Export { reply }) {
            return None;
        }
        rx.await.ok()
    }

    pub fn import(&self, export: ConversationExport) {
        self.command(Command::Import(export));
    }

    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified whenever the client state changes.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshots.clone()
    }
}

/// Start the session task. `events` must be the queue the client's connector
/// and scheduler were built with.
pub fn spawn(
    mut client: ChatClient,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut inbox: mpsc::UnboundedReceiver<ClientEvent>,
) -> (ChatHandle, JoinHandle<()>) {
    client.start();
    let (snapshot_tx, snapshot_rx) = watch::channel(client.snapshot());

    let join = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let keep_running = apply(&mut client, event).await;
            snapshot_tx.send_if_modified(|current| {
                let next = client.snapshot();
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
            if !keep_running {
                break;
            }
        }
        client.shutdown();
        debug!("Chat session stopped");
    });

    (
        ChatHandle {
            events,
            snapshots: snapshot_rx,
        },
        join,
    )
}

async fn apply(client: &mut ChatClient, event: ClientEvent) -> bool {
    match event {
        ClientEvent::Channel { connection, event } => {
            client.handle_channel_event(connection, event);
        }
        ClientEvent::Timer { handle, task } => client.handle_timer(handle, task).await,
        ClientEvent::Command(command) => match command {
            Command::Send { text, accepted } => {
                let ok = client.send_message(&text).await;
                let _ = accepted.send(ok);
            }
            Command::Connect => client.connect().await,
            Command::Retry => client.retry().await,
            Command::Disconnect => client.disconnect(),
            Command::Clear { done } => {
                client.clear_conversation().await;
                let _ = done.send(());
            }
            Command::Export { reply } => {
                let _ = reply.send(client.export());
            }
            Command::Import(export) => client.import(export),
            Command::Shutdown => return false,
        },
    }
    true
}
