//! docchat: streaming chat client for a document-aware assistant.
//!
//! The heart of the crate is [`ChatClient`], an event-driven client for one
//! conversation: it keeps a websocket channel open with bounded exponential
//! backoff, reassembles streamed bot replies and falls back to canned local
//! replies when the backend cannot be reached. Sockets, timers, the REST
//! backend and local storage are injected, so the same client runs against
//! tokio-tungstenite and reqwest in the binary and against doubles in tests.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docchat::{ChatClient, ClientConfig, FileSnapshotStore, HttpChatApi, TokioScheduler, WsConnector};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let client = ChatClient::new(
//!     config.clone(),
//!     Arc::new(HttpChatApi::new(config.api_base_url.clone(), config.api_timeout)?),
//!     Box::new(WsConnector::new(tx.clone())),
//!     Box::new(TokioScheduler::new(tx.clone())),
//!     Box::new(FileSnapshotStore::in_data_dir()),
//! );
//! let (chat, _task) = docchat::session::spawn(client, tx, rx);
//! chat.send_message("Summarize the uploaded report").await;
//! # Ok(())
//! # }
//! ```
pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod fallback;
pub mod protocol;
pub mod reconnect;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;

pub use api::{ChatApi, HttpChatApi};
pub use client::{ChatClient, ChatSnapshot};
pub use config::ClientConfig;
pub use error::{ApiError, Error, Result, StorageError, TransportError};
pub use export::ConversationExport;
pub use reconnect::ReconnectPolicy;
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, TimerTask, TokioScheduler};
pub use session::{ChatHandle, ClientEvent};
pub use storage::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use transport::{ChannelConnection, ChannelEvent, ConnectionId, Connector, WsConnector};
pub use types::{
    ConnectionMode, ConnectionState, ConnectionStatus, ConversationMessage, MessageMetadata, Sender,
};
