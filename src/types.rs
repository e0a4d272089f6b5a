use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Id of the seeded greeting that opens every conversation.
pub const GREETING_MESSAGE_ID: &str = "1";

const GREETING_WITH_DOCUMENT: &str = "Hello! I'm your AI assistant. I'm ready to help you with your document. You can ask me questions about the content, request summaries, or get insights. What would you like to know?";
const GREETING_GENERAL: &str = "Hello! I'm your AI assistant with document knowledge. Upload documents to get more accurate answers, or ask me anything!";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggest: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Annotations attached to a message by the server or by the client itself.
///
/// Keys the client does not know about are kept in `extra` so they survive a
/// snapshot round-trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_chunks_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_performed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ConversationMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>, at: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sender: Sender::User,
            timestamp: iso_timestamp(at),
            metadata: None,
        }
    }

    pub fn bot(id: impl Into<String>, content: impl Into<String>, timestamp: String) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sender: Sender::Bot,
            timestamp,
            metadata: None,
        }
    }

    pub fn greeting(has_document: bool, at: OffsetDateTime) -> Self {
        let content = if has_document {
            GREETING_WITH_DOCUMENT
        } else {
            GREETING_GENERAL
        };
        Self::bot(GREETING_MESSAGE_ID, content, iso_timestamp(at))
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_greeting(&self) -> bool {
        self.id == GREETING_MESSAGE_ID
    }

    /// True while a stream-start has been seen and no stop yet.
    pub fn is_streaming(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.streaming)
            .unwrap_or(false)
    }

    pub fn created_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.timestamp, &Rfc3339).ok()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Live,
    Simulated,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub mode: ConnectionMode,
    pub conversation_id: Option<String>,
    pub reconnect_attempts: u32,
}

impl ConnectionState {
    pub fn is_simulated(&self) -> bool {
        self.mode == ConnectionMode::Simulated
    }

    /// Short badge text for the status line.
    pub fn label(&self) -> &'static str {
        match self.status {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Error => "Connection Error",
            ConnectionStatus::Disconnected if self.is_simulated() => "Demo Mode",
            ConnectionStatus::Disconnected => "Disconnected",
        }
    }
}

pub fn iso_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
