//! Channel wire format.
//!
//! Frames are JSON objects tagged by an `mt` field. Inbound frames are decoded
//! leniently: every payload field is optional and the frame kind is decided
//! from which fields are present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::MessageMetadata;

pub const MT_BOT_PARTIAL: &str = "chat_message_bot_partial";
pub const MT_UPLOAD_CONFIRM: &str = "message_upload_confirm";
pub const MT_NEW_MESSAGE: &str = "new_message";
pub const MT_UPLOAD: &str = "message_upload";

/// Close code for a deliberate, clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the transport went away without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    mt: Option<String>,
    start: Option<String>,
    partial: Option<String>,
    uuid: Option<String>,
    stop: Option<String>,
    token: Option<String>,
    message_id: Option<String>,
    message: Option<String>,
    content: Option<String>,
    response: Option<String>,
    sender: Option<String>,
    is_bot: Option<bool>,
    timestamp: Option<String>,
    metadata: Option<MessageMetadata>,
    #[serde(rename = "message_context")]
    message_context: Option<Value>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    StreamStart {
        token: String,
        timestamp: Option<String>,
        message_context: Option<Value>,
    },
    StreamPartial {
        token: String,
        text: String,
    },
    StreamStop {
        token: String,
    },
    /// A whole bot message delivered in one frame.
    Complete {
        id: Option<String>,
        text: String,
        timestamp: Option<String>,
        metadata: Option<MessageMetadata>,
    },
    /// The server echoing the user's own message back.
    UserEcho,
    /// Any other frame carrying text in `content`, `message` or `response`.
    Unrecognized {
        text: String,
        timestamp: Option<String>,
        metadata: Option<MessageMetadata>,
    },
    /// Valid JSON that carries nothing the client acts on.
    Ignored,
}

pub fn decode_frame(raw: &str) -> Result<InboundFrame, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    let frame: RawFrame = serde_json::from_value(value)?;
    Ok(frame.classify())
}

impl RawFrame {
    fn is_user_echo(&self) -> bool {
        self.is_bot == Some(false) || self.sender.as_deref() == Some("user")
    }

    fn classify(self) -> InboundFrame {
        if self.is_user_echo() {
            return InboundFrame::UserEcho;
        }

        match self.mt.as_deref() {
            Some(MT_BOT_PARTIAL) => {
                if let Some(token) = non_empty(self.start) {
                    InboundFrame::StreamStart {
                        token,
                        timestamp: self.timestamp,
                        message_context: self.message_context,
                    }
                } else if let (Some(text), Some(token)) = (non_empty(self.partial), self.uuid) {
                    InboundFrame::StreamPartial { token, text }
                } else if let Some(token) = non_empty(self.stop) {
                    InboundFrame::StreamStop { token }
                } else {
                    InboundFrame::Ignored
                }
            }
            Some(MT_UPLOAD_CONFIRM) => {
                let mut metadata = self.metadata.unwrap_or_default();
                if self.message_context.is_some() {
                    metadata.message_context = self.message_context;
                }
                if self.token.is_some() {
                    metadata.token = self.token.clone();
                }
                InboundFrame::Complete {
                    id: self.token,
                    text: self.message.unwrap_or_default(),
                    timestamp: self.timestamp,
                    metadata: Some(metadata),
                }
            }
            Some(MT_NEW_MESSAGE) => InboundFrame::Complete {
                id: self.message_id,
                text: self.message.unwrap_or_default(),
                timestamp: self.timestamp,
                metadata: self.metadata,
            },
            _ => match non_empty(self.content)
                .or(non_empty(self.message))
                .or(non_empty(self.response))
            {
                Some(text) => InboundFrame::Unrecognized {
                    text,
                    timestamp: self.timestamp,
                    metadata: self.metadata,
                },
                None => InboundFrame::Ignored,
            },
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Frame sent when the user submits a message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage<'a> {
    pub mt: &'static str,
    pub message: &'a str,
    pub content: &'a str,
    pub timestamp: &'a str,
    pub user_id: String,
    pub timezone: &'static str,
    pub selected_language: &'static str,
    pub document_id: Option<&'a str>,
}

impl<'a> OutboundMessage<'a> {
    pub fn new(
        text: &'a str,
        timestamp: &'a str,
        owner_id: u64,
        document_id: Option<&'a str>,
    ) -> Self {
        Self {
            mt: MT_UPLOAD,
            message: text,
            content: text,
            timestamp,
            user_id: owner_id.to_string(),
            timezone: "UTC",
            selected_language: "en",
            document_id,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
