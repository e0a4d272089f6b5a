use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::error::Result;
use crate::types::{ConversationMessage, iso_timestamp};

/// Serializable snapshot of a conversation, without the seeded greeting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExport {
    pub export_date: String,
    pub chat_id: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

impl ConversationExport {
    pub fn new(
        chat_id: Option<String>,
        messages: &[ConversationMessage],
        at: OffsetDateTime,
    ) -> Self {
        Self {
            export_date: iso_timestamp(at),
            chat_id,
            messages: messages
                .iter()
                .filter(|msg| !msg.is_greeting())
                .cloned()
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// File name a caller can use when saving an export, e.g.
/// `chat-export-2025-03-01.json`.
pub fn suggested_file_name(at: OffsetDateTime) -> String {
    let date = at
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("chat-export-{date}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_export_drops_greeting() {
        let at = datetime!(2025-03-01 12:00 UTC);
        let messages = vec![
            ConversationMessage::greeting(false, at),
            ConversationMessage::user("u1", "hello", at),
        ];
        let export = ConversationExport::new(Some("c1".into()), &messages, at);
        assert_eq!(export.messages.len(), 1);
        assert_eq!(export.messages[0].id, "u1");

        let json = export.to_json_pretty().unwrap();
        assert!(json.contains("\"exportDate\""));
        assert!(json.contains("\"chatId\": \"c1\""));
        assert_eq!(ConversationExport::from_json(&json).unwrap(), export);
    }

    #[test]
    fn test_suggested_file_name() {
        let at = datetime!(2025-03-01 23:59 UTC);
        assert_eq!(suggested_file_name(at), "chat-export-2025-03-01.json");
    }
}
