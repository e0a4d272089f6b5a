use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/api/v1";
const DEFAULT_WS_BASE_URL: &str = "ws://localhost:5000/api/v1";

/// Key the message list snapshot is stored under.
pub const MESSAGES_STORAGE_KEY: &str = "chat-messages";

/// Settings for one `ChatClient` instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub owner_id: u64,
    pub document_id: Option<String>,
    pub auto_connect: bool,
    pub reconnect: ReconnectPolicy,
    /// Delay before the first connect attempt after `start`.
    pub initial_connect_delay: Duration,
    pub duplicate_window: Duration,
    /// How many trailing messages are checked for duplicate submissions.
    pub duplicate_lookback: usize,
    pub simulated_reply_min: Duration,
    pub simulated_reply_max: Duration,
    pub storage_key: String,
    /// Upper bound for each chat API request.
    pub api_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            owner_id: 1,
            document_id: None,
            auto_connect: true,
            reconnect: ReconnectPolicy::default(),
            initial_connect_delay: Duration::from_secs(1),
            duplicate_window: Duration::from_secs(5),
            duplicate_lookback: 5,
            simulated_reply_min: Duration::from_secs(2),
            simulated_reply_max: Duration::from_secs(5),
            storage_key: MESSAGES_STORAGE_KEY.to_string(),
            api_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Build the configuration from `DOCCHAT_*` environment variables,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("DOCCHAT_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("DOCCHAT_WS_BASE_URL") {
            config.ws_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(raw) = env::var("DOCCHAT_USER_ID") {
            config.owner_id = raw
                .trim()
                .parse()
                .with_context(|| format!("DOCCHAT_USER_ID is not a number: {raw}"))?;
        }
        config.document_id = env::var("DOCCHAT_DOCUMENT_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if let Ok(raw) = env::var("DOCCHAT_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = raw.trim().parse().with_context(|| {
                format!("DOCCHAT_MAX_RECONNECT_ATTEMPTS is not a number: {raw}")
            })?;
        }
        if let Ok(raw) = env::var("DOCCHAT_API_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("DOCCHAT_API_TIMEOUT_SECS is not a number: {raw}"))?;
            config.api_timeout = Duration::from_secs(secs);
        }
        config.auto_connect = parse_flag(
            &env::var("DOCCHAT_AUTO_CONNECT").unwrap_or_else(|_| "true".into()),
        );

        Ok(config)
    }

    pub fn has_document(&self) -> bool {
        self.document_id.is_some()
    }

    /// Channel URL for a bound conversation.
    pub fn channel_url(&self, conversation_id: &str) -> String {
        format!("{}/chat/ws/{}", self.ws_base_url, conversation_id)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
