/// Failures talking to the chat HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat API rejected the call: {0}")]
    Rejected(String),

    #[error("chat API response is missing {0}")]
    MissingData(&'static str),
}

/// Failures opening or writing to the streaming channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid channel url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("channel is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
