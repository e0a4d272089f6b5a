//! Chat backend collaborators.
//!
//! The client only needs three calls from the backend: creating and deleting a
//! conversation and recording a message. `HttpChatApi` talks to the REST
//! service; tests substitute their own `ChatApi`.

mod http;

pub use http::HttpChatApi;

use async_trait::async_trait;

use crate::error::ApiError;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Create a conversation and return its id.
    async fn create_conversation(
        &self,
        owner_id: u64,
        title: &str,
        document_id: Option<&str>,
    ) -> Result<String, ApiError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;

    async fn record_message(
        &self,
        conversation_id: &str,
        text: &str,
        is_bot: bool,
        kind: &str,
    ) -> Result<(), ApiError>;
}
