use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ChatApi;
use crate::error::ApiError;

/// REST client for the chat service (`/chat/...` endpoints).
pub struct HttpChatApi {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct CreatedChat {
    chat_id: String,
}

#[derive(Serialize)]
struct CreateChatRequest<'a> {
    user_id: u64,
    title: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    chat_id: &'a str,
    message: &'a str,
    is_bot: bool,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl HttpChatApi {
    /// Every request, connect included, gives up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<ApiResponse<T>>(&body)
            .map_err(|err| ApiError::Rejected(format!("unexpected response body: {err}")))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn create_conversation(
        &self,
        owner_id: u64,
        title: &str,
        document_id: Option<&str>,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url("/chat/"))
            .json(&CreateChatRequest {
                user_id: owner_id,
                title,
                status: "active",
                document_id,
            })
            .send()
            .await?;

        let envelope = Self::read_envelope::<CreatedChat>(response).await?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.message));
        }
        envelope
            .data
            .map(|data| data.chat_id)
            .ok_or(ApiError::MissingData("chat_id"))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/chat/{conversation_id}")))
            .send()
            .await?;

        let envelope = Self::read_envelope::<serde_json::Value>(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(envelope.message))
        }
    }

    async fn record_message(
        &self,
        conversation_id: &str,
        text: &str,
        is_bot: bool,
        kind: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/chat/{conversation_id}/messages")))
            .json(&CreateMessageRequest {
                chat_id: conversation_id,
                message: text,
                is_bot,
                kind,
            })
            .send()
            .await?;

        let envelope = Self::read_envelope::<serde_json::Value>(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(envelope.message))
        }
    }
}
