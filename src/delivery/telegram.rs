use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::delivery::sender::{classify_failure, ChatSender, SendError};
use crate::error::Result;

/// Telegram Bot API sender (`sendMessage` / `sendPhoto`, HTML parse mode).
pub struct TelegramSender {
    client: reqwest::Client,
    /// `{api_url}/bot{token}`; never logged.
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl TelegramSender {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> std::result::Result<(), SendError> {
        let url = format!("{}/{}", self.base_url, method);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::Transient {
                // The URL carries the bot token.
                detail: e.without_url().to_string(),
                retry_after: None,
            })?;

        let status = resp.status();
        match resp.json::<ApiResponse>().await {
            Ok(r) if r.ok => Ok(()),
            Ok(r) => Err(classify_failure(
                r.error_code.unwrap_or(status.as_u16()),
                r.description.as_deref().unwrap_or_default(),
                r.parameters.and_then(|p| p.retry_after),
            )),
            Err(_) if status.is_success() => Ok(()),
            Err(_) => Err(classify_failure(status.as_u16(), "", None)),
        }
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send_text(&self, recipient_id: i64, text: &str) -> std::result::Result<(), SendError> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": recipient_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await
    }

    async fn send_photo(
        &self,
        recipient_id: i64,
        image: &str,
        caption: &str,
    ) -> std::result::Result<(), SendError> {
        self.call(
            "sendPhoto",
            json!({
                "chat_id": recipient_id,
                "photo": image,
                "caption": caption,
                "parse_mode": "HTML",
            }),
        )
        .await
    }
}
