//! Telegram Bot API transport: alert delivery and command polling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, Result};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Delivers a rendered alert to the operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// Bot bound to the single operator chat.
pub struct TelegramBot {
    http: Client,
    base_url: String,
    operator_chat: i64,
}

impl TelegramBot {
    pub fn new(http: Client, token: &str, operator_chat: i64) -> Self {
        Self::with_api_url(http, TELEGRAM_API, token, operator_chat)
    }

    pub fn with_api_url(http: Client, api_url: &str, token: &str, operator_chat: i64) -> Self {
        Self {
            http,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            operator_chat,
        }
    }

    pub fn operator_chat(&self) -> i64 {
        self.operator_chat
    }

    /// Sends HTML-formatted `text` to `chat_id`.
    pub async fn send_to(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let resp: ApiResponse<serde_json::Value> = self.call_post("sendMessage", &body).await?;
        if !resp.ok {
            return Err(AppError::Notify(
                resp.description.unwrap_or_else(|| "sendMessage rejected".into()),
            ));
        }
        Ok(())
    }

    /// Long-polls for updates after `offset`. `wait_secs` must stay below the
    /// HTTP client timeout.
    pub async fn get_updates(&self, offset: i64, wait_secs: u64) -> Result<Vec<Update>> {
        let url = format!("{}/getUpdates", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", wait_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Notify(e.without_url().to_string()))?;
        let body: ApiResponse<Vec<Update>> = resp
            .json()
            .await
            .map_err(|e| AppError::Notify(e.without_url().to_string()))?;
        if !body.ok {
            return Err(AppError::Notify(
                body.description.unwrap_or_else(|| "getUpdates rejected".into()),
            ));
        }
        let updates = body.result.unwrap_or_default();
        debug!(count = updates.len(), "[CONTROL] updates polled");
        Ok(updates)
    }

    async fn call_post<B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<ApiResponse<serde_json::Value>> {
        let url = format!("{}/{method}", self.base_url);
        // the bot token is part of the URL; never surface it in errors
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Notify(e.without_url().to_string()))?;
        let status = resp.status();
        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| AppError::Notify(format!("HTTP {status}: {}", e.without_url())))?;
        Ok(parsed)
    }
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn send(&self, text: &str) -> Result<()> {
        self.send_to(self.operator_chat, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_update_batch() {
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"text":"/status"}},
            {"update_id":11,"edited_message":{"chat":{"id":42}}}
        ]}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(raw).expect("json");
        let updates = resp.result.expect("result");
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().expect("message");
        assert_eq!(msg.chat.id, 42);
        assert_eq!(msg.text.as_deref(), Some("/status"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn rejected_call_keeps_description() {
        let raw = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        let resp: ApiResponse<serde_json::Value> = serde_json::from_str(raw).expect("json");
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("Bad Request: chat not found"));
    }

    #[test]
    fn token_lives_in_base_url() {
        let bot = TelegramBot::with_api_url(Client::new(), "http://localhost:1/", "123:abc", 7);
        assert_eq!(bot.base_url, "http://localhost:1/bot123:abc");
        assert_eq!(bot.operator_chat(), 7);
    }
}
