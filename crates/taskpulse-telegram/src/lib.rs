//! Telegram Bot API notifier for message and document sending.
//!
//! Send operations return `Ok(false)` when the Bot API reports a failure
//! (bad chat id, blocked bot, malformed markup); errors are reserved for
//! transport-level faults. Callers treat a `false` as "notification lost,
//! logged" rather than a reason to abort event processing.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Inline keyboard markup for a message.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn new(rows: Vec<Vec<InlineKeyboardButton>>) -> Self {
        Self {
            inline_keyboard: rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    pub fn url(text: &str, url: &str) -> Self {
        Self {
            text: text.to_owned(),
            url: Some(url.to_owned()),
            callback_data: None,
        }
    }

    pub fn callback(text: &str, data: &str) -> Self {
        Self {
            text: text.to_owned(),
            url: None,
            callback_data: Some(data.to_owned()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API client for outbound notifications.
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str) -> Result<Self> {
        Self::with_base_url(bot_token, "https://api.telegram.org")
    }

    /// Build a notifier against a non-default API host. Used by tests.
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    /// Send an HTML-formatted text message to a chat.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<bool> {
        if text.is_empty() {
            tracing::warn!("attempted to send empty message to chat {chat_id}");
            return Ok(false);
        }

        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = serde_json::to_value(keyboard).unwrap_or(Value::Null);
        }

        self.call("sendMessage", chat_id, &payload).await
    }

    /// Send a document by URL (or an already-uploaded file id).
    pub async fn send_document(
        &self,
        chat_id: &str,
        file_url: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<bool> {
        if file_url.is_empty() {
            tracing::warn!("attempted to send empty file_url to chat {chat_id}");
            return Ok(false);
        }

        let mut payload = json!({
            "chat_id": chat_id,
            "document": file_url,
            "parse_mode": "HTML",
        });
        if let Some(caption) = caption {
            payload["caption"] = json!(caption);
        }
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = serde_json::to_value(keyboard).unwrap_or(Value::Null);
        }

        self.call("sendDocument", chat_id, &payload).await
    }

    async fn call(&self, method: &str, chat_id: &str, payload: &Value) -> Result<bool> {
        let response: ApiResponse = self
            .http
            .post(self.api_url(method))
            .json(payload)
            .send()
            .await?
            .json()
            .await?;

        if response.ok {
            tracing::debug!("{method} delivered to chat {chat_id}");
            Ok(true)
        } else {
            tracing::error!(
                "Telegram API error for chat {chat_id}: {}",
                response.description.as_deref().unwrap_or("unknown error")
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_serializes_to_bot_api_shape() {
        let keyboard = InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::url("Open", "https://app.clickup.com/t/T1")],
            vec![InlineKeyboardButton::callback("Done", "done=T1")],
        ]);
        let value = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "inline_keyboard": [
                    [{"text": "Open", "url": "https://app.clickup.com/t/T1"}],
                    [{"text": "Done", "callback_data": "done=T1"}]
                ]
            })
        );
    }

    #[tokio::test]
    async fn empty_message_is_not_sent() {
        let notifier = TelegramNotifier::new("123:abc").unwrap();
        let sent = notifier.send_message("1", "", None).await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn empty_document_url_is_not_sent() {
        let notifier = TelegramNotifier::new("123:abc").unwrap();
        let sent = notifier.send_document("1", "", None, None).await.unwrap();
        assert!(!sent);
    }
}
