use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

/// Destination for alert and cycle-summary messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Posts MarkdownV2 messages through the Telegram Bot API.
pub struct TelegramSink {
    http: Client,
    api_url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(bot_token: &str, chat_id: &str, timeout: std::time::Duration) -> Result<Self> {
        Self::with_base_url("https://api.telegram.org", bot_token, chat_id, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        bot_token: &str,
        chat_id: &str,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(TelegramSink {
            http,
            api_url: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.to_string(),
        })
    }

    fn payload(&self, text: &str) -> Value {
        json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "MarkdownV2",
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.api_url)
            .json(&self.payload(text))
            .send()
            .await
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram error {}: {}", status, body);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Writes messages to the log. Used when no chat transport is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, text: &str) -> Result<()> {
        info!("📣 {}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_telegram_payload() {
        let sink = TelegramSink::with_base_url(
            "https://telegram.test/",
            "123:abc",
            "-10042",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(sink.api_url, "https://telegram.test/bot123:abc/sendMessage");
        let p = sink.payload("🔥 *Goal Signal*");
        assert_eq!(p["chat_id"], "-10042");
        assert_eq!(p["parse_mode"], "MarkdownV2");
        assert_eq!(p["text"], "🔥 *Goal Signal*");
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        assert!(LogSink.send("hello").await.is_ok());
        assert_eq!(LogSink.name(), "log");
    }
}
