//! Notifier, spec.md §4.7: delivers an alert to a notification channel.
//! Delivery failures are logged and swallowed — a bad webhook must never
//! take down a sensor worker.

use crate::models::NotificationChannel;
use m360_common::NotificationChannelKind;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub struct Notifier {
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
}

#[derive(Deserialize)]
struct TelegramConfig {
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client builds");
        Self { http }
    }

    /// Looks up and dispatches to `channel`, refusing silently if its tenant
    /// differs from `sensor_owner_id`, per spec.md §4.7.
    pub async fn notify(&self, channel: &NotificationChannel, sensor_owner_id: &str, message: &str) {
        if channel.owner_id != sensor_owner_id {
            warn!(
                channel_id = channel.id,
                channel_owner = %channel.owner_id,
                sensor_owner = %sensor_owner_id,
                "refusing to notify channel owned by a different tenant"
            );
            return;
        }

        let kind = match channel.kind.as_str() {
            "webhook" => NotificationChannelKind::Webhook,
            "telegram" => NotificationChannelKind::Telegram,
            other => {
                warn!(channel_id = channel.id, kind = other, "unknown notification channel kind");
                return;
            }
        };

        let result = match kind {
            NotificationChannelKind::Webhook => self.send_webhook(channel, message).await,
            NotificationChannelKind::Telegram => self.send_telegram(channel, message).await,
        };

        if let Err(e) = result {
            warn!(channel_id = channel.id, error = %e, "notification delivery failed");
        }
    }

    async fn send_webhook(&self, channel: &NotificationChannel, message: &str) -> anyhow::Result<()> {
        let config: WebhookConfig = serde_json::from_str(&channel.config)?;
        self.http
            .post(&config.url)
            .json(&serde_json::json!({ "content": message }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_telegram(&self, channel: &NotificationChannel, message: &str) -> anyhow::Result<()> {
        let config: TelegramConfig = serde_json::from_str(&channel.config)?;
        let url = format!("https://api.telegram.org/bot{}/sendMessage", config.bot_token);
        self.http
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": config.chat_id,
                "text": escape_html(message),
                "parse_mode": "HTML",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Escapes the three characters Telegram's HTML parse mode requires escaped.
pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_telegram_html_special_characters() {
        assert_eq!(escape_html("A&B<c>"), "A&amp;B&lt;c&gt;");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(escape_html("sensor 12 timed out"), "sensor 12 timed out");
    }
}
