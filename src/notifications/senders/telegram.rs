use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{NotificationSender, SenderError};
use crate::notifications::models::{ChannelConfig, RenderedMessage};
use crate::services::http_client::RetryingClient;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(15);

/// A sender for pushing photo notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: RetryingClient,
    api_base: String,
}

impl TelegramSender {
    pub fn with_api_base(client: RetryingClient, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Escapes text for Telegram's HTML parse mode.
    /// Characters to escape: & < >
    fn escape_html(text: &str) -> String {
        let mut escaped_text = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped_text.push_str("&amp;"),
                '<' => escaped_text.push_str("&lt;"),
                '>' => escaped_text.push_str("&gt;"),
                _ => escaped_text.push(c),
            }
        }
        escaped_text
    }

    fn caption(message: &RenderedMessage) -> String {
        format!(
            "<b>{}</b>\n\n{}",
            Self::escape_html(&message.title),
            Self::escape_html(&message.details)
        )
    }
}

#[derive(Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, config: &ChannelConfig, message: &RenderedMessage) -> Result<(), SenderError> {
        let (bot_token, chat_id) = match config {
            ChannelConfig::Telegram { bot_token, chat_id } => (bot_token, chat_id),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Telegram config, but found a different type.".to_string(),
                ));
            }
        };

        let api_url = format!("{}/bot{bot_token}/sendPhoto", self.api_base);
        let caption = Self::caption(message);
        let payload = SendPhotoRequest {
            chat_id,
            photo: &message.picture_url,
            caption: &caption,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .send(|c| c.post(&api_url).json(&payload).timeout(TELEGRAM_TIMEOUT))
            .await?;
        let status = response.status();
        let body = response.text().await?;

        // Telegram answers errors with a JSON body too; prefer its description.
        match serde_json::from_str::<TelegramResponse>(&body) {
            Ok(TelegramResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Ok(TelegramResponse { description, .. }) => Err(SenderError::SendFailed(format!(
                "Telegram API returned an error ({status}): {}",
                description.unwrap_or_else(|| "no description".to_string())
            ))),
            Err(_) => Err(SenderError::SendFailed(format!(
                "Telegram API returned non-JSON response: {status}. Body: {body}"
            ))),
        }
    }
}
