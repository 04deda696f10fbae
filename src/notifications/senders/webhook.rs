use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{NotificationSender, SenderError};
use crate::notifications::models::{ChannelConfig, RenderedMessage};
use crate::services::http_client::RetryingClient;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
/// Link opened when the news card is tapped.
const NEWS_CARD_LINK: &str = "https://work.weixin.qq.com";

/// A sender for pushing "news card" messages to a group-chat webhook.
pub struct WebhookSender {
    client: RetryingClient,
}

impl WebhookSender {
    pub fn new(client: RetryingClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct NewsArticle<'a> {
    title: &'a str,
    description: &'a str,
    url: &'a str,
    picurl: &'a str,
}

#[derive(Serialize)]
struct NewsBody<'a> {
    articles: [NewsArticle<'a>; 1],
}

#[derive(Serialize)]
struct NewsMessage<'a> {
    msgtype: &'a str,
    news: NewsBody<'a>,
}

#[derive(Deserialize)]
struct WebhookResponse {
    errcode: Option<i64>,
    errmsg: Option<String>,
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, config: &ChannelConfig, message: &RenderedMessage) -> Result<(), SenderError> {
        let url = match config {
            ChannelConfig::Webhook { url } => url,
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Webhook config, but found a different type.".to_string(),
                ));
            }
        };

        let payload = NewsMessage {
            msgtype: "news",
            news: NewsBody {
                articles: [NewsArticle {
                    title: &message.title,
                    description: &message.details,
                    url: NEWS_CARD_LINK,
                    picurl: &message.picture_url,
                }],
            },
        };

        let response = self
            .client
            .send(|c| c.post(url).json(&payload).timeout(WEBHOOK_TIMEOUT))
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        let result: WebhookResponse = response.json().await?;
        match result.errcode {
            Some(0) => Ok(()),
            code => Err(SenderError::SendFailed(format!(
                "Webhook rejected the message (errcode {}): {}",
                code.map(|c| c.to_string()).unwrap_or_else(|| "missing".to_string()),
                result.errmsg.unwrap_or_default()
            ))),
        }
    }
}
