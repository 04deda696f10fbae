use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::history::NotificationHistory;
use super::models::{ChannelConfig, DispatchOutcome, NotificationEvent};
use super::senders::{
    telegram::TelegramSender, webhook::WebhookSender, NotificationSender, SenderError,
};
use crate::db::models::{NotificationRecord, Severity};
use crate::db::{JsonStore, StoreError};
use crate::services::http_client::RetryingClient;

pub struct NotificationService {
    store: Arc<JsonStore>,
    history: NotificationHistory,
    telegram: TelegramSender,
    webhook: WebhookSender,
}

impl NotificationService {
    pub fn new(store: Arc<JsonStore>, client: RetryingClient, telegram_api_base: &str) -> Self {
        Self {
            history: NotificationHistory::new(store.clone()),
            store,
            telegram: TelegramSender::with_api_base(client.clone(), telegram_api_base),
            webhook: WebhookSender::new(client),
        }
    }

    /// Records the event in the history, then delivers it to the configured
    /// channel. Delivery problems are reported in the outcome, never raised.
    pub async fn send(&self, event: NotificationEvent) -> DispatchOutcome {
        let settings = self.store.settings();
        let method = settings.notification_method;
        let kind = event.kind();
        let message = event.render(method, Local::now());

        self.record(message.history_line(), kind.severity());

        let config = match ChannelConfig::from_settings(&settings) {
            Ok(config) => config,
            Err(e) => {
                warn!(kind = ?kind, error = %e, "Notification channel is not configured.");
                return DispatchOutcome::failed(e.to_string());
            }
        };

        let sender: &dyn NotificationSender = match config {
            ChannelConfig::Telegram { .. } => &self.telegram,
            ChannelConfig::Webhook { .. } => &self.webhook,
        };

        match sender.send(&config, &message).await {
            Ok(()) => {
                info!(kind = ?kind, channel = method.display_name(), "Notification delivered.");
                DispatchOutcome::delivered(format!("{}通知发送成功", method.message_prefix()))
            }
            Err(e) => {
                error!(kind = ?kind, channel = method.display_name(), error = %e, "Failed to deliver notification.");
                DispatchOutcome::failed(failure_message(method.message_prefix(), &e))
            }
        }
    }

    /// Appends a record without delivering anything.
    pub fn record(&self, message: impl Into<String>, severity: Severity) {
        if let Err(e) = self.history.append(NotificationRecord::new(message, severity)) {
            error!(error = %e, "Failed to append notification record.");
        }
    }

    pub fn history(&self) -> Vec<NotificationRecord> {
        self.history.list()
    }

    pub fn clear_history(&self) -> Result<(), StoreError> {
        self.history.clear()
    }
}

fn failure_message(prefix: &str, error: &SenderError) -> String {
    format!("{prefix}通知发送失败: {error}")
}
