use async_trait::async_trait;
use thiserror::Error;

use super::models::{ChannelConfig, RenderedMessage};
use crate::services::http_client::HttpError;

pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("{0}")]
    NotConfigured(String),
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    Http(#[from] HttpError),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// A trait for sending notifications to a specific channel type.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Delivers a rendered message.
    ///
    /// # Arguments
    ///
    /// * `config` - The resolved configuration of the active channel.
    /// * `message` - Title, details and illustration to send.
    async fn send(&self, config: &ChannelConfig, message: &RenderedMessage) -> Result<(), SenderError>;
}
