use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;

use super::senders::SenderError;
use crate::db::models::{AppSettings, NotificationMethod, Severity};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Delivery target resolved from the settings of the active method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelConfig {
    Telegram { bot_token: String, chat_id: String },
    Webhook { url: String },
}

impl ChannelConfig {
    /// Resolves the active channel. Missing credentials are reported with a
    /// message suitable for the UI.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, SenderError> {
        match settings.notification_method {
            NotificationMethod::Telegram => match (settings.tg_bot_token(), settings.tg_chat_id()) {
                (Some(bot_token), Some(chat_id)) => Ok(ChannelConfig::Telegram {
                    bot_token: bot_token.to_string(),
                    chat_id: chat_id.to_string(),
                }),
                _ => Err(SenderError::NotConfigured(
                    "Telegram Bot Token 或 Chat ID 未配置".to_string(),
                )),
            },
            NotificationMethod::Webhook => match settings.webhook_url() {
                Some(url) => Ok(ChannelConfig::Webhook { url: url.to_string() }),
                None => Err(SenderError::NotConfigured("企业微信 Webhook 未配置".to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Start,
    Stop,
    Anomaly,
    Test,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::Start => "▶️ 后台监控已启动",
            NotificationKind::Stop => "⏹️ 后台监控已停止",
            NotificationKind::Anomaly => "⚠️ 后台监控发现异常",
            NotificationKind::Test => "✅ 连接测试",
        }
    }

    /// Illustration attached to the Telegram photo and the news card.
    pub fn picture_url(&self) -> &'static str {
        match self {
            NotificationKind::Start => "https://tc.z.wiki/autoupload/f/VGYUFUfjLTRdneshf7trSU1pPk5D901eM2bYIJnvuwCyl5f0KlZfm6UsKj-HyTuv/20250706/973O/400X320/%E7%B3%BB%E7%BB%9F%E5%90%AF%E5%8A%A81-min.jpg",
            NotificationKind::Stop => "https://tc.z.wiki/autoupload/f/VGYUFUfjLTRdneshf7trSU1pPk5D901eM2bYIJnvuwCyl5f0KlZfm6UsKj-HyTuv/20250706/iwZf/400X320/%E7%B3%BB%E7%BB%9F%E5%81%9C%E6%AD%A21-min.jpg",
            NotificationKind::Anomaly => "https://tc.z.wiki/autoupload/f/VGYUFUfjLTRdneshf7trSU1pPk5D901eM2bYIJnvuwCyl5f0KlZfm6UsKj-HyTuv/20250706/G59r/400X320/%E7%B3%BB%E7%BB%9F%E5%BC%82%E5%B8%B81-min.jpg",
            NotificationKind::Test => "https://tc.z.wiki/autoupload/f/VGYUFUfjLTRdneshf7trSU1pPk5D901eM2bYIJnvuwCyl5f0KlZfm6UsKj-HyTuv/20250706/3XAw/400X320/%E7%B3%BB%E7%BB%9F%E6%B5%8B%E8%AF%951-min.jpg",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            NotificationKind::Anomaly => Severity::Error,
            _ => Severity::Info,
        }
    }
}

/// An event to push to the configured channel.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Start {
        start_time: DateTime<Utc>,
        interval_secs: u64,
    },
    Stop {
        stop_time: DateTime<Utc>,
        duration: Option<Duration>,
    },
    Anomaly {
        details: String,
    },
    Test,
}

impl NotificationEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationEvent::Start { .. } => NotificationKind::Start,
            NotificationEvent::Stop { .. } => NotificationKind::Stop,
            NotificationEvent::Anomaly { .. } => NotificationKind::Anomaly,
            NotificationEvent::Test => NotificationKind::Test,
        }
    }

    /// Renders title, detail text and illustration. `now` is only used by
    /// the test event.
    pub fn render(&self, method: NotificationMethod, now: DateTime<Local>) -> RenderedMessage {
        let details = match self {
            NotificationEvent::Start {
                start_time,
                interval_secs,
            } => format!(
                "启动时间: {}\n监控间隔: {}秒",
                start_time.with_timezone(&Local).format(TIME_FORMAT),
                interval_secs
            ),
            NotificationEvent::Stop {
                stop_time,
                duration,
            } => format!(
                "停止时间: {}\n运行时长: {}",
                stop_time.with_timezone(&Local).format(TIME_FORMAT),
                duration.map(format_duration).unwrap_or_else(|| "未知".to_string())
            ),
            NotificationEvent::Anomaly { details } if details.trim().is_empty() => {
                "未知异常".to_string()
            }
            NotificationEvent::Anomaly { details } => details.clone(),
            NotificationEvent::Test => format!(
                "时间: {}\n方式: {}",
                now.format(TIME_FORMAT),
                method.display_name()
            ),
        };
        let kind = self.kind();
        RenderedMessage {
            title: kind.title().to_string(),
            details,
            picture_url: kind.picture_url().to_string(),
        }
    }
}

/// Formats a run time as `1小时2分3秒`, leaving out leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}小时{minutes}分{seconds}秒")
    } else if minutes > 0 {
        format!("{minutes}分{seconds}秒")
    } else {
        format!("{seconds}秒")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub details: String,
    pub picture_url: String,
}

impl RenderedMessage {
    /// Single-line form stored in the history.
    pub fn history_line(&self) -> String {
        format!("{} - {}", self.title, self.details.replace('\n', " "))
    }
}

/// Result of one dispatch, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub delivered: bool,
    pub message: String,
}

impl DispatchOutcome {
    pub fn delivered(message: impl Into<String>) -> Self {
        Self {
            delivered: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            delivered: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_channel_requires_credentials_of_active_method() {
        let settings = AppSettings {
            notification_method: NotificationMethod::Telegram,
            tg_bot_token: Some("123:abc".to_string()),
            webhook_url: Some("http://hook".to_string()),
            ..Default::default()
        };
        let err = ChannelConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(err, SenderError::NotConfigured(_)));

        let settings = AppSettings {
            notification_method: NotificationMethod::Webhook,
            ..settings
        };
        assert_eq!(
            ChannelConfig::from_settings(&settings).unwrap(),
            ChannelConfig::Webhook { url: "http://hook".to_string() }
        );
    }

    #[test]
    fn test_render_anomaly_and_history_line() {
        let event = NotificationEvent::Anomaly {
            details: "发现1个异常存储:\n - /a 状态: error".to_string(),
        };
        let message = event.render(NotificationMethod::Webhook, Local::now());
        assert_eq!(message.title, "⚠️ 后台监控发现异常");
        assert_eq!(
            message.history_line(),
            "⚠️ 后台监控发现异常 - 发现1个异常存储:  - /a 状态: error"
        );
        assert_eq!(event.kind().severity(), Severity::Error);
    }

    #[test]
    fn test_render_test_event_names_channel() {
        let now = Local.with_ymd_and_hms(2025, 7, 6, 12, 30, 0).unwrap();
        let message = NotificationEvent::Test.render(NotificationMethod::Telegram, now);
        assert_eq!(message.details, "时间: 2025-07-06 12:30:00\n方式: Telegram");
        assert_eq!(NotificationKind::Test.severity(), Severity::Info);
    }

    #[test]
    fn test_render_stop_without_start_time() {
        let event = NotificationEvent::Stop {
            stop_time: Utc::now(),
            duration: None,
        };
        let message = event.render(NotificationMethod::Webhook, Local::now());
        assert!(message.details.ends_with("运行时长: 未知"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(5)), "5秒");
        assert_eq!(format_duration(Duration::seconds(125)), "2分5秒");
        assert_eq!(format_duration(Duration::seconds(3723)), "1小时2分3秒");
        assert_eq!(format_duration(Duration::seconds(-3)), "0秒");
    }
}
