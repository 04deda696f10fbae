use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Key under which the bcrypt hash of the admin password is stored.
pub const PASSWORD_KEY: &str = "password";
/// Bumped on every password change; sessions carry the value they were issued with.
pub const PASSWORD_VERSION_KEY: &str = "password_version";
const AUTH_KEYS: [&str; 2] = [PASSWORD_KEY, PASSWORD_VERSION_KEY];

/// Channel used to push notifications.
/// Older documents use `tg` / `wecom`, both are still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    Telegram,
    #[default]
    Webhook,
}

impl NotificationMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            NotificationMethod::Telegram => "Telegram",
            NotificationMethod::Webhook => "企业微信",
        }
    }

    /// Channel name as it leads an outcome message: `Telegram 通知…`, `企业微信通知…`.
    pub fn message_prefix(&self) -> &'static str {
        match self {
            NotificationMethod::Telegram => "Telegram ",
            NotificationMethod::Webhook => "企业微信",
        }
    }

    fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "telegram" | "tg" => NotificationMethod::Telegram,
            _ => NotificationMethod::Webhook,
        }
    }
}

impl<'de> Deserialize<'de> for NotificationMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(NotificationMethod::parse_lenient)
            .unwrap_or_default())
    }
}

/// Accepts a string, a number or null. Chat ids are often pasted as numbers.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// User-editable application settings, stored in the `config` document.
/// Field names follow the keys the web UI sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(rename = "ALIST_URL", default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(rename = "ALIST_TOKEN", default, skip_serializing_if = "Option::is_none")]
    pub remote_token: Option<String>,
    #[serde(rename = "NOTIFICATION_METHOD", default)]
    pub notification_method: NotificationMethod,
    #[serde(rename = "TG_BOT_TOKEN", default, skip_serializing_if = "Option::is_none")]
    pub tg_bot_token: Option<String>,
    #[serde(
        rename = "TG_CHAT_ID",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub tg_chat_id: Option<String>,
    #[serde(rename = "WECOM_WEBHOOK", default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(rename = "password", default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(rename = "password_version", default)]
    pub password_version: u64,
    // Keys the UI stores that the server does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AppSettings {
    pub fn remote_url(&self) -> Option<&str> {
        non_empty(&self.remote_url)
    }

    pub fn remote_token(&self) -> Option<&str> {
        non_empty(&self.remote_token)
    }

    pub fn tg_bot_token(&self) -> Option<&str> {
        non_empty(&self.tg_bot_token)
    }

    pub fn tg_chat_id(&self) -> Option<&str> {
        non_empty(&self.tg_chat_id)
    }

    pub fn webhook_url(&self) -> Option<&str> {
        non_empty(&self.webhook_url)
    }

    /// Merges a partial update coming from the UI. The password hash and its
    /// version are never touched here; see `auth_service::set_password`.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut current = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            if AUTH_KEYS.contains(&key.as_str()) {
                continue;
            }
            current.insert(key, value);
        }
        *self = serde_json::from_value(Value::Object(current))?;
        Ok(())
    }

    /// JSON view for the UI, without the password hash or its version.
    pub fn to_public_json(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            for key in AUTH_KEYS {
                map.remove(key);
            }
        }
        Ok(value)
    }
}

/// Represents the persisted state of the background monitor.
/// `interval` and `start_time` are set together, only while monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    #[serde(default)]
    pub is_monitoring: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_count: u64,
    #[serde(default)]
    pub interval: Option<u64>, // seconds
}

impl MonitorStatus {
    pub fn running(interval_secs: u64, start_time: DateTime<Utc>) -> Self {
        Self {
            is_monitoring: true,
            start_time: Some(start_time),
            check_count: 0,
            interval: Some(interval_secs),
        }
    }

    pub fn stopped() -> Self {
        Self::default()
    }

    /// The interval to resume with, if this status describes a usable schedule.
    pub fn resumable_interval(&self) -> Option<u64> {
        if !self.is_monitoring {
            return None;
        }
        self.interval.filter(|secs| *secs > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One entry of the notification history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "type")]
    pub severity: Severity,
}

impl NotificationRecord {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            severity,
        }
    }
}
