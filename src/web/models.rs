use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::monitoring::probe::{HealthSummary, MountHealth};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Password version the token was issued against.
    pub pwv: u64,
    pub exp: usize,
}

/// Accepts `60` as well as `"60"`.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct MonitorStatusRequest {
    #[serde(default)]
    pub is_monitoring: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub interval: Option<u64>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckStorageRequest {
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StorageView {
    pub name: String,
    pub driver: String,
    pub status: String,
    pub last_updated: DateTime<Utc>,
}

impl From<&MountHealth> for StorageView {
    fn from(mount: &MountHealth) -> Self {
        Self {
            name: mount.name.clone(),
            driver: mount.driver.clone(),
            status: mount.status.clone(),
            last_updated: mount.last_updated,
        }
    }
}

/// Storage status in the shape the dashboard renders.
#[derive(Debug, Serialize)]
pub struct StorageStatusResponse {
    pub success: bool,
    pub message: String,
    pub status: &'static str,
    pub last_checked: DateTime<Utc>,
    pub storages: Vec<StorageView>,
}

impl From<&HealthSummary> for StorageStatusResponse {
    fn from(summary: &HealthSummary) -> Self {
        Self {
            success: summary.success,
            message: summary.message.clone(),
            status: summary.overall_status.label(),
            last_checked: summary.checked_at,
            storages: summary.mounts.iter().map(StorageView::from).collect(),
        }
    }
}
