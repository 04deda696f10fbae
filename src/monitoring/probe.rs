//! Health probe against the remote storage-listing API.
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::db::models::AppSettings;
use crate::services::http_client::{HttpError, RetryingClient};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const STORAGE_LIST_PATH: &str = "/api/admin/storage/list";
/// Mount statuses that do not count as a problem.
const HEALTHY_STATUSES: [&str; 2] = ["work", "disabled"];
/// Business code of a successful listing. Alist answers HTTP 200 for most errors.
const CODE_OK: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Normal,
    Abnormal,
}

impl OverallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OverallStatus::Normal => "正常",
            OverallStatus::Abnormal => "异常",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHealth {
    pub name: String,
    pub driver: String,
    pub status: String,
    pub last_updated: DateTime<Utc>,
}

impl MountHealth {
    pub fn is_healthy(&self) -> bool {
        HEALTHY_STATUSES.contains(&self.status.as_str())
    }
}

/// Result of one probe. Never persisted on its own.
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub success: bool,
    pub message: String,
    pub overall_status: OverallStatus,
    pub checked_at: DateTime<Utc>,
    pub mounts: Vec<MountHealth>,
}

impl HealthSummary {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            overall_status: OverallStatus::Abnormal,
            checked_at: Utc::now(),
            mounts: Vec::new(),
        }
    }

    pub fn from_mounts(mounts: Vec<MountHealth>, checked_at: DateTime<Utc>) -> Self {
        let overall_status = if mounts.iter().all(MountHealth::is_healthy) {
            OverallStatus::Normal
        } else {
            OverallStatus::Abnormal
        };
        Self {
            success: true,
            message: "获取存储状态成功".to_string(),
            overall_status,
            checked_at,
            mounts,
        }
    }

    pub fn abnormal_mounts(&self) -> impl Iterator<Item = &MountHealth> {
        self.mounts.iter().filter(|m| !m.is_healthy())
    }

    /// Text for an anomaly notification, or `None` when everything is fine.
    /// A failed probe reports its own message.
    pub fn anomaly_details(&self) -> Option<String> {
        if !self.success {
            return Some(self.message.clone());
        }
        if self.overall_status == OverallStatus::Normal {
            return None;
        }
        let abnormal: Vec<&MountHealth> = self.abnormal_mounts().collect();
        let lines: Vec<String> = abnormal
            .iter()
            .map(|m| format!(" - {} 状态: {}", m.name, m.status))
            .collect();
        Some(format!("发现{}个异常存储:\n{}", abnormal.len(), lines.join("\n")))
    }
}

#[derive(Debug, Error)]
enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("{0}")]
    Rejected(String),
}

/// Outer `None` is an absent key, inner `None` an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct StorageListResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, deserialize_with = "present")]
    data: Option<Option<StorageListData>>,
}

impl StorageListResponse {
    fn into_mounts(self) -> Result<Vec<RemoteMount>, FetchError> {
        if let Some(code) = self.code.filter(|c| *c != CODE_OK) {
            return Err(FetchError::Rejected(
                self.message.unwrap_or_else(|| format!("code {code}")),
            ));
        }
        // A missing key means an empty listing; an explicit null means the call failed.
        match self.data {
            None | Some(Some(StorageListData { content: None })) => Ok(Vec::new()),
            Some(Some(StorageListData { content: Some(Some(content)) })) => Ok(content),
            Some(None) | Some(Some(StorageListData { content: Some(None) })) => {
                Err(FetchError::Rejected(
                    self.message.unwrap_or_else(|| "响应缺少存储列表".to_string()),
                ))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StorageListData {
    #[serde(default, deserialize_with = "present")]
    content: Option<Option<Vec<RemoteMount>>>,
}

#[derive(Debug, Deserialize)]
struct RemoteMount {
    #[serde(default)]
    mount_path: Option<String>,
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl RemoteMount {
    fn into_health(self, checked_at: DateTime<Utc>) -> MountHealth {
        MountHealth {
            name: self.mount_path.unwrap_or_else(|| "/".to_string()),
            driver: self.driver.unwrap_or_else(|| "未知".to_string()),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            last_updated: checked_at,
        }
    }
}

pub struct StorageProbe {
    client: RetryingClient,
}

impl StorageProbe {
    pub fn new(client: RetryingClient) -> Self {
        Self { client }
    }

    /// Runs one probe. Failures are folded into the returned summary.
    pub async fn check(&self, settings: &AppSettings) -> HealthSummary {
        let (Some(base_url), Some(token)) = (settings.remote_url(), settings.remote_token()) else {
            return HealthSummary::failure("未配置Alist连接信息");
        };

        let url = format!("{}{}", base_url.trim_end_matches('/'), STORAGE_LIST_PATH);
        let checked_at = Utc::now();
        match self.fetch_mounts(&url, token).await {
            Ok(remote) => {
                debug!(url = %url, mount_count = remote.len(), "Fetched storage list.");
                let mounts = remote
                    .into_iter()
                    .map(|m| m.into_health(checked_at))
                    .collect();
                HealthSummary::from_mounts(mounts, checked_at)
            }
            Err(e) => {
                error!(url = %url, error = %e, "Storage list request failed.");
                HealthSummary::failure(format!("无法获取存储状态: {e}"))
            }
        }
    }

    async fn fetch_mounts(&self, url: &str, token: &str) -> Result<Vec<RemoteMount>, FetchError> {
        let response = self
            .client
            .send(|c| c.get(url).header(AUTHORIZATION, token).timeout(PROBE_TIMEOUT))
            .await?;
        let body: StorageListResponse = response
            .error_for_status()
            .map_err(HttpError::from)?
            .json()
            .await
            .map_err(HttpError::from)?;
        body.into_mounts()
    }
}
