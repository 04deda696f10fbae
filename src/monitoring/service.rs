use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::probe::{HealthSummary, OverallStatus, StorageProbe};
use super::scheduler::{Job, Scheduler, SchedulerError};
use crate::db::models::{MonitorStatus, NotificationRecord, Severity};
use crate::db::{JsonStore, StoreError};
use crate::notifications::models::{DispatchOutcome, NotificationEvent};
use crate::notifications::service::NotificationService;

pub const MONITOR_JOB_ID: &str = "alist_monitor_job";

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("监控间隔必须大于0")]
    InvalidInterval,
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// The recurring probe. Registered with the scheduler under `MONITOR_JOB_ID`.
pub struct MonitorTask {
    store: Arc<JsonStore>,
    probe: StorageProbe,
    notifications: Arc<NotificationService>,
}

impl MonitorTask {
    pub fn new(
        store: Arc<JsonStore>,
        probe: StorageProbe,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            probe,
            notifications,
        }
    }

    /// One scheduled check. The counter is persisted before the probe runs.
    pub async fn tick(&self) -> HealthSummary {
        let mut status = self.store.monitor_status();
        status.check_count += 1;
        if let Err(e) = self.store.save_monitor_status(&status) {
            error!(error = %e, "Failed to persist check count.");
        }
        info!(check_count = status.check_count, "Running scheduled storage check.");

        let summary = self.probe_once().await;
        if self.report(&summary).await.is_none() {
            info!("Scheduled check finished, all mounts are healthy.");
        }
        summary
    }

    pub async fn probe_once(&self) -> HealthSummary {
        self.probe.check(&self.store.settings()).await
    }

    /// Sends an anomaly notification when the summary calls for one.
    pub async fn report(&self, summary: &HealthSummary) -> Option<DispatchOutcome> {
        let details = summary.anomaly_details()?;
        warn!(success = summary.success, details = %details, "Storage anomaly detected.");
        Some(
            self.notifications
                .send(NotificationEvent::Anomaly { details })
                .await,
        )
    }
}

#[async_trait]
impl Job for MonitorTask {
    async fn run(&self) {
        self.tick().await;
    }
}

/// Owns the monitor lifecycle on top of the shared scheduler.
pub struct MonitorService {
    store: Arc<JsonStore>,
    scheduler: Arc<Scheduler>,
    notifications: Arc<NotificationService>,
    task: Arc<MonitorTask>,
}

impl MonitorService {
    pub fn new(
        store: Arc<JsonStore>,
        scheduler: Arc<Scheduler>,
        probe: StorageProbe,
        notifications: Arc<NotificationService>,
    ) -> Self {
        let task = Arc::new(MonitorTask::new(
            store.clone(),
            probe,
            notifications.clone(),
        ));
        Self {
            store,
            scheduler,
            notifications,
            task,
        }
    }

    pub async fn start(
        &self,
        interval_secs: u64,
        start_time: DateTime<Utc>,
    ) -> Result<MonitorStatus, MonitorError> {
        if interval_secs == 0 {
            return Err(MonitorError::InvalidInterval);
        }
        self.scheduler
            .add_interval_job(
                MONITOR_JOB_ID,
                Duration::from_secs(interval_secs),
                self.task.clone(),
            )
            .await?;

        let status = MonitorStatus::running(interval_secs, start_time);
        self.persist_status(&status);
        info!(interval_secs, %start_time, "Background monitoring started.");

        self.notifications
            .send(NotificationEvent::Start {
                start_time,
                interval_secs,
            })
            .await;
        Ok(status)
    }

    pub async fn stop(&self) -> MonitorStatus {
        if !self.scheduler.remove_job(MONITOR_JOB_ID).await {
            info!("Stop requested but no monitor job was registered.");
        }

        let previous = self.store.monitor_status();
        let status = MonitorStatus::stopped();
        self.persist_status(&status);

        let stop_time = Utc::now();
        let duration = previous.start_time.map(|started| stop_time - started);
        info!(check_count = previous.check_count, "Background monitoring stopped.");

        self.notifications
            .send(NotificationEvent::Stop {
                stop_time,
                duration,
            })
            .await;
        status
    }

    /// Re-registers the job from the persisted status after a restart.
    /// Returns whether a job was registered.
    pub async fn resume(&self) -> bool {
        let status = self.store.monitor_status();
        if !status.is_monitoring {
            return false;
        }
        let Some(interval_secs) = status.resumable_interval() else {
            warn!(interval = ?status.interval, "Persisted monitor status has no usable interval, not resuming.");
            return false;
        };

        match self
            .scheduler
            .add_interval_job(
                MONITOR_JOB_ID,
                Duration::from_secs(interval_secs),
                self.task.clone(),
            )
            .await
        {
            Ok(()) => {
                info!(interval_secs, check_count = status.check_count, "Resumed background monitoring.");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to resume background monitoring.");
                false
            }
        }
    }

    /// User-triggered check. Overrides that differ from the stored connection
    /// settings are saved before probing.
    pub async fn manual_check(
        &self,
        override_url: Option<String>,
        override_token: Option<String>,
    ) -> HealthSummary {
        self.apply_overrides(override_url, override_token);

        let mut status = self.store.monitor_status();
        if status.is_monitoring {
            status.check_count += 1;
            self.persist_status(&status);
        }

        let summary = self.task.probe_once().await;
        self.task.report(&summary).await;

        let severity = match summary.overall_status {
            OverallStatus::Normal => Severity::Success,
            OverallStatus::Abnormal => Severity::Warning,
        };
        self.notifications.record(
            format!("手动检查完成: {}", summary.overall_status.label()),
            severity,
        );
        summary
    }

    /// A single probe with no side effects on status or history.
    pub async fn probe_once(&self) -> HealthSummary {
        self.task.probe_once().await
    }

    pub fn status(&self) -> MonitorStatus {
        self.store.monitor_status()
    }

    pub fn history(&self) -> Vec<NotificationRecord> {
        self.notifications.history()
    }

    pub fn clear_history(&self) -> Result<(), StoreError> {
        self.notifications.clear_history()
    }

    pub async fn send_test(&self) -> DispatchOutcome {
        self.notifications.send(NotificationEvent::Test).await
    }

    fn apply_overrides(&self, override_url: Option<String>, override_token: Option<String>) {
        let mut settings = self.store.settings();
        let mut changed = false;
        if let Some(url) = non_empty(override_url) {
            if settings.remote_url.as_deref() != Some(url.as_str()) {
                settings.remote_url = Some(url);
                changed = true;
            }
        }
        if let Some(token) = non_empty(override_token) {
            if settings.remote_token.as_deref() != Some(token.as_str()) {
                settings.remote_token = Some(token);
                changed = true;
            }
        }
        if changed {
            match self.store.save_settings(&settings) {
                Ok(()) => info!("Saved connection settings supplied with manual check."),
                Err(e) => error!(error = %e, "Failed to save connection settings."),
            }
        }
    }

    fn persist_status(&self, status: &MonitorStatus) {
        if let Err(e) = self.store.save_monitor_status(status) {
            error!(error = %e, "Failed to persist monitor status.");
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AppSettings;
    use crate::services::http_client::{RetryPolicy, RetryingClient};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _dir: TempDir,
        store: Arc<JsonStore>,
        scheduler: Arc<Scheduler>,
        service: MonitorService,
    }

    fn fixture(server: &MockServer) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::new(dir.path()));
        store.init().unwrap();
        store
            .save_settings(&AppSettings {
                remote_url: Some(server.uri()),
                remote_token: Some("token".to_string()),
                webhook_url: Some(format!("{}/hook", server.uri())),
                ..Default::default()
            })
            .unwrap();

        let client = RetryingClient::new(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        })
        .unwrap();
        let notifications = Arc::new(NotificationService::new(
            store.clone(),
            client.clone(),
            &server.uri(),
        ));
        let scheduler = Arc::new(Scheduler::new());
        let service = MonitorService::new(
            store.clone(),
            scheduler.clone(),
            StorageProbe::new(client),
            notifications,
        );
        Fixture {
            _dir: dir,
            store,
            scheduler,
            service,
        }
    }

    async fn mount_storage_list(server: &MockServer, statuses: &[(&str, &str)]) {
        let content: Vec<_> = statuses
            .iter()
            .map(|(name, status)| json!({"mount_path": name, "driver": "Local", "status": status}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/admin/storage/list"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"content": content}})),
            )
            .mount(server)
            .await;
    }

    async fn mount_hook(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 0})))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_manual_check_all_mounts_working() {
        let server = MockServer::start().await;
        mount_storage_list(&server, &[("/a", "work"), ("/b", "work")]).await;
        mount_hook(&server, 0).await;
        let fx = fixture(&server);

        let summary = fx.service.manual_check(None, None).await;
        assert!(summary.success);
        assert_eq!(summary.overall_status, OverallStatus::Normal);

        let history = fx.service.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].severity, Severity::Success);
        assert_eq!(history[0].message, "手动检查完成: 正常");
    }

    #[tokio::test]
    async fn test_manual_check_with_broken_mount_sends_anomaly() {
        let server = MockServer::start().await;
        mount_storage_list(&server, &[("/a", "work"), ("/broken", "error")]).await;
        mount_hook(&server, 1).await;
        let fx = fixture(&server);

        let summary = fx.service.manual_check(None, None).await;
        assert_eq!(summary.overall_status, OverallStatus::Abnormal);

        let history = fx.service.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].severity, Severity::Warning);
        assert_eq!(history[0].message, "手动检查完成: 异常");
        assert_eq!(history[1].severity, Severity::Error);
        assert_eq!(
            history[1].message,
            "⚠️ 后台监控发现异常 - 发现1个异常存储:  - /broken 状态: error"
        );
    }

    #[tokio::test]
    async fn test_start_then_immediate_stop() {
        let server = MockServer::start().await;
        mount_storage_list(&server, &[("/a", "work")]).await;
        mount_hook(&server, 2).await;
        let fx = fixture(&server);

        let start_time = Utc::now();
        let status = fx.service.start(5, start_time).await.unwrap();
        assert_eq!(status, MonitorStatus::running(5, start_time));
        assert_eq!(fx.store.monitor_status(), status);
        assert_eq!(
            fx.scheduler.job_interval(MONITOR_JOB_ID).await,
            Some(Duration::from_secs(5))
        );

        let status = fx.service.stop().await;
        assert_eq!(status, MonitorStatus::stopped());
        assert_eq!(fx.store.monitor_status().check_count, 0);
        assert_eq!(fx.scheduler.job_interval(MONITOR_JOB_ID).await, None);

        let history = fx.service.history();
        assert_eq!(history.len(), 2);
        assert!(history[0].message.starts_with("⏹️ 后台监控已停止"));
        assert!(history[1].message.starts_with("▶️ 后台监控已启动"));
        assert!(history[1].message.ends_with("监控间隔: 5秒"));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_not_an_error() {
        let server = MockServer::start().await;
        mount_hook(&server, 1).await;
        let fx = fixture(&server);

        fx.service.stop().await;
        let history = fx.service.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].message.ends_with("运行时长: 未知"));
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let server = MockServer::start().await;
        mount_hook(&server, 0).await;
        let fx = fixture(&server);

        let err = fx.service.start(0, Utc::now()).await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidInterval));
        assert!(!fx.service.status().is_monitoring);
        assert!(fx.service.history().is_empty());
    }

    #[tokio::test]
    async fn test_unschedulable_interval_leaves_monitoring_off() {
        let server = MockServer::start().await;
        mount_hook(&server, 0).await;
        let fx = fixture(&server);

        let err = fx.service.start(u64::MAX, Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Scheduler(SchedulerError::IntervalTooLarge(_))
        ));
        assert!(!fx.service.status().is_monitoring);
        assert!(fx.service.history().is_empty());
        assert_eq!(fx.scheduler.job_interval(MONITOR_JOB_ID).await, None);

        // A status persisted before the check existed must not resume either.
        fx.store
            .save_monitor_status(&MonitorStatus::running(u64::MAX, Utc::now()))
            .unwrap();
        assert!(!fx.service.resume().await);
        assert_eq!(fx.scheduler.job_interval(MONITOR_JOB_ID).await, None);
    }

    #[tokio::test]
    async fn test_resume_does_not_notify_or_reset_count() {
        let server = MockServer::start().await;
        mount_hook(&server, 0).await;
        let fx = fixture(&server);

        let mut persisted = MonitorStatus::running(30, Utc::now());
        persisted.check_count = 7;
        fx.store.save_monitor_status(&persisted).unwrap();

        assert!(fx.service.resume().await);
        assert_eq!(
            fx.scheduler.job_interval(MONITOR_JOB_ID).await,
            Some(Duration::from_secs(30))
        );
        assert_eq!(fx.service.status().check_count, 7);
        assert!(fx.service.history().is_empty());
    }

    #[tokio::test]
    async fn test_resume_ignores_unusable_status() {
        let server = MockServer::start().await;
        let fx = fixture(&server);

        assert!(!fx.service.resume().await);

        let broken = MonitorStatus {
            is_monitoring: true,
            interval: None,
            ..Default::default()
        };
        fx.store.save_monitor_status(&broken).unwrap();
        assert!(!fx.service.resume().await);
        assert_eq!(fx.scheduler.job_interval(MONITOR_JOB_ID).await, None);
        assert_eq!(fx.store.monitor_status(), broken);
    }

    #[tokio::test]
    async fn test_tick_counts_before_probe_and_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/storage/list"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        mount_hook(&server, 1).await;
        let fx = fixture(&server);
        fx.store
            .save_monitor_status(&MonitorStatus::running(60, Utc::now()))
            .unwrap();

        let summary = fx.service.task.tick().await;
        assert!(!summary.success);
        assert_eq!(fx.store.monitor_status().check_count, 1);

        let history = fx.service.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].message.contains("无法获取存储状态"));
    }

    #[tokio::test]
    async fn test_manual_check_saves_overrides_and_counts_when_monitoring() {
        let server = MockServer::start().await;
        mount_storage_list(&server, &[("/a", "work")]).await;
        let fx = fixture(&server);
        fx.store
            .save_monitor_status(&MonitorStatus::running(60, Utc::now()))
            .unwrap();

        fx.service
            .manual_check(Some(server.uri()), Some("new-token".to_string()))
            .await;

        let settings = fx.store.settings();
        assert_eq!(settings.remote_token(), Some("new-token"));
        assert_eq!(settings.remote_url(), Some(server.uri().as_str()));
        assert_eq!(fx.store.monitor_status().check_count, 1);

        fx.service.manual_check(Some("  ".to_string()), None).await;
        assert_eq!(fx.store.settings().remote_token(), Some("new-token"));
        assert_eq!(fx.store.monitor_status().check_count, 2);
    }

    #[tokio::test]
    async fn test_probe_once_leaves_no_trace() {
        let server = MockServer::start().await;
        mount_storage_list(&server, &[("/a", "error")]).await;
        mount_hook(&server, 0).await;
        let fx = fixture(&server);

        let summary = fx.service.probe_once().await;
        assert_eq!(summary.overall_status, OverallStatus::Abnormal);
        assert!(fx.service.history().is_empty());
        assert_eq!(fx.service.status(), MonitorStatus::stopped());
    }
}
