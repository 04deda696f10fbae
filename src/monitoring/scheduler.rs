//! In-process interval scheduler.
//!
//! Each registered job runs on its own tokio task and is keyed by a job id.
//! Registering an id that is already present replaces the old registration.
//! Removing a job only prevents future ticks; a tick that is already running
//! is allowed to finish.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run(&self);
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job interval must be greater than zero")]
    ZeroInterval,
    #[error("Job interval {0:?} is too large to schedule")]
    IntervalTooLarge(Duration),
}

struct RegisteredJob {
    every: Duration,
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, RegisteredJob>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` to run every `every`, first one full period from now.
    pub async fn add_interval_job(
        &self,
        id: &str,
        every: Duration,
        job: Arc<dyn Job>,
    ) -> Result<(), SchedulerError> {
        if every.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        let first_tick = Instant::now()
            .checked_add(every)
            .ok_or(SchedulerError::IntervalTooLarge(every))?;

        let (handle, shutdown_tx) = spawn_interval_task(id.to_string(), first_tick, every, job);
        let previous = self.jobs.lock().await.insert(
            id.to_string(),
            RegisteredJob {
                every,
                handle,
                shutdown_tx,
            },
        );

        match previous {
            Some(old) => {
                info!(job_id = id, old_interval = ?old.every, new_interval = ?every, "Replaced scheduled job.");
                if old.shutdown_tx.send(()).is_err() {
                    debug!(job_id = id, "Replaced job task had already finished.");
                }
            }
            None => info!(job_id = id, interval = ?every, "Scheduled job."),
        }
        Ok(())
    }

    /// Deregisters a job. Returns `false` if nothing was registered under `id`.
    pub async fn remove_job(&self, id: &str) -> bool {
        let Some(job) = self.jobs.lock().await.remove(id) else {
            return false;
        };
        if job.shutdown_tx.send(()).is_err() {
            debug!(job_id = id, "Job task had already finished.");
        }
        info!(job_id = id, "Removed scheduled job.");
        true
    }

    pub async fn job_interval(&self, id: &str) -> Option<Duration> {
        self.jobs.lock().await.get(id).map(|job| job.every)
    }

    /// Stops every job and waits for their tasks, including in-flight ticks.
    pub async fn shutdown(&self) {
        let jobs: Vec<(String, RegisteredJob)> = self.jobs.lock().await.drain().collect();
        for (id, job) in jobs {
            let _ = job.shutdown_tx.send(());
            if let Err(e) = job.handle.await {
                warn!(job_id = %id, error = %e, "Job task ended abnormally.");
            }
        }
        info!("Scheduler shut down.");
    }
}

fn spawn_interval_task(
    id: String,
    first_tick: Instant,
    every: Duration,
    job: Arc<dyn Job>,
) -> (JoinHandle<()>, oneshot::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(first_tick, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    debug!(job_id = %id, "Job task received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    debug!(job_id = %id, "Running scheduled job.");
                    job.run().await;
                }
            }
        }
    });
    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Takes a while to finish, to observe in-flight behaviour.
    #[derive(Default)]
    struct SlowJob {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl Job for SlowJob {
        async fn run(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_after_one_interval() {
        let scheduler = Scheduler::new();
        let job = Arc::new(CountingJob::default());
        scheduler
            .add_interval_job("probe", Duration::from_secs(5), job.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(5200)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_before_first_tick() {
        let scheduler = Scheduler::new();
        let job = Arc::new(CountingJob::default());
        scheduler
            .add_interval_job("probe", Duration::from_secs(5), job.clone())
            .await
            .unwrap();

        assert!(scheduler.remove_job("probe").await);
        assert!(!scheduler.remove_job("probe").await);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.job_interval("probe").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_id_replaces_registration() {
        let scheduler = Scheduler::new();
        let first = Arc::new(CountingJob::default());
        let second = Arc::new(CountingJob::default());

        scheduler
            .add_interval_job("probe", Duration::from_secs(5), first.clone())
            .await
            .unwrap();
        scheduler
            .add_interval_job("probe", Duration::from_secs(10), second.clone())
            .await
            .unwrap();
        assert_eq!(
            scheduler.job_interval("probe").await,
            Some(Duration::from_secs(10))
        );

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(first.runs.load(Ordering::SeqCst), 0);
        assert_eq!(second.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_finishes_after_removal() {
        let scheduler = Scheduler::new();
        let job = Arc::new(SlowJob::default());
        scheduler
            .add_interval_job("probe", Duration::from_secs(5), job.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(job.started.load(Ordering::SeqCst), 1);
        assert!(scheduler.remove_job("probe").await);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(job.started.load(Ordering::SeqCst), 1);
        assert_eq!(job.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_jobs() {
        let scheduler = Scheduler::new();
        let job = Arc::new(CountingJob::default());
        scheduler
            .add_interval_job("a", Duration::from_secs(1), job.clone())
            .await
            .unwrap();
        scheduler
            .add_interval_job("b", Duration::from_secs(2), job.clone())
            .await
            .unwrap();

        scheduler.shutdown().await;
        assert_eq!(scheduler.job_interval("a").await, None);
        assert_eq!(scheduler.job_interval("b").await, None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let scheduler = Scheduler::new();
        let err = scheduler
            .add_interval_job("probe", Duration::ZERO, Arc::new(CountingJob::default()))
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::ZeroInterval);
    }

    #[tokio::test]
    async fn test_unrepresentable_interval_is_rejected() {
        let scheduler = Scheduler::new();
        let every = Duration::from_secs(u64::MAX);
        let err = scheduler
            .add_interval_job("probe", every, Arc::new(CountingJob::default()))
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::IntervalTooLarge(every));
        assert_eq!(scheduler.job_interval("probe").await, None);
    }
}
