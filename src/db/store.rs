//! JSON document store backed by one file per key.
//!
//! Writes go to a temporary file in the same directory and are renamed over
//! the target, so readers never observe a partially written document. There
//! is no locking between read-modify-write cycles.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error};

use super::models::{AppSettings, MonitorStatus, NotificationRecord};

pub const CONFIG_KEY: &str = "config";
pub const MONITOR_STATUS_KEY: &str = "monitor_status";
pub const NOTIFICATIONS_KEY: &str = "notifications";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to replace document: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    data_dir: PathBuf,
}

impl JsonStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Creates the data directory. Safe to call more than once.
    pub fn init(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        debug!(data_dir = %self.data_dir.display(), "Data directory ready.");
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Loads a document, falling back to `T::default()` when the file is
    /// missing, empty or unreadable.
    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read JSON document.");
                return T::default();
            }
        };
        if contents.trim().is_empty() {
            return T::default();
        }
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            error!(path = %path.display(), error = %e, "Failed to parse JSON document.");
            T::default()
        })
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, document: &T) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.data_dir)?;
        serde_json::to_writer_pretty(&mut tmp, document)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;
        Ok(())
    }

    pub fn settings(&self) -> AppSettings {
        self.load(CONFIG_KEY)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<(), StoreError> {
        self.save(CONFIG_KEY, settings)
    }

    pub fn monitor_status(&self) -> MonitorStatus {
        self.load(MONITOR_STATUS_KEY)
    }

    pub fn save_monitor_status(&self, status: &MonitorStatus) -> Result<(), StoreError> {
        self.save(MONITOR_STATUS_KEY, status)
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.load(NOTIFICATIONS_KEY)
    }

    pub fn save_notifications(&self, records: &[NotificationRecord]) -> Result<(), StoreError> {
        self.save(NOTIFICATIONS_KEY, records)
    }
}
