//! Bounded, newest-first log of dispatched notifications.
use std::sync::Arc;

use crate::db::models::NotificationRecord;
use crate::db::{JsonStore, StoreError};

pub const MAX_NOTIFICATIONS: usize = 100;

/// Inserts at the front and drops whatever falls past the cap.
fn push_capped(records: &mut Vec<NotificationRecord>, record: NotificationRecord) {
    records.insert(0, record);
    records.truncate(MAX_NOTIFICATIONS);
}

#[derive(Clone)]
pub struct NotificationHistory {
    store: Arc<JsonStore>,
}

impl NotificationHistory {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub fn append(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let mut records = self.store.notifications();
        push_capped(&mut records, record);
        self.store.save_notifications(&records)
    }

    pub fn list(&self) -> Vec<NotificationRecord> {
        self.store.notifications()
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.save_notifications(&[])
    }
}
