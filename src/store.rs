//! In-memory status store keyed by trace id.
//!
//! Every operation takes the lock exactly once, so concurrent consumers
//! racing on the same trace id never interleave a read with a write.
//! The store is bounded: terminal records expire after a TTL and the oldest
//! record is evicted when capacity is reached.

use std::{collections::HashMap, collections::VecDeque, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{sync::RwLock, sync::watch, task::JoinHandle, time::interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    error::StoreError,
    models::{
        notification::NotificationRecord,
        status::{NotificationStatus, StatusUpdate},
    },
};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub capacity: usize,
    pub terminal_ttl: TimeDelta,
}

impl StoreConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.status_store_capacity,
            terminal_ttl: ttl_from_secs(config.status_ttl_seconds),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            terminal_ttl: ttl_from_secs(3_600),
        }
    }
}

fn ttl_from_secs(seconds: u64) -> TimeDelta {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, NotificationRecord>,
    order: VecDeque<Uuid>,
}

impl Inner {
    fn purge_expired(&mut self, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
        let before = self.records.len();

        self.records
            .retain(|_, record| !(record.status.is_terminal() && now - record.updated_at >= ttl));

        let removed = before - self.records.len();
        if removed > 0 {
            let records = &self.records;
            self.order.retain(|id| records.contains_key(id));
        }

        removed
    }

    fn evict_oldest(&mut self) -> Option<NotificationRecord> {
        while let Some(id) = self.order.pop_front() {
            if let Some(record) = self.records.remove(&id) {
                return Some(record);
            }
        }
        None
    }
}

pub struct StatusStore {
    inner: RwLock<Inner>,
    config: StoreConfig,
}

impl StatusStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config,
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub async fn create(&self, record: NotificationRecord) -> Result<(), StoreError> {
        if record.trace_id.is_nil() {
            return Err(StoreError::NilTraceId);
        }

        let mut inner = self.inner.write().await;

        if inner.records.contains_key(&record.trace_id) {
            return Err(StoreError::DuplicateTraceId(record.trace_id));
        }

        if inner.records.len() >= self.config.capacity {
            inner.purge_expired(Utc::now(), self.config.terminal_ttl);
        }

        while inner.records.len() >= self.config.capacity {
            match inner.evict_oldest() {
                Some(evicted) => warn!(
                    trace_id = %evicted.trace_id,
                    status = %evicted.status,
                    capacity = self.config.capacity,
                    "Status store full, evicted oldest record"
                ),
                None => break,
            }
        }

        let trace_id = record.trace_id;
        let status = record.status;
        inner.order.push_back(trace_id);
        inner.records.insert(trace_id, record);

        debug!(trace_id = %trace_id, status = %status, "Notification status created");

        Ok(())
    }

    pub async fn get(&self, trace_id: &Uuid) -> Option<NotificationRecord> {
        self.inner.read().await.records.get(trace_id).cloned()
    }

    pub async fn is_terminal(&self, trace_id: &Uuid) -> bool {
        self.inner
            .read()
            .await
            .records
            .get(trace_id)
            .is_some_and(|record| record.status.is_terminal())
    }

    /// Sets the current status. A terminal status is kept when a different
    /// status arrives, a non-terminal status carrying a lower retry count than
    /// the record is ignored, and unknown trace ids are a no-op.
    pub async fn update_status(
        &self,
        trace_id: &Uuid,
        status: NotificationStatus,
        retry_count: u32,
        error: Option<String>,
    ) -> StatusUpdate {
        let mut inner = self.inner.write().await;

        let Some(record) = inner.records.get_mut(trace_id) else {
            debug!(trace_id = %trace_id, status = %status, "Status update for unknown trace id ignored");
            return StatusUpdate::Missing;
        };

        if record.status.is_terminal() && record.status != status {
            debug!(
                trace_id = %trace_id,
                current = %record.status,
                requested = %status,
                "Terminal status kept"
            );
            return StatusUpdate::TerminalKept(record.status);
        }

        if !status.is_terminal() && retry_count < record.retry_count {
            debug!(
                trace_id = %trace_id,
                current = %record.status,
                requested = %status,
                retry_count,
                "Stale status update ignored"
            );
            return StatusUpdate::Stale;
        }

        if record.status == status
            && record.retry_count == retry_count
            && (error.is_none() || record.last_error == error)
        {
            return StatusUpdate::Unchanged;
        }

        record.status = status;
        record.retry_count = retry_count;
        if error.is_some() {
            record.last_error = error;
        }
        record.updated_at = Utc::now();

        info!(trace_id = %trace_id, status = %status, retry_count, "Notification status updated");

        StatusUpdate::Applied
    }

    pub async fn remove(&self, trace_id: &Uuid) -> Option<NotificationRecord> {
        let mut inner = self.inner.write().await;
        let removed = inner.records.remove(trace_id);

        if removed.is_some() {
            inner.order.retain(|id| id != trace_id);
        }

        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now()).await
    }

    pub async fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.inner
            .write()
            .await
            .purge_expired(now, self.config.terminal_ttl)
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.evict_expired().await;
                        if removed > 0 {
                            info!(removed, "Expired terminal status records evicted");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            debug!("Status store sweeper stopped");
        })
    }
}
