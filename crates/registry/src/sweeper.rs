//! Background reclamation of expired name leases.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use namereg_storage::{KeyLocks, KvStore};
use tokio::sync::watch;
use tracing::{error, info};

use crate::errors::Result;
use crate::records;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub scanned_records: u64,
    pub removed_names: u64,
    pub updated_records: u64,
}

/// Background loop reclaiming expired name leases.
///
/// Works against the same keys the write path mutates, so every record is
/// re-read and rewritten under its key lock.
pub struct ExpirationSweeper {
    store: Arc<dyn KvStore>,
    locks: Arc<KeyLocks>,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<dyn KvStore>, locks: Arc<KeyLocks>, interval: Duration) -> Self {
        Self {
            store,
            locks,
            interval,
        }
    }

    /// One pass over the whole record set. A record that fails to decode is
    /// logged and skipped; only an enumeration failure fails the pass.
    pub fn sweep_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for key in records::load_all(self.store.as_ref())?.into_keys() {
            report.scanned_records += 1;

            // Re-read under the key lock; the enumerated copy may be stale by
            // the time this record's turn comes.
            let _guard = self.locks.lock(&key);
            let mut record = match records::load_record(self.store.as_ref(), &key) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    error!(key = %key, "skipping record during sweep: {err}");
                    continue;
                }
            };

            let expired: Vec<String> = record
                .registered_names
                .iter()
                .filter(|(_, lease)| !lease.is_active(now))
                .map(|(name, _)| name.clone())
                .collect();
            if expired.is_empty() {
                continue;
            }

            for name in &expired {
                record.registered_names.remove(name);
                info!(key = %key, name = %name, "removed expired registered name");
            }
            if let Err(err) = records::persist_record(self.store.as_ref(), &record) {
                error!(key = %key, "failed to write back swept record: {err}");
                continue;
            }
            report.removed_names += expired.len() as u64;
            report.updated_records += 1;
        }

        Ok(report)
    }

    /// Perpetual sweep loop; exits when `shutdown` flips to true. Errors are
    /// logged and the loop continues on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once() {
                        error!("expiration sweep failed: {err}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("expiration sweeper stopping");
                        return;
                    }
                }
            }
        }
    }
}
