//! Periodic deduplicated snapshots of the full record set, and restore.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use namereg_storage::{KeyLocks, KvStore};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info};

use crate::errors::Result;
use crate::records;

const SNAPSHOT_PREFIX: &str = "snapshot_";

/// Background snapshot writer plus the out-of-band restore path.
///
/// Snapshots are content-deduplicated by full equality against the last
/// written dump, and the newest `max_snapshots` files are retained, oldest
/// deleted first by modification order.
pub struct SnapshotManager {
    store: Arc<dyn KvStore>,
    locks: Arc<KeyLocks>,
    dir: PathBuf,
    interval: Duration,
    max_snapshots: usize,
    last_written: Mutex<Option<String>>,
}

impl SnapshotManager {
    /// Create a manager rooted at `dir`, seeding change detection from the
    /// newest snapshot already on disk.
    pub fn new(
        store: Arc<dyn KvStore>,
        locks: Arc<KeyLocks>,
        dir: impl Into<PathBuf>,
        interval: Duration,
        max_snapshots: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let last_written = match Self::sorted_snapshots(&dir)?.last() {
            Some(path) => Some(fs::read_to_string(path)?),
            None => None,
        };
        Ok(Self {
            store,
            locks,
            dir,
            interval,
            max_snapshots,
            last_written: Mutex::new(last_written),
        })
    }

    /// Snapshot files under `dir`, oldest first by modification time.
    fn sorted_snapshots(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(".json") {
                let modified = entry.metadata()?.modified()?;
                files.push((modified, entry.path()));
            }
        }
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Snapshots available for restore, newest first.
    pub fn list_snapshots(&self) -> Result<Vec<PathBuf>> {
        let mut files = Self::sorted_snapshots(&self.dir)?;
        files.reverse();
        Ok(files)
    }

    /// Dump the record set if it changed since the last written snapshot.
    /// Returns the new snapshot's path, or `None` when deduplicated away (or
    /// when the store is still empty).
    pub fn snapshot_once(&self) -> Result<Option<PathBuf>> {
        let all = records::load_all(self.store.as_ref())?;
        if all.is_empty() {
            return Ok(None);
        }
        let serialized = serde_json::to_string_pretty(&all)?;

        let mut last = self.last_written.lock();
        if last.as_deref() == Some(serialized.as_str()) {
            return Ok(None);
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("{SNAPSHOT_PREFIX}{stamp}.json"));
        fs::write(&path, &serialized)?;
        *last = Some(serialized);
        drop(last);
        info!(path = %path.display(), "wrote registry snapshot");

        self.prune()?;
        Ok(Some(path))
    }

    /// Delete the oldest snapshots beyond the retention bound.
    fn prune(&self) -> Result<()> {
        let files = Self::sorted_snapshots(&self.dir)?;
        if files.len() <= self.max_snapshots {
            return Ok(());
        }
        for path in &files[..files.len() - self.max_snapshots] {
            fs::remove_file(path)?;
            info!(path = %path.display(), "deleted old snapshot");
        }
        Ok(())
    }

    /// Overwrite the store with every entry the snapshot contains, verbatim:
    /// no merge, no validation against existing state. Disaster recovery
    /// only; never reachable from the request path.
    pub fn restore(&self, path: &Path) -> Result<()> {
        let raw = fs::read_to_string(path)?;
        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw)?;
        for (key, value) in entries {
            let _guard = self.locks.lock(&key);
            self.store.set(&key, &serde_json::to_vec(&value)?)?;
        }
        info!(path = %path.display(), "registry restore complete");
        Ok(())
    }

    /// Perpetual snapshot loop; exits when `shutdown` flips to true. Errors
    /// are logged and the loop continues on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.snapshot_once() {
                        error!("snapshot cycle failed: {err}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("snapshot manager stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use namereg_storage::MemoryKvStore;
    use namereg_types::{IdentityRecord, RegisteredName};
    use tempfile::TempDir;

    fn record(key: &str, name: &str) -> IdentityRecord {
        IdentityRecord::new(
            key.to_string(),
            format!("00000000-0000-4000-8000-0000000000{key:0>2}"),
            2,
            name.to_string(),
            RegisteredName::lease(Utc::now(), None),
        )
    }

    fn manager(store: Arc<dyn KvStore>, dir: &Path, max: usize) -> SnapshotManager {
        SnapshotManager::new(
            store,
            Arc::new(KeyLocks::default()),
            dir,
            Duration::from_secs(600),
            max,
        )
        .expect("manager")
    }

    #[test]
    fn empty_store_produces_no_snapshot() {
        let dir = TempDir::new().expect("dir");
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let manager = manager(store, dir.path(), 100);
        assert!(manager.snapshot_once().expect("snapshot").is_none());
    }

    #[test]
    fn unchanged_content_is_deduplicated() {
        let dir = TempDir::new().expect("dir");
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        records::persist_record(store.as_ref(), &record("aa", "alice")).expect("persist");

        let manager = manager(store.clone(), dir.path(), 100);
        let first = manager.snapshot_once().expect("snapshot");
        assert!(first.is_some());
        assert!(manager.snapshot_once().expect("snapshot").is_none());

        // A real change produces a new file.
        records::persist_record(store.as_ref(), &record("bb", "bob")).expect("persist");
        let second = manager.snapshot_once().expect("snapshot");
        assert!(second.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn dedup_state_is_seeded_from_existing_snapshots() {
        let dir = TempDir::new().expect("dir");
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        records::persist_record(store.as_ref(), &record("aa", "alice")).expect("persist");

        manager(store.clone(), dir.path(), 100)
            .snapshot_once()
            .expect("snapshot")
            .expect("written");

        // A fresh manager over the same directory sees identical content and
        // writes nothing.
        let reopened = manager(store, dir.path(), 100);
        assert!(reopened.snapshot_once().expect("snapshot").is_none());
    }

    #[test]
    fn retention_deletes_oldest_first() {
        let dir = TempDir::new().expect("dir");
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let manager = manager(store.clone(), dir.path(), 2);

        // Timestamped names have second granularity; write distinct content
        // under pre-seeded files instead of sleeping between cycles.
        for (idx, name) in ["alice", "bob", "carol"].iter().enumerate() {
            records::persist_record(store.as_ref(), &record("aa", name)).expect("persist");
            let path = dir.path().join(format!("{SNAPSHOT_PREFIX}2026010{idx}_000000.json"));
            let all = records::load_all(store.as_ref()).expect("load");
            fs::write(&path, serde_json::to_string_pretty(&all).expect("json")).expect("write");
        }
        manager.prune().expect("prune");

        let remaining = manager.list_snapshots().expect("list");
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn restore_overwrites_existing_state_verbatim() {
        let dir = TempDir::new().expect("dir");
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        records::persist_record(store.as_ref(), &record("aa", "alice")).expect("persist");

        let manager = manager(store.clone(), dir.path(), 100);
        let path = manager
            .snapshot_once()
            .expect("snapshot")
            .expect("written");

        // Mutate the live record and add an entry the snapshot never saw.
        let mut mutated = record("aa", "alice");
        mutated.bio = "changed after snapshot".into();
        records::persist_record(store.as_ref(), &mutated).expect("persist");
        records::persist_record(store.as_ref(), &record("bb", "bob")).expect("persist");

        manager.restore(&path).expect("restore");

        let restored = records::load_record(store.as_ref(), "aa")
            .expect("load")
            .expect("present");
        assert_eq!(restored.bio, "");
        // Restore is an overwrite of the snapshot's keys, not a wipe.
        assert!(records::load_record(store.as_ref(), "bb")
            .expect("load")
            .is_some());
    }

    #[test]
    fn expired_leases_survive_restore_for_the_sweeper() {
        // A restored dump may carry leases that have since expired; restore
        // must not filter them, reclamation stays the sweeper's job.
        let dir = TempDir::new().expect("dir");
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut stale = record("aa", "alice");
        if let Some(lease) = stale.registered_names.get_mut("alice") {
            lease.expires_on = Utc::now() - ChronoDuration::days(2);
        }
        records::persist_record(store.as_ref(), &stale).expect("persist");

        let manager = manager(store.clone(), dir.path(), 100);
        let path = manager.snapshot_once().expect("snapshot").expect("written");
        manager.restore(&path).expect("restore");

        let restored = records::load_record(store.as_ref(), "aa")
            .expect("load")
            .expect("present");
        assert!(restored.registered_names.contains_key("alice"));
    }
}
