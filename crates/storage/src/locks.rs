use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};

/// Sharded per-key mutex table.
///
/// The store only guarantees atomicity of individual get/set calls, so every
/// read-modify-write of a record must hold that key's lock from the first
/// read to the final write. The write path, the expiration sweeper and
/// snapshot restore all go through the same table. Keys are hashed onto a
/// fixed shard set; two keys may share a lock, which only ever
/// over-serializes, never under-serializes.
pub struct KeyLocks {
    shards: Box<[Mutex<()>]>,
}

impl KeyLocks {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Acquire the lock guarding `key`, blocking until it is free.
    pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        self.shards[idx].lock()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(64)
    }
}
