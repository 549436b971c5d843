//! Encode/decode helpers between the key-value store and identity records.

use std::collections::BTreeMap;

use namereg_storage::KvStore;
use namereg_types::IdentityRecord;
use tracing::error;

use crate::errors::Result;

/// Fetch and decode a single record. A missing key is `None`.
pub fn load_record(store: &dyn KvStore, key: &str) -> Result<Option<IdentityRecord>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and persist a single record under its public hash.
pub fn persist_record(store: &dyn KvStore, record: &IdentityRecord) -> Result<()> {
    let raw = serde_json::to_vec(record)?;
    store.set(&record.public_hash, &raw)?;
    Ok(())
}

/// Decode the full record set, keyed by public hash. Entries that fail to
/// decode are logged and skipped so one bad value never poisons a whole
/// enumeration.
pub fn load_all(store: &dyn KvStore) -> Result<BTreeMap<String, IdentityRecord>> {
    let mut records = BTreeMap::new();
    for (key, raw) in store.entries()? {
        match serde_json::from_slice::<IdentityRecord>(&raw) {
            Ok(record) => {
                records.insert(key, record);
            }
            Err(err) => error!(key = %key, "skipping undecodable record: {err}"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use namereg_storage::MemoryKvStore;
    use namereg_types::RegisteredName;

    fn sample(key: &str) -> IdentityRecord {
        IdentityRecord::new(
            key.to_string(),
            "f6b7f5e0-0000-4000-8000-000000000000".into(),
            2,
            "alice".into(),
            RegisteredName::lease(Utc::now(), None),
        )
    }

    #[test]
    fn roundtrip_through_the_store() {
        let store = MemoryKvStore::new();
        let record = sample("abcd");
        persist_record(&store, &record).expect("persist");

        let loaded = load_record(&store, "abcd").expect("load").expect("present");
        assert_eq!(loaded, record);
        assert!(load_record(&store, "missing").expect("load").is_none());
    }

    #[test]
    fn load_all_skips_undecodable_entries() {
        let store = MemoryKvStore::new();
        persist_record(&store, &sample("good")).expect("persist");
        store.set("bad", b"not json at all").expect("set");

        let records = load_all(&store).expect("load all");
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("good"));
    }
}
