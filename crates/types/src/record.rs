use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many days a fresh or renewed name lease lasts.
pub const LEASE_DAYS: i64 = 365;

/// Social platforms an identity can attach a profile handle for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Telegram,
    X,
    Facebook,
    Instagram,
}

impl SocialPlatform {
    pub const ALL: [SocialPlatform; 4] = [
        SocialPlatform::Telegram,
        SocialPlatform::X,
        SocialPlatform::Facebook,
        SocialPlatform::Instagram,
    ];
}

/// Profile handle on one social platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProfile {
    #[serde(default)]
    pub profile: String,
}

/// External chains an identity can attach a foreign wallet address for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExternalChain {
    Btc,
    Eth,
    Sol,
    Qevm,
}

impl ExternalChain {
    pub const ALL: [ExternalChain; 4] = [
        ExternalChain::Btc,
        ExternalChain::Eth,
        ExternalChain::Sol,
        ExternalChain::Qevm,
    ];
}

/// Lease data for one registered name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredName {
    pub created_at: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

impl RegisteredName {
    /// A fresh lease starting at `now`.
    pub fn lease(now: DateTime<Utc>, tx_hash: Option<String>) -> Self {
        Self {
            created_at: now,
            expires_on: now + Duration::days(LEASE_DAYS),
            tx_hash,
        }
    }

    /// Whether the lease is still active at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_on > now
    }

    /// Extend the lease by a full period from its current expiration, not
    /// from now.
    pub fn extend(&mut self) {
        self.expires_on = self.expires_on + Duration::days(LEASE_DAYS);
    }
}

/// A delegation entry attached to an identity.
///
/// `order_hash` doubles as a secondary lookup key. Callers may attach
/// arbitrary further fields; they are carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A message left for an identity. Arbitrary fields are carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The full profile and registration data owned by one wallet address.
///
/// Keyed in the store by `public_hash`. `public_hash`, `guuid` and `sign_id`
/// never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub public_hash: String,
    pub guuid: String,
    pub sign_id: u32,
    #[serde(default)]
    pub registered_names: BTreeMap<String, RegisteredName>,
    #[serde(default)]
    pub socials: BTreeMap<SocialPlatform, SocialProfile>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub dinosaur_wallets: BTreeMap<ExternalChain, String>,
    #[serde(default)]
    pub nft_images: Vec<String>,
    #[serde(default)]
    pub profile_picture: String,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl IdentityRecord {
    /// A new record holding its first name lease, with all sub-structures at
    /// their defaults (every social platform and external chain present but
    /// empty).
    pub fn new(
        public_hash: String,
        guuid: String,
        sign_id: u32,
        name: String,
        lease: RegisteredName,
    ) -> Self {
        let mut registered_names = BTreeMap::new();
        registered_names.insert(name, lease);
        Self {
            public_hash,
            guuid,
            sign_id,
            registered_names,
            socials: SocialPlatform::ALL
                .iter()
                .map(|p| (*p, SocialProfile::default()))
                .collect(),
            bio: String::new(),
            dinosaur_wallets: ExternalChain::ALL
                .iter()
                .map(|c| (*c, String::new()))
                .collect(),
            nft_images: Vec::new(),
            profile_picture: String::new(),
            delegations: Vec::new(),
            messages: Vec::new(),
            modified_at: None,
        }
    }

    /// Whether `name` is registered here with an unexpired lease.
    pub fn has_active_name(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.registered_names
            .get(name)
            .map(|lease| lease.is_active(now))
            .unwrap_or(false)
    }

    /// Whether any registered name is still active at `now`.
    pub fn has_any_active_name(&self, now: DateTime<Utc>) -> bool {
        self.registered_names
            .values()
            .any(|lease| lease.is_active(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_name(name: &str) -> IdentityRecord {
        IdentityRecord::new(
            "aa".repeat(32),
            "3f6e1fca-9f62-4d59-93f2-8b1d1e1f0c7a".into(),
            2,
            name.into(),
            RegisteredName::lease(Utc::now(), None),
        )
    }

    #[test]
    fn new_record_carries_default_substructures() {
        let record = record_with_name("alice");
        assert_eq!(record.socials.len(), 4);
        assert!(record.socials.values().all(|p| p.profile.is_empty()));
        assert_eq!(record.dinosaur_wallets.len(), 4);
        assert!(record.dinosaur_wallets.values().all(String::is_empty));
        assert!(record.nft_images.is_empty());
        assert!(record.modified_at.is_none());
    }

    #[test]
    fn fresh_lease_runs_for_a_year() {
        let now = Utc::now();
        let lease = RegisteredName::lease(now, Some("0xabc".into()));
        assert_eq!(lease.expires_on - lease.created_at, Duration::days(LEASE_DAYS));
        assert!(lease.is_active(now));
        assert!(!lease.is_active(now + Duration::days(LEASE_DAYS)));
    }

    #[test]
    fn extension_counts_from_previous_expiration() {
        let now = Utc::now();
        let mut lease = RegisteredName::lease(now, None);
        let previous_expiry = lease.expires_on;
        lease.extend();
        assert_eq!(lease.expires_on, previous_expiry + Duration::days(LEASE_DAYS));
        assert_eq!(lease.created_at, now);
    }

    #[test]
    fn active_name_checks_respect_expiry() {
        let now = Utc::now();
        let mut record = record_with_name("alice");
        assert!(record.has_active_name("alice", now));
        assert!(record.has_any_active_name(now));

        if let Some(lease) = record.registered_names.get_mut("alice") {
            lease.expires_on = now - Duration::days(1);
        }
        assert!(!record.has_active_name("alice", now));
        assert!(!record.has_any_active_name(now));
        assert!(!record.has_active_name("missing", now));
    }

    #[test]
    fn json_shape_matches_the_wire_format() {
        let record = record_with_name("alice");
        let value = serde_json::to_value(&record).expect("serialize");
        let socials = value["socials"].as_object().expect("socials object");
        assert!(socials.contains_key("telegram"));
        assert!(socials.contains_key("x"));
        let wallets = value["dinosaur_wallets"].as_object().expect("wallet object");
        assert!(wallets.contains_key("BTC"));
        assert!(wallets.contains_key("QEVM"));
        // modified_at is absent until the first effective update.
        assert!(value.get("modified_at").is_none());
    }

    #[test]
    fn delegation_extra_fields_roundtrip() {
        let raw = r#"{"order_hash":"0xdead","network":"backbone","value":"12.5"}"#;
        let delegation: Delegation = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(delegation.order_hash.as_deref(), Some("0xdead"));
        assert!(delegation.delegation_time.is_none());
        assert_eq!(delegation.extra["network"], "backbone");

        let back = serde_json::to_value(&delegation).expect("serialize");
        assert_eq!(back["value"], "12.5");
        assert!(back.get("delegation_time").is_none());
    }
}
