//! Read path: multi-mode lookups over the full record set.
//!
//! Secondary lookups (by name, telegram handle, order hash) scan the whole
//! store. That is fine at this registry's scale; explicit secondary indices
//! are the upgrade path if it stops being fine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use namereg_storage::KvStore;
use namereg_types::{
    decode_address, derive_wallet_addresses, Delegation, ExternalChain, IdentityRecord, Message,
    NetworkDef, RegisteredName, SocialPlatform, SocialProfile,
};
use serde::Serialize;
use tracing::warn;

use crate::errors::{RegistryError, Result};
use crate::records;
use crate::RegistrySettings;

/// Supported lookup modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Resolve a wallet address to its record.
    Address,
    /// Case-insensitive exact name match.
    NameExact,
    /// Case-insensitive substring match, returning the matching names only.
    NameList,
    /// Exact case-insensitive telegram profile match.
    Telegram,
    /// Delegation order-hash match.
    OrderHash,
    /// Every delegation across all records.
    AllDelegations,
}

/// Externally visible projection of a record: the guuid is stripped and the
/// derived per-network wallet addresses are attached.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub public_hash: String,
    pub sign_id: u32,
    pub registered_names: BTreeMap<String, RegisteredName>,
    pub socials: BTreeMap<SocialPlatform, SocialProfile>,
    pub bio: String,
    pub dinosaur_wallets: BTreeMap<ExternalChain, String>,
    pub nft_images: Vec<String>,
    pub profile_picture: String,
    pub delegations: Vec<Delegation>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    pub wallet_addresses: BTreeMap<String, String>,
}

impl RecordView {
    fn project(record: IdentityRecord, networks: &[NetworkDef]) -> Self {
        let wallet_addresses = match hex::decode(&record.public_hash) {
            Ok(raw) => derive_wallet_addresses(record.sign_id, &raw, networks),
            Err(err) => {
                warn!(public_hash = %record.public_hash, "stored public hash is not hex: {err}");
                BTreeMap::new()
            }
        };
        Self {
            public_hash: record.public_hash,
            sign_id: record.sign_id,
            registered_names: record.registered_names,
            socials: record.socials,
            bio: record.bio,
            dinosaur_wallets: record.dinosaur_wallets,
            nft_images: record.nft_images,
            profile_picture: record.profile_picture,
            delegations: record.delegations,
            messages: record.messages,
            modified_at: record.modified_at,
            wallet_addresses,
        }
    }
}

/// One delegation flattened out of its record, enriched with owner identity.
#[derive(Debug, Clone, Serialize)]
pub struct DelegationView {
    #[serde(flatten)]
    pub delegation: Delegation,
    pub public_hash: String,
    pub sign_id: u32,
    pub registered_names: BTreeMap<String, RegisteredName>,
}

/// Reply to a lookup: a single record view, matching names, or the flattened
/// delegation set.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LookupReply {
    Record(Box<RecordView>),
    Names(Vec<String>),
    Delegations(Vec<DelegationView>),
}

/// Read path of the registry.
pub struct LookupEngine {
    store: Arc<dyn KvStore>,
    settings: Arc<RegistrySettings>,
}

impl LookupEngine {
    pub fn new(store: Arc<dyn KvStore>, settings: Arc<RegistrySettings>) -> Self {
        Self { store, settings }
    }

    /// Single entry point; dispatches on `mode`. A miss is a normal negative
    /// outcome reported as `NotFound`, not a fault.
    pub fn lookup(&self, key: &str, mode: LookupMode) -> Result<LookupReply> {
        match mode {
            LookupMode::Address => self
                .by_address(key)
                .map(|view| LookupReply::Record(Box::new(view))),
            LookupMode::NameExact => self
                .by_name(key)
                .map(|view| LookupReply::Record(Box::new(view))),
            LookupMode::NameList => self.names_matching(key).map(LookupReply::Names),
            LookupMode::Telegram => self
                .by_telegram(key)
                .map(|view| LookupReply::Record(Box::new(view))),
            LookupMode::OrderHash => self
                .by_order_hash(key)
                .map(|view| LookupReply::Record(Box::new(view))),
            LookupMode::AllDelegations => self.all_delegations().map(LookupReply::Delegations),
        }
    }

    /// Resolve a wallet address. A record with no active name is treated as
    /// absent.
    pub fn by_address(&self, address: &str) -> Result<RecordView> {
        let wallet = decode_address(address)?;
        let public_hash = wallet.public_hash_hex();
        let now = Utc::now();
        match records::load_record(self.store.as_ref(), &public_hash)? {
            Some(record) if record.has_any_active_name(now) => {
                Ok(RecordView::project(record, &self.settings.networks))
            }
            _ => Err(RegistryError::NotFound {
                key: address.to_string(),
            }),
        }
    }

    /// First record owning `name`, compared case-insensitively.
    pub fn by_name(&self, name: &str) -> Result<RecordView> {
        let needle = name.to_lowercase();
        for (_, record) in records::load_all(self.store.as_ref())? {
            if record
                .registered_names
                .keys()
                .any(|registered| registered.to_lowercase() == needle)
            {
                return Ok(RecordView::project(record, &self.settings.networks));
            }
        }
        Err(RegistryError::NotFound {
            key: name.to_string(),
        })
    }

    /// All registered names containing `fragment`, across every record.
    pub fn names_matching(&self, fragment: &str) -> Result<Vec<String>> {
        let needle = fragment.to_lowercase();
        let mut matches = Vec::new();
        for (_, record) in records::load_all(self.store.as_ref())? {
            matches.extend(
                record
                    .registered_names
                    .keys()
                    .filter(|registered| registered.to_lowercase().contains(&needle))
                    .cloned(),
            );
        }
        if matches.is_empty() {
            return Err(RegistryError::NotFound {
                key: fragment.to_string(),
            });
        }
        Ok(matches)
    }

    /// Record whose telegram profile equals `handle`, ignoring case. Empty
    /// profiles never match.
    pub fn by_telegram(&self, handle: &str) -> Result<RecordView> {
        let needle = handle.to_lowercase();
        for (_, record) in records::load_all(self.store.as_ref())? {
            let matched = record
                .socials
                .get(&SocialPlatform::Telegram)
                .map(|social| {
                    !social.profile.is_empty() && social.profile.to_lowercase() == needle
                })
                .unwrap_or(false);
            if matched {
                return Ok(RecordView::project(record, &self.settings.networks));
            }
        }
        Err(RegistryError::NotFound {
            key: handle.to_string(),
        })
    }

    /// Record holding a delegation with the given order hash.
    pub fn by_order_hash(&self, order_hash: &str) -> Result<RecordView> {
        for (_, record) in records::load_all(self.store.as_ref())? {
            if record
                .delegations
                .iter()
                .any(|delegation| delegation.order_hash.as_deref() == Some(order_hash))
            {
                return Ok(RecordView::project(record, &self.settings.networks));
            }
        }
        Err(RegistryError::NotFound {
            key: order_hash.to_string(),
        })
    }

    /// Every delegation across every record, each enriched with its owner's
    /// public hash, sign id and registered names.
    pub fn all_delegations(&self) -> Result<Vec<DelegationView>> {
        let mut views = Vec::new();
        for (public_hash, record) in records::load_all(self.store.as_ref())? {
            for delegation in &record.delegations {
                views.push(DelegationView {
                    delegation: delegation.clone(),
                    public_hash: public_hash.clone(),
                    sign_id: record.sign_id,
                    registered_names: record.registered_names.clone(),
                });
            }
        }
        Ok(views)
    }
}
