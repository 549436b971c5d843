//! Write path of the identity registry: create and update-merge.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use namereg_storage::{KeyLocks, KvStore};
use namereg_types::{
    decode_address, validate_name, Delegation, ExternalChain, IdentityRecord, Message,
    RegisteredName, SocialPlatform, SocialProfile,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::{RegistryError, Result};
use crate::records;
use crate::RegistrySettings;

/// Request to claim a first (or additional) name for a wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub wallet: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Update payload: every field present-or-absent, never type-erased.
///
/// Merge policy per field: `bio` and `profile_picture` overwrite; `socials`
/// and `dinosaur_wallets` merge key-by-key, preserving unspecified keys;
/// `nft_images` appends; `delegations` and `messages` append with
/// auto-stamped timestamps, and an explicit empty list clears the field. A
/// `name` renews the caller's own lease or claims an additional one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    pub wallet: String,
    #[serde(default)]
    pub guuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub socials: Option<BTreeMap<SocialPlatform, SocialProfile>>,
    #[serde(default)]
    pub nft_images: Option<Vec<String>>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub dinosaur_wallets: Option<BTreeMap<ExternalChain, String>>,
    #[serde(default)]
    pub delegations: Option<Vec<Delegation>>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

/// Outcome of an update: the resulting record and whether anything changed.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub record: IdentityRecord,
    pub changed: bool,
}

/// Write path of the registry.
///
/// Every read-modify-write holds the record's key lock; operations that claim
/// or renew a name additionally hold the name-claim lock across the
/// uniqueness check and the persist, so concurrent claims of one name admit
/// exactly one winner. The claim lock is always taken before any key lock.
pub struct IdentityRegistry {
    store: Arc<dyn KvStore>,
    locks: Arc<KeyLocks>,
    settings: Arc<RegistrySettings>,
    name_claims: Mutex<()>,
}

impl IdentityRegistry {
    pub fn new(
        store: Arc<dyn KvStore>,
        locks: Arc<KeyLocks>,
        settings: Arc<RegistrySettings>,
    ) -> Self {
        Self {
            store,
            locks,
            settings,
            name_claims: Mutex::new(()),
        }
    }

    /// Register a name for a wallet, creating its identity record on first
    /// contact. A wallet that already owns a record falls through to the
    /// update path and claims the name as an additional one.
    pub fn create(&self, request: CreateRequest) -> Result<IdentityRecord> {
        let name = request.name.to_lowercase();
        validate_name(&name, &self.settings.disallowed_names)?;

        let wallet = decode_address(&request.wallet)?;
        let public_hash = wallet.public_hash_hex();
        let now = Utc::now();

        let _claim = self.name_claims.lock();
        let _key = self.locks.lock(&public_hash);

        if let Some(existing) = records::load_record(self.store.as_ref(), &public_hash)? {
            if existing.has_active_name(&name, now) {
                return Err(RegistryError::DuplicateRegistration { name });
            }
            info!(%public_hash, "wallet already owns an identity, treating create as update");
            let update = UpdateRequest {
                wallet: request.wallet,
                name: Some(name),
                tx_hash: request.tx_hash,
                ..UpdateRequest::default()
            };
            return self
                .update_locked(update, existing, now)
                .map(|outcome| outcome.record);
        }

        if self.name_owned_elsewhere(&name, &public_hash, now)? {
            return Err(RegistryError::NameTaken { name });
        }

        let record = IdentityRecord::new(
            public_hash.clone(),
            Uuid::new_v4().to_string(),
            wallet.sign_id,
            name,
            RegisteredName::lease(now, request.tx_hash),
        );
        records::persist_record(self.store.as_ref(), &record)?;
        info!(%public_hash, "created identity record");
        Ok(record)
    }

    /// Merge an update payload into the caller's record.
    pub fn update(&self, request: UpdateRequest) -> Result<UpdateOutcome> {
        let wallet = decode_address(&request.wallet)?;
        let public_hash = wallet.public_hash_hex();
        let now = Utc::now();

        let _claim = request.name.as_ref().map(|_| self.name_claims.lock());
        let _key = self.locks.lock(&public_hash);

        let existing = records::load_record(self.store.as_ref(), &public_hash)?
            .ok_or(RegistryError::NotFound { key: public_hash })?;
        self.update_locked(request, existing, now)
    }

    /// Update body. The caller holds the key lock, and the name-claim lock
    /// whenever the payload carries a name.
    fn update_locked(
        &self,
        request: UpdateRequest,
        mut record: IdentityRecord,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        if request.guuid.is_some() {
            return Err(RegistryError::ImmutableField { field: "guuid" });
        }

        let original = record.clone();

        if let Some(name) = &request.name {
            let name = name.to_lowercase();
            if self.name_owned_elsewhere(&name, &record.public_hash, now)? {
                return Err(RegistryError::NameTaken { name });
            }
            match record.registered_names.get_mut(&name) {
                Some(lease) => {
                    info!(name = %name, "name already registered to caller, extending lease");
                    lease.extend();
                    if request.tx_hash.is_some() {
                        lease.tx_hash = request.tx_hash.clone();
                    }
                }
                None => {
                    record
                        .registered_names
                        .insert(name, RegisteredName::lease(now, request.tx_hash.clone()));
                }
            }
        }

        if let Some(socials) = &request.socials {
            for (platform, profile) in socials {
                record.socials.insert(*platform, profile.clone());
            }
        }
        if let Some(images) = &request.nft_images {
            record.nft_images.extend(images.iter().cloned());
        }
        if let Some(bio) = &request.bio {
            record.bio = bio.clone();
        }
        if let Some(picture) = &request.profile_picture {
            record.profile_picture = picture.clone();
        }
        if let Some(wallets) = &request.dinosaur_wallets {
            for (chain, address) in wallets {
                record.dinosaur_wallets.insert(*chain, address.clone());
            }
        }
        if let Some(delegations) = &request.delegations {
            if delegations.is_empty() {
                record.delegations.clear();
            } else {
                for delegation in delegations {
                    let mut delegation = delegation.clone();
                    delegation.delegation_time.get_or_insert(now);
                    record.delegations.push(delegation);
                }
            }
        }
        if let Some(messages) = &request.messages {
            if messages.is_empty() {
                record.messages.clear();
            } else {
                for message in messages {
                    let mut message = message.clone();
                    message.timestamp.get_or_insert(now);
                    record.messages.push(message);
                }
            }
        }

        if record == original {
            return Ok(UpdateOutcome {
                record,
                changed: false,
            });
        }

        record.modified_at = Some(now);
        records::persist_record(self.store.as_ref(), &record)?;
        info!(public_hash = %record.public_hash, "updated identity record");
        Ok(UpdateOutcome {
            record,
            changed: true,
        })
    }

    /// Whether `name` is an active lease on any record other than `owner`.
    fn name_owned_elsewhere(&self, name: &str, owner: &str, now: DateTime<Utc>) -> Result<bool> {
        let all = records::load_all(self.store.as_ref())?;
        Ok(all
            .iter()
            .any(|(key, record)| key != owner && record.has_active_name(name, now)))
    }
}
