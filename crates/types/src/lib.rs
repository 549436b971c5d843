//! Core types for the namereg identity registry.
//!
//! Provides the identity record data model, the wallet address codec the
//! registry derives its record keys from, deterministic multi-network address
//! derivation, and registered-name validation.

pub mod address;
pub mod name;
pub mod record;

pub use address::{
    decode_address, derive_wallet_addresses, encode_address, is_valid_address, AddressError,
    NetworkDef, WalletAddress, ADDRESS_BYTES, ADDRESS_VERSION, CHECKSUM_BYTES, PUBLIC_HASH_BYTES,
};
pub use name::{validate_name, NameError, NAME_MAX_LEN, NAME_MIN_LEN};
pub use record::{
    Delegation, ExternalChain, IdentityRecord, Message, RegisteredName, SocialPlatform,
    SocialProfile, LEASE_DAYS,
};
