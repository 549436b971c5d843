use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Errors that can occur when parsing a wallet address string.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address is not valid base58")]
    InvalidBase58(#[from] bs58::decode::Error),
    #[error("address must decode to {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

/// Version byte carried by every address this registry derives.
pub const ADDRESS_VERSION: u8 = 1;
/// Size of the public hash embedded in an address.
pub const PUBLIC_HASH_BYTES: usize = 32;
/// Size of the trailing SHA3-256 checksum.
pub const CHECKSUM_BYTES: usize = 32;
/// Raw length of a decoded address:
/// version + net id + sign id + public hash + checksum.
pub const ADDRESS_BYTES: usize = 1 + 8 + 4 + PUBLIC_HASH_BYTES + CHECKSUM_BYTES;

/// Decoded form of a wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAddress {
    pub version: u8,
    pub net_id: u64,
    pub sign_id: u32,
    pub public_hash: [u8; PUBLIC_HASH_BYTES],
    pub checksum: [u8; CHECKSUM_BYTES],
}

impl WalletAddress {
    /// Hex encoding of the embedded public hash, the registry's record key.
    pub fn public_hash_hex(&self) -> String {
        hex::encode(self.public_hash)
    }
}

/// Encode a wallet address from its parts.
///
/// Layout is version (1 byte) || net id (8 bytes little-endian) || sign id
/// (4 bytes little-endian) || public hash, followed by a SHA3-256 checksum of
/// everything before it, the whole buffer base58 encoded. The layout is shared
/// with external wallets; any deviation breaks cross-system compatibility.
pub fn encode_address(version: u8, net_id: u64, sign_id: u32, public_hash: &[u8]) -> String {
    let mut raw = Vec::with_capacity(13 + public_hash.len() + CHECKSUM_BYTES);
    raw.push(version);
    raw.extend_from_slice(&net_id.to_le_bytes());
    raw.extend_from_slice(&sign_id.to_le_bytes());
    raw.extend_from_slice(public_hash);
    let checksum = Sha3_256::digest(&raw);
    raw.extend_from_slice(&checksum);
    bs58::encode(raw).into_string()
}

/// Attempt to decode a wallet address string into its parts.
pub fn decode_address(address: &str) -> Result<WalletAddress, AddressError> {
    let raw = bs58::decode(address).into_vec()?;
    if raw.len() != ADDRESS_BYTES {
        return Err(AddressError::InvalidLength {
            expected: ADDRESS_BYTES,
            actual: raw.len(),
        });
    }

    let payload_len = ADDRESS_BYTES - CHECKSUM_BYTES;
    let expected = Sha3_256::digest(&raw[..payload_len]);
    if expected.as_slice() != &raw[payload_len..] {
        return Err(AddressError::ChecksumMismatch);
    }

    let mut net_id = [0u8; 8];
    net_id.copy_from_slice(&raw[1..9]);
    let mut sign_id = [0u8; 4];
    sign_id.copy_from_slice(&raw[9..13]);
    let mut public_hash = [0u8; PUBLIC_HASH_BYTES];
    public_hash.copy_from_slice(&raw[13..payload_len]);
    let mut checksum = [0u8; CHECKSUM_BYTES];
    checksum.copy_from_slice(&raw[payload_len..]);

    Ok(WalletAddress {
        version: raw[0],
        net_id: u64::from_le_bytes(net_id),
        sign_id: u32::from_le_bytes(sign_id),
        public_hash,
        checksum,
    })
}

/// Check whether the provided string is a valid wallet address.
pub fn is_valid_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

/// A named network addresses are derived for in lookup responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDef {
    pub name: String,
    pub net_id: u64,
}

/// Derive one address per configured network from a record's signature scheme
/// id and raw public hash. Pure and deterministic.
pub fn derive_wallet_addresses(
    sign_id: u32,
    public_hash: &[u8],
    networks: &[NetworkDef],
) -> BTreeMap<String, String> {
    networks
        .iter()
        .map(|net| {
            let address = encode_address(ADDRESS_VERSION, net.net_id, sign_id, public_hash);
            (net.name.clone(), address)
        })
        .collect()
}
