//! Identity registry core for namereg.
//!
//! A wallet address claims one or more human-readable names; profile metadata
//! attaches to the owning identity record. This crate carries the whole
//! engine: the write path with its uniqueness and merge rules, the multi-mode
//! lookup engine, the background sweep reclaiming expired name leases, and
//! the deduplicated snapshot/restore mechanism. The HTTP transport and node
//! wiring live in their own crates.

pub mod errors;
pub mod lookup;
pub mod records;
pub mod registry;
pub mod snapshot;
pub mod sweeper;

pub use errors::{RegistryError, Result};
pub use lookup::{DelegationView, LookupEngine, LookupMode, LookupReply, RecordView};
pub use registry::{CreateRequest, IdentityRegistry, UpdateOutcome, UpdateRequest};
pub use snapshot::SnapshotManager;
pub use sweeper::{ExpirationSweeper, SweepReport};

use namereg_types::NetworkDef;
use serde::{Deserialize, Serialize};

/// Registry-wide settings shared by the write path and the lookup engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Networks addresses are derived for in lookup responses.
    pub networks: Vec<NetworkDef>,
    /// Names that can never be registered.
    pub disallowed_names: Vec<String>,
}
