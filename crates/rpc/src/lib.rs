//! HTTP transport for the namereg identity registry.
//!
//! The registry core is transport-agnostic; this crate maps it onto an axum
//! router. The query contract of the lookup endpoint (lookup / lookup2 /
//! by_telegram / by_order / all_delegations) is the one existing clients
//! already speak.

pub mod server;

pub use server::{start_server, AppState};
