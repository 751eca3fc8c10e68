//! # shellwright-transport
//!
//! Transport layer for shellwright.
//!
//! This crate provides:
//! - The `Connector`, `Transport` and `Channel` traits a session drives
//! - A loopback transport that runs exec channels as local child processes
//!   and shell channels on a pseudo-terminal
//! - Host key parsing and digests for fingerprint verification
//! - A scripted in-memory transport for deterministic tests
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on shellwright-core
//! and is driven by shellwright-session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hostkey;
pub mod local;
pub mod testing;
pub mod transport;

// Re-export commonly used types
pub use local::{LocalConnector, LocalExecChannel, LocalShellChannel, LocalTransport};
pub use transport::{Channel, Connector, PublicKeyCredentials, Transport};
