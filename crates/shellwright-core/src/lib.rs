//! # shellwright-core
//!
//! Core types for shellwright.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other shellwright crates. It provides:
//!
//! - Error types
//! - Configuration loaded from YAML
//! - Wait policies and start/end pattern parsing
//! - Host fingerprint flags
//! - Session state types (SessionId, SessionState, ExecMode)
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other shellwright crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pattern;
pub mod policy;
pub mod session;

// Re-export commonly used types
pub use config::{ClientConfig, ConnectionSettings, LocalSettings, LoggingSettings, WaitSettings};
pub use error::{Error, Result};
pub use fingerprint::{FingerprintEncoding, FingerprintFlags, HashAlgorithm};
pub use pattern::Pattern;
pub use policy::{WaitPolicy, WaitPolicyOverrides};
pub use session::{ExecMode, SessionId, SessionState};
