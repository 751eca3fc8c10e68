//! # shellwright
//!
//! Command-line front end: runs commands through a shellwright session and
//! prints their output.
//!
//! ## Architecture
//!
//! This is Layer 3 - the binary that ties together:
//! - shellwright-core: configuration and error types
//! - shellwright-transport: the loopback transport
//! - shellwright-session: session lifecycle and output collection

pub mod cli;
pub mod runner;

// Re-export commonly used types
pub use cli::Args;
pub use runner::{authenticator, load_config, run_with_connector};
