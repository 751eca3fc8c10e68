//! # shellwright-session
//!
//! Session lifecycle and output collection for shellwright.
//!
//! This crate provides:
//! - The session state machine (connect, authenticate, shell mode, batches)
//! - The output collector that decides when a command's output is complete
//! - Command batching
//! - Output buffering and scrubbing of echoed commands
//! - Authentication strategies
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on shellwright-core
//! and drives the traits of shellwright-transport.
//!
//! ## Example
//!
//! ```no_run
//! use shellwright_core::LocalSettings;
//! use shellwright_session::{PasswordAuth, Session};
//! use shellwright_transport::LocalConnector;
//!
//! # fn main() -> shellwright_core::Result<()> {
//! let mut session = Session::new("localhost", 22, LocalConnector::new(LocalSettings::default()));
//! session
//!     .connect()?
//!     .authenticate(&PasswordAuth::new("deploy", "secret"))?
//!     .exec("uname -a")?;
//! println!("{}", session.output());
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod batch;
pub mod collector;
pub mod output;
pub mod session;

// Re-export commonly used types
pub use auth::{Authenticator, NoneAuth, PasswordAuth, PublicKeyAuth};
pub use batch::CommandBatch;
pub use collector::OutputCollector;
pub use output::{OutputOptions, SessionOutput};
pub use session::Session;
