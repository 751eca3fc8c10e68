//! Transport traits.
//!
//! A [`Connector`] establishes a [`Transport`] to a host. The transport
//! verifies identity, authenticates, and opens [`Channel`]s: one-shot exec
//! channels that run a single command, and persistent shell channels that
//! accept commands written to them.

use std::path::PathBuf;

use shellwright_core::{HashAlgorithm, Result};

/// A bidirectional conduit for one command or one interactive shell.
pub trait Channel: Send {
    /// Read whatever stdout bytes are currently available.
    ///
    /// Never blocks; returns an empty vec when nothing is pending.
    fn read_stdout(&mut self) -> Result<Vec<u8>>;

    /// Read whatever stderr bytes are currently available.
    ///
    /// Never blocks. Channels that merge stderr into stdout (such as a
    /// shell on a pseudo-terminal) always return an empty vec.
    fn read_stderr(&mut self) -> Result<Vec<u8>>;

    /// Write bytes to the channel's stdin.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Close the channel.
    fn close(&mut self) -> Result<()>;
}

/// Key files for public-key authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyCredentials {
    /// Public key file; derived from the private key when absent
    pub public_key: Option<PathBuf>,
    /// Private key file
    pub private_key: PathBuf,
    /// Passphrase protecting the private key
    pub passphrase: Option<String>,
}

impl PublicKeyCredentials {
    /// Credentials for an unencrypted private key.
    pub fn new(private_key: impl Into<PathBuf>) -> Self {
        Self {
            public_key: None,
            private_key: private_key.into(),
            passphrase: None,
        }
    }

    /// Set the public key file.
    pub fn with_public_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key = Some(path.into());
        self
    }

    /// Set the key passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }
}

/// An established connection to a host.
pub trait Transport: Send {
    /// Digest of the host's identity key under `algorithm`.
    fn fingerprint(&mut self, algorithm: HashAlgorithm) -> Result<Vec<u8>>;

    /// Authenticate with a password.
    fn auth_password(&mut self, username: &str, password: &str) -> Result<()>;

    /// Authenticate with a key pair.
    fn auth_public_key(&mut self, username: &str, credentials: &PublicKeyCredentials)
        -> Result<()>;

    /// Authenticate with the "none" method.
    fn auth_none(&mut self, username: &str) -> Result<()>;

    /// Open a channel running `command`.
    fn open_exec_channel(&mut self, command: &str) -> Result<Box<dyn Channel>>;

    /// Open a persistent interactive shell channel.
    fn open_shell_channel(&mut self) -> Result<Box<dyn Channel>>;

    /// Signal session termination to the remote side.
    fn disconnect(&mut self) -> Result<()>;
}

/// Establishes transports.
pub trait Connector {
    /// Connect to `host:port`.
    ///
    /// Fails with `Error::ConnectionRefused` when no transport can be
    /// established.
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>>;
}
