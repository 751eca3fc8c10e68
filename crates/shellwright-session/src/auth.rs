//! Authentication strategies.
//!
//! Each strategy maps onto exactly one transport authentication method.

use std::fmt;
use std::path::PathBuf;

use shellwright_core::Result;
use shellwright_transport::{PublicKeyCredentials, Transport};

/// A way of proving identity to a transport.
pub trait Authenticator {
    /// Authenticate on `transport`.
    ///
    /// Transport errors are returned unmodified.
    fn authenticate(&self, transport: &mut dyn Transport) -> Result<()>;
}

/// Username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordAuth {
    username: String,
    password: String,
}

impl PasswordAuth {
    /// Create password credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// User to authenticate as.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Authenticator for PasswordAuth {
    fn authenticate(&self, transport: &mut dyn Transport) -> Result<()> {
        transport.auth_password(&self.username, &self.password)
    }
}

/// Key pair authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyAuth {
    username: String,
    credentials: PublicKeyCredentials,
}

impl PublicKeyAuth {
    /// Authenticate as `username` with the private key at `private_key`.
    pub fn new(username: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            credentials: PublicKeyCredentials::new(private_key),
        }
    }

    /// Set the public key file.
    pub fn with_public_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials = self.credentials.with_public_key(path);
        self
    }

    /// Set the private key passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.credentials = self.credentials.with_passphrase(passphrase);
        self
    }

    /// User to authenticate as.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Key files handed to the transport.
    pub fn credentials(&self) -> &PublicKeyCredentials {
        &self.credentials
    }
}

impl Authenticator for PublicKeyAuth {
    fn authenticate(&self, transport: &mut dyn Transport) -> Result<()> {
        transport.auth_public_key(&self.username, &self.credentials)
    }
}

/// The "none" method: succeeds only where the server requires no credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoneAuth {
    username: String,
}

impl NoneAuth {
    /// Authenticate as `username` without credentials.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl Authenticator for NoneAuth {
    fn authenticate(&self, transport: &mut dyn Transport) -> Result<()> {
        transport.auth_none(&self.username)
    }
}
