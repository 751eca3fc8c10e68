//! Error types for shellwright.

use thiserror::Error;

/// Main error type for shellwright operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport could not establish a connection
    #[error("Connection refused by {host}:{port}: {reason}")]
    ConnectionRefused {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Reason reported by the transport
        reason: String,
    },

    /// Host identity verification mismatch
    #[error("Bad fingerprint: expected {expected}, got {actual}")]
    BadFingerprint {
        /// Fingerprint supplied by the caller
        expected: String,
        /// Fingerprint reported by the transport
        actual: String,
    },

    /// Output collection deadline elapsed
    #[error("Timed out waiting for output after {0}ms")]
    Timeout(u64),

    /// Malformed start/end pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    Regex {
        /// Pattern as supplied
        pattern: String,
        /// Compilation failure
        reason: String,
    },

    /// Credentials rejected by the transport
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Operation requires a live transport
    #[error("Session is not connected")]
    NotConnected,

    /// Operation requires an authenticated session
    #[error("Session is not authenticated")]
    NotAuthenticated,

    /// `end()` called without a matching `begin()`
    #[error("No batch in progress")]
    NotInBatch,

    /// Channel or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_refused_error() {
        let err = Error::ConnectionRefused {
            host: "example.org".to_string(),
            port: 22,
            reason: "no route to host".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Connection refused by example.org:22: no route to host"
        );
    }

    #[test]
    fn test_bad_fingerprint_error() {
        let err = Error::BadFingerprint {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(err.to_string(), "Bad fingerprint: expected aa, got bb");
    }

    #[test]
    fn test_timeout_error() {
        let err = Error::Timeout(5000);
        assert_eq!(err.to_string(), "Timed out waiting for output after 5000ms");
    }

    #[test]
    fn test_regex_error() {
        let err = Error::Regex {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid pattern '(': unclosed group");
    }

    #[test]
    fn test_state_errors() {
        assert_eq!(Error::NotConnected.to_string(), "Session is not connected");
        assert_eq!(
            Error::NotAuthenticated.to_string(),
            "Session is not authenticated"
        );
        assert_eq!(Error::NotInBatch.to_string(), "No batch in progress");
    }

    #[test]
    fn test_authentication_failed_error() {
        let err = Error::AuthenticationFailed("password rejected".to_string());
        assert_eq!(err.to_string(), "Authentication failed: password rejected");
    }

    #[test]
    fn test_transport_error() {
        let err = Error::Transport("channel closed".to_string());
        assert_eq!(err.to_string(), "Transport error: channel closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_every_variant_has_a_producer() {
        // Exhaustive on purpose: a new variant must get a producer and a case here
        fn kind(err: &Error) -> &'static str {
            match err {
                Error::ConnectionRefused { .. } => "connect",
                Error::BadFingerprint { .. } => "verify",
                Error::Timeout(_) => "collect",
                Error::Regex { .. } => "pattern",
                Error::AuthenticationFailed(_) => "auth",
                Error::NotConnected | Error::NotAuthenticated | Error::NotInBatch => "state",
                Error::Transport(_) | Error::Io(_) => "transport",
                Error::Config(_) => "config",
            }
        }
        assert_eq!(kind(&Error::Timeout(1)), "collect");
        assert_eq!(kind(&Error::NotInBatch), "state");
        assert_eq!(kind(&Error::Config(String::new())), "config");
    }

    #[test]
    fn test_config_error() {
        let err = Error::Config("connection.port must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: connection.port must be > 0"
        );
    }
}
