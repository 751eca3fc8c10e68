//! Host fingerprint flags and comparison.

use serde::{Deserialize, Serialize};

/// Digest algorithm applied to the host key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5 digest (16 bytes)
    #[default]
    Md5,
    /// SHA-1 digest (20 bytes)
    Sha1,
    /// SHA-256 digest (32 bytes)
    Sha256,
}

impl std::str::FromStr for HashAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(crate::Error::Config(format!(
                "unknown hash algorithm: {other}"
            ))),
        }
    }
}

/// How the digest is rendered for comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintEncoding {
    /// Lowercase hexadecimal
    #[default]
    Hex,
    /// Digest bytes as-is
    Raw,
}

/// Algorithm and encoding used to query and compare a fingerprint.
///
/// Defaults to an MD5 digest rendered as hex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintFlags {
    /// Digest algorithm
    pub algorithm: HashAlgorithm,
    /// Rendering of the digest
    pub encoding: FingerprintEncoding,
}

impl FingerprintFlags {
    /// Create flags for the given algorithm and encoding.
    pub fn new(algorithm: HashAlgorithm, encoding: FingerprintEncoding) -> Self {
        Self {
            algorithm,
            encoding,
        }
    }

    /// Render a digest for display and error reporting.
    pub fn render(&self, digest: &[u8]) -> String {
        match self.encoding {
            FingerprintEncoding::Hex => hex::encode(digest),
            FingerprintEncoding::Raw => String::from_utf8_lossy(digest).into_owned(),
        }
    }

    /// Compare a digest against an expected fingerprint, ignoring ASCII case.
    ///
    /// For hex encoding, `:` separators in `expected` are ignored so the
    /// `aa:bb:cc` form printed by ssh tooling is accepted.
    pub fn matches(&self, digest: &[u8], expected: &str) -> bool {
        match self.encoding {
            FingerprintEncoding::Hex => {
                let expected: String = expected.chars().filter(|c| *c != ':').collect();
                hex::encode(digest).eq_ignore_ascii_case(&expected)
            }
            FingerprintEncoding::Raw => digest.eq_ignore_ascii_case(expected.as_bytes()),
        }
    }
}
