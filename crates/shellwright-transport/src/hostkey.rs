//! Host public key parsing and digests.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use shellwright_core::{Error, HashAlgorithm, Result};

/// Read the key blob from an OpenSSH public key file.
pub fn read_public_key_blob<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::Transport(format!(
            "Failed to read host key {}: {e}",
            path.as_ref().display()
        ))
    })?;
    parse_public_key_blob(&content)
}

/// Decode the key blob from an OpenSSH public key line.
///
/// The line has the form `<type> <base64 blob> [comment]`.
pub fn parse_public_key_blob(line: &str) -> Result<Vec<u8>> {
    let mut fields = line.split_whitespace();
    let _key_type = fields
        .next()
        .ok_or_else(|| Error::Transport("Host key is empty".to_string()))?;
    let encoded = fields
        .next()
        .ok_or_else(|| Error::Transport("Host key has no key data".to_string()))?;

    STANDARD
        .decode(encoded)
        .map_err(|e| Error::Transport(format!("Invalid host key encoding: {e}")))
}

/// Digest a key blob.
pub fn digest(algorithm: HashAlgorithm, blob: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Md5 => Md5::digest(blob).to_vec(),
        HashAlgorithm::Sha1 => Sha1::digest(blob).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(blob).to_vec(),
    }
}
