//! Content digests
//!
//! Packages are identified on the wire by the SHA-1 of their content,
//! hex-encoded as 40 lowercase characters.

use sha1::{Digest as _, Sha1};
use std::fmt;
use thiserror::Error;

/// Length of a digest in raw bytes
pub const DIGEST_LEN: usize = 20;

/// Length of a digest in hex characters
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// Digest parsing errors
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("invalid digest hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid digest length: {0} (expected 40 hex chars)")]
    Length(usize),
}

/// SHA-1 content digest (20 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Create digest from raw bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string (either case)
    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::Length(s.len()));
        }
        let mut arr = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Digest(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Compute the digest of `data`
pub fn hash(data: &[u8]) -> Digest {
    Digest(Sha1::digest(data).into())
}

/// Check `data` against a hex digest, ignoring case.
///
/// A malformed `expected` never matches.
pub fn verify(data: &[u8], expected: &str) -> bool {
    match Digest::from_hex(expected) {
        Ok(expected) => hash(data) == expected,
        Err(_) => false,
    }
}

/// Incremental digest for streamed content
#[derive(Default)]
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finalize(self) -> Digest {
        Digest(self.inner.finalize().into())
    }
}
