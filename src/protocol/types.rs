//! Protocol wire types and constants

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response header carrying the hex digest of a fetched package
pub const DIGEST_HEADER: &str = "X-Content-Digest";

pub const TOUCH_PATH: &str = "touch";
pub const LIST_PATH: &str = "list";
pub const FETCH_PATH: &str = "fetch";
pub const VERSION_PATH: &str = "version";

/// Protocol version reported by `/version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One catalog entry as sent by `/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    /// Lowercase hex SHA-1 of the content
    pub digest: String,
    /// Content length in bytes
    pub size: u64,
}

/// Body of `/version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Package name validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("package name is empty")]
    Empty,

    #[error("package name {0:?} contains a path separator")]
    PathSeparator(String),

    #[error("package name {0:?} is reserved")]
    Reserved(String),
}

/// Validate a package name.
///
/// Names double as file names on the client, so they must be a single
/// non-empty path component.
pub fn validate_package_name(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(NameError::PathSeparator(name.to_string()));
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved(name.to_string()));
    }
    Ok(())
}
