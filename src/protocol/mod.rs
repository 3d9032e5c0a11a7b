//! Koha transfer protocol
//!
//! Stateless request/response exchange over HTTP:
//!
//! - `GET /touch`          -> 200, empty body
//! - `GET /list`           -> 200, JSON array of [`PackageRecord`]
//! - `GET /fetch/{name}`   -> 200 + `X-Content-Digest` + raw body, or 404
//! - `GET /version`        -> 200, JSON [`VersionInfo`]

mod policy;
mod types;

pub use policy::{AccessPolicy, AllowAll};
pub use types::*;

/// Protocol requests
///
/// Every route on the server maps onto exactly one variant, and the
/// handler matches on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness check
    Touch,
    /// Full catalog listing
    List,
    /// Download a package by name
    Fetch { name: String },
    /// Server version query
    Version,
}

impl Request {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Touch => "touch",
            Request::List => "list",
            Request::Fetch { .. } => "fetch",
            Request::Version => "version",
        }
    }

    /// Path segments relative to the server base URL
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            Request::Touch => vec![TOUCH_PATH],
            Request::List => vec![LIST_PATH],
            Request::Fetch { name } => vec![FETCH_PATH, name.as_str()],
            Request::Version => vec![VERSION_PATH],
        }
    }
}
