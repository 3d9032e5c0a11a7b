//! Koha: a minimal package-distribution server and client
//!
//! The server hosts a flat catalog of named files. The client can ping
//! the server, list the catalog and fetch a package by name; every fetch
//! is checked against the SHA-1 digest the server advertises.

pub mod catalog;
pub mod client;
pub mod config;
pub mod digest;
pub mod protocol;
pub mod server;

pub use catalog::{Catalog, CatalogError, Package};
pub use client::{Client, ClientError, ClientSettings, Session};
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use digest::Digest;
pub use protocol::{AccessPolicy, PackageRecord, Request};
pub use server::Server;
