//! Test servers for client integration tests.
//!
//! Each helper binds 127.0.0.1:0, serves in a background task and returns
//! the base URL. Servers run until the test runtime shuts down.

#![allow(dead_code)]

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use koha::protocol::DIGEST_HEADER;
use koha::{digest, Catalog, Server};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Start a real Koha server over `catalog`
pub async fn start(catalog: Arc<Catalog>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = Server::new(catalog)
            .serve(listener, std::future::pending::<()>())
            .await;
    });
    format!("http://{}", addr)
}

/// Start a server that advertises the digest of `content` but sends it
/// with one byte flipped.
pub async fn start_tampering(content: Vec<u8>) -> String {
    let digest = digest::hash(&content).to_hex();
    let mut corrupted = content;
    corrupted[0] ^= 0xFF;

    let app = Router::new().route(
        "/fetch/{name}",
        get(move || {
            let digest = digest.clone();
            let corrupted = corrupted.clone();
            async move { ([(DIGEST_HEADER, digest)], corrupted).into_response() }
        }),
    );
    serve_router(app).await
}

/// Start a server that answers every fetch with 200 but no digest header
pub async fn start_without_digest() -> String {
    let app = Router::new().route("/fetch/{name}", get(|| async { (StatusCode::OK, "hello") }));
    serve_router(app).await
}

/// Start a listener that accepts connections and never answers
pub async fn start_silent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{}", addr)
}

/// Base URL of a port nothing listens on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn settings(server: &str) -> koha::ClientSettings {
    koha::ClientSettings {
        server: server.to_string(),
        token: None,
        timeout: Duration::from_secs(2),
    }
}

async fn serve_router(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}
