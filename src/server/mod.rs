//! Koha HTTP server
//!
//! Serves the catalog over the transfer protocol. Each request runs on its
//! own tokio task.

mod body;
mod error;
mod handler;

pub use body::FRAME_SIZE;
pub use error::ApiError;
pub use handler::{dispatch, router, AppState};

use crate::catalog::Catalog;
use crate::protocol::{AccessPolicy, AllowAll};
use axum::Router;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Koha server
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server over `catalog` that admits every request
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            state: AppState {
                catalog,
                policy: Arc::new(AllowAll),
            },
        }
    }

    /// Replace the access policy
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.state.policy = policy;
        self
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind `bind_addr` and serve until `shutdown` resolves
    pub async fn run<F>(self, bind_addr: &str, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(bind_addr).await?;
        log::info!("Koha server listening on {}", listener.local_addr()?);
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        log::info!("Serving {} package(s)", self.state.catalog.len());
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
