//! Koha client
//!
//! A [`Session`] carries exactly one protocol request:
//! `Idle -> Sent -> (Succeeded | Failed)`. Every failure is returned as a
//! [`ClientError`]; nothing is retried.

mod error;

pub use error::{ClientError, ClientResult, FailureKind};

use crate::config::ClientConfig;
use crate::digest::{Digest, Hasher};
use crate::protocol::{validate_package_name, PackageRecord, Request, VersionInfo, DIGEST_HEADER};
use reqwest::{StatusCode, Url};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Base URL of the server
    pub server: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Deadline for a whole request, body included
    pub timeout: Duration,
}

impl From<&ClientConfig> for ClientSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            server: config.server.clone(),
            token: config.token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct Fetched {
    pub path: PathBuf,
    pub digest: Digest,
    pub size: u64,
}

/// HTTP client for a Koha server
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl Client {
    pub fn new(settings: ClientSettings) -> ClientResult<Self> {
        let base = Url::parse(&settings.server).map_err(|e| {
            ClientError::InvalidRequest(format!("server URL {:?}: {}", settings.server, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidRequest(format!(
                "cannot use {} as a base URL",
                base
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| ClientError::InvalidRequest(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base,
            token: settings.token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Start a new single-request session
    pub fn session(&self) -> Session<'_> {
        Session {
            client: self,
            state: SessionState::Idle,
        }
    }

    pub async fn touch(&self) -> ClientResult<()> {
        self.session().touch().await
    }

    pub async fn list(&self) -> ClientResult<Vec<PackageRecord>> {
        self.session().list().await
    }

    pub async fn fetch(&self, name: &str, dest_dir: &Path) -> ClientResult<Fetched> {
        self.session().fetch(name, dest_dir).await
    }

    pub async fn version(&self) -> ClientResult<String> {
        self.session().version().await
    }

    fn url_for(&self, request: &Request) -> ClientResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidRequest(format!("cannot use {} as a base URL", self.base))
            })?
            .pop_if_empty()
            .extend(request.path_segments());
        Ok(url)
    }

    async fn send(&self, request: &Request) -> ClientResult<reqwest::Response> {
        let url = self.url_for(request)?;
        log::debug!("GET {}", url);
        let mut builder = self.http.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder.send().await?)
    }
}

/// Session lifecycle.
///
/// `Idle -> Sent -> Succeeded | Failed`. A session whose request future is
/// dropped before completing (abandoned, or cut off by an outer timeout)
/// stays in `Sent` and cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Request issued, no outcome recorded
    Sent,
    Succeeded,
    Failed(FailureKind),
}

/// One protocol exchange
pub struct Session<'a> {
    client: &'a Client,
    state: SessionState,
}

impl Session<'_> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Liveness check
    pub async fn touch(&mut self) -> ClientResult<()> {
        self.begin()?;
        let result = self.touch_inner().await;
        self.finish(result)
    }

    /// Catalog listing, sorted by name
    pub async fn list(&mut self) -> ClientResult<Vec<PackageRecord>> {
        self.begin()?;
        let result = self.list_inner().await;
        self.finish(result)
    }

    /// Fetch `name` into `dest_dir/name`.
    ///
    /// The body is streamed into a temporary file next to the destination
    /// and hashed on the way. It only replaces the destination once the
    /// digest matches; otherwise the temporary file is removed.
    pub async fn fetch(&mut self, name: &str, dest_dir: &Path) -> ClientResult<Fetched> {
        self.begin()?;
        if let Err(e) = validate_package_name(name) {
            return self.finish(Err(ClientError::InvalidRequest(e.to_string())));
        }
        let result = self.fetch_inner(name, dest_dir).await;
        self.finish(result)
    }

    /// Server version string
    pub async fn version(&mut self) -> ClientResult<String> {
        self.begin()?;
        let result = self.version_inner().await;
        self.finish(result)
    }

    async fn touch_inner(&mut self) -> ClientResult<()> {
        let response = self.send(Request::Touch).await?;
        expect_ok(&response)?;
        Ok(())
    }

    async fn list_inner(&mut self) -> ClientResult<Vec<PackageRecord>> {
        let response = self.send(Request::List).await?;
        expect_ok(&response)?;
        Ok(response.json::<Vec<PackageRecord>>().await?)
    }

    async fn version_inner(&mut self) -> ClientResult<String> {
        let response = self.send(Request::Version).await?;
        expect_ok(&response)?;
        Ok(response.json::<VersionInfo>().await?.version)
    }

    async fn fetch_inner(&mut self, name: &str, dest_dir: &Path) -> ClientResult<Fetched> {
        let request = Request::Fetch {
            name: name.to_string(),
        };
        let mut response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::PackageNotFound(name.to_string()));
        }
        expect_ok(&response)?;

        let expected = response
            .headers()
            .get(DIGEST_HEADER)
            .ok_or_else(|| ClientError::Protocol(format!("missing {} header", DIGEST_HEADER)))?
            .to_str()
            .map_err(|e| ClientError::Protocol(format!("{} header: {}", DIGEST_HEADER, e)))?;
        let expected = Digest::from_hex(expected)
            .map_err(|e| ClientError::Protocol(format!("{} header: {}", DIGEST_HEADER, e)))?;

        let mut file = tempfile::Builder::new()
            .prefix(".mochi-")
            .suffix(".part")
            .tempfile_in(dest_dir)?;
        let mut hasher = Hasher::new();
        let mut size = 0u64;
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk)?;
            size += chunk.len() as u64;
        }
        file.as_file().sync_all()?;

        let actual = hasher.finalize();
        if actual != expected {
            log::warn!("Discarding {}: digest {} != {}", name, actual, expected);
            return Err(ClientError::IntegrityMismatch {
                name: name.to_string(),
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let path = dest_dir.join(name);
        file.persist(&path).map_err(|e| ClientError::Io(e.error))?;
        log::info!("Fetched {} ({} bytes) to {:?}", name, size, path);
        Ok(Fetched {
            path,
            digest: actual,
            size,
        })
    }

    fn begin(&mut self) -> ClientResult<()> {
        if self.state != SessionState::Idle {
            return Err(ClientError::InvalidRequest(format!(
                "session already used ({:?})",
                self.state
            )));
        }
        Ok(())
    }

    async fn send(&mut self, request: Request) -> ClientResult<reqwest::Response> {
        self.state = SessionState::Sent;
        self.client.send(&request).await
    }

    fn finish<T>(&mut self, result: ClientResult<T>) -> ClientResult<T> {
        self.state = match &result {
            Ok(_) => SessionState::Succeeded,
            Err(e) => SessionState::Failed(e.kind()),
        };
        result
    }
}

fn expect_ok(response: &reqwest::Response) -> ClientResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ClientError::Protocol(format!("server replied with {}", status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &str) -> Client {
        Client::new(ClientSettings {
            server: server.to_string(),
            token: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_url_for_requests() {
        let client = client("http://127.0.0.1:8080");
        assert_eq!(
            client.url_for(&Request::Touch).unwrap().as_str(),
            "http://127.0.0.1:8080/touch"
        );
        let fetch = Request::Fetch {
            name: "my tool.zip".to_string(),
        };
        assert_eq!(
            client.url_for(&fetch).unwrap().as_str(),
            "http://127.0.0.1:8080/fetch/my%20tool.zip"
        );
    }

    #[test]
    fn test_url_for_with_prefix() {
        let client = client("http://host:8080/koha/");
        assert_eq!(
            client.url_for(&Request::List).unwrap().as_str(),
            "http://host:8080/koha/list"
        );
    }

    #[test]
    fn test_bad_server_url() {
        let result = Client::new(ClientSettings {
            server: "not a url".to_string(),
            token: None,
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_empty_name_rejected_before_sending() {
        // Nothing listens on this address; a request would be Unreachable.
        let client = client("http://127.0.0.1:9");
        let dir = tempfile::TempDir::new().unwrap();
        let mut session = client.session();

        let result = session.fetch("   ", dir.path()).await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
        assert_eq!(session.state(), SessionState::Failed(FailureKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let client = client("http://127.0.0.1:9");
        let dir = tempfile::TempDir::new().unwrap();
        let mut session = client.session();
        assert_eq!(session.state(), SessionState::Idle);

        let _ = session.fetch("", dir.path()).await;
        let again = session.touch().await;
        assert!(matches!(again, Err(ClientError::InvalidRequest(_))));
        assert_eq!(session.state(), SessionState::Failed(FailureKind::InvalidRequest));
    }
}
