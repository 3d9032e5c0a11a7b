//! Request routing and dispatch

use super::body::PackageBody;
use super::error::ApiError;
use crate::catalog::Catalog;
use crate::protocol::{AccessPolicy, Request, VersionInfo, DIGEST_HEADER, VERSION};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub policy: Arc<dyn AccessPolicy>,
}

/// Build the protocol router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/touch", get(touch))
        .route("/list", get(list))
        .route("/fetch/{name}", get(fetch))
        .route("/version", get(version))
        .with_state(state)
}

async fn touch(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    dispatch(&state, Request::Touch, bearer_token(&headers))
}

async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    dispatch(&state, Request::List, bearer_token(&headers))
}

async fn fetch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    dispatch(&state, Request::Fetch { name }, bearer_token(&headers))
}

async fn version(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    dispatch(&state, Request::Version, bearer_token(&headers))
}

/// Check the request against the access policy and serve it
pub fn dispatch(
    state: &AppState,
    request: Request,
    token: Option<&str>,
) -> Result<Response, ApiError> {
    if !state.policy.permits(&request, token) {
        log::warn!("Denied {} request", request.kind());
        return Err(ApiError::Forbidden(request.kind().to_string()));
    }

    log::debug!("Handling {:?}", request);
    match request {
        Request::Touch => Ok(StatusCode::OK.into_response()),
        Request::List => Ok(Json(state.catalog.list().into_records()).into_response()),
        Request::Fetch { name } => {
            let package = state.catalog.resolve(&name).map_err(|e| {
                log::info!("Fetch failed for {:?}: {}", name, e);
                ApiError::from(e)
            })?;
            log::info!("Serving {} ({} bytes, {})", name, package.size(), package.digest);
            let headers = [
                ("content-type", "application/octet-stream".to_string()),
                (DIGEST_HEADER, package.digest.to_hex()),
            ];
            Ok((headers, Body::new(PackageBody::new(package))).into_response())
        }
        Request::Version => Ok(Json(VersionInfo {
            version: VERSION.to_string(),
        })
        .into_response()),
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::body::FRAME_SIZE;
    use crate::digest;
    use crate::protocol::{AllowAll, PackageRecord};
    use axum::body::to_bytes;
    use axum::http;
    use tower::ServiceExt;

    fn state_with(packages: &[(&str, &[u8])]) -> AppState {
        let catalog = Catalog::in_memory();
        for (name, content) in packages {
            catalog.publish(name, content.to_vec()).unwrap();
        }
        AppState {
            catalog: Arc::new(catalog),
            policy: Arc::new(AllowAll),
        }
    }

    fn get_request(uri: &str) -> http::Request<Body> {
        http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_touch_ok_empty() {
        let response = router(state_with(&[])).oneshot(get_request("/touch")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_list_records() {
        let app = router(state_with(&[("tool.zip", &b"hello"[..]), ("a.bin", &b"xy"[..])]));
        let response = app.oneshot(get_request("/list")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let records: Vec<PackageRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a.bin");
        assert_eq!(records[1].name, "tool.zip");
        assert_eq!(records[1].digest, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(records[1].size, 5);
    }

    #[tokio::test]
    async fn test_fetch_body_and_digest_header() {
        let app = router(state_with(&[("tool.zip", &b"hello"[..])]));
        let response = app.oneshot(get_request("/fetch/tool.zip")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let digest_header = response.headers()[DIGEST_HEADER].to_str().unwrap().to_string();
        assert_eq!(digest_header, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert!(digest::verify(&body, &digest_header));
    }

    #[tokio::test]
    async fn test_fetch_large_body_spans_frames() {
        let content: Vec<u8> = (0..=255u8).cycle().take(3 * FRAME_SIZE + 17).collect();
        let app = router(state_with(&[("big.bin", content.as_slice())]));
        let response = app.oneshot(get_request("/fetch/big.bin")).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), content.len());
        assert_eq!(&body[..], &content[..]);
    }

    #[tokio::test]
    async fn test_fetch_unknown_is_bare_404() {
        let app = router(state_with(&[("tool.zip", &b"hello"[..])]));
        let response = app.oneshot(get_request("/fetch/missing.zip")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(DIGEST_HEADER).is_none());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_version() {
        let response = router(state_with(&[])).oneshot(get_request("/version")).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let info: VersionInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.version, VERSION);
    }

    fn touch_or_secret(request: &Request, token: Option<&str>) -> bool {
        matches!(request, Request::Touch) || token == Some("secret")
    }

    #[tokio::test]
    async fn test_policy_denies_request() {
        let mut state = state_with(&[("tool.zip", &b"hello"[..])]);
        state.policy = Arc::new(touch_or_secret);

        let app = router(state.clone());
        let response = app.oneshot(get_request("/fetch/tool.zip")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = http::Request::builder()
            .uri("/fetch/tool.zip")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router(state).oneshot(get_request("/touch")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer 0000".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("0000"));
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
