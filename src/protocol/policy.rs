//! Capability check applied to every request before dispatch

use super::Request;

/// Decides whether a request may be served.
///
/// `token` is the bearer token from the `Authorization` header, if any.
pub trait AccessPolicy: Send + Sync {
    fn permits(&self, request: &Request, token: Option<&str>) -> bool;
}

/// Policy that admits every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn permits(&self, _request: &Request, _token: Option<&str>) -> bool {
        true
    }
}

impl<F> AccessPolicy for F
where
    F: Fn(&Request, Option<&str>) -> bool + Send + Sync,
{
    fn permits(&self, request: &Request, token: Option<&str>) -> bool {
        self(request, token)
    }
}
