//! Response body for fetched packages
//!
//! Sends the package content in fixed-size frames. If the body is dropped
//! before every frame was handed to the connection, the client went away
//! mid-transfer; that is logged and nothing else happens.
//!
//! Content of at most [`FRAME_SIZE`] bytes goes out in a single frame, so
//! once that frame is handed over the body is complete. A client dropping
//! such a transfer after that point is not reported.

use crate::catalog::Package;
use axum::body::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Frame size for package bodies
pub const FRAME_SIZE: usize = 64 * 1024;

pub struct PackageBody {
    package: Arc<Package>,
    offset: usize,
}

impl PackageBody {
    pub fn new(package: Arc<Package>) -> Self {
        Self { package, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.package.content.len() - self.offset
    }
}

impl Body for PackageBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.remaining() == 0 {
            return Poll::Ready(None);
        }
        let end = (this.offset + FRAME_SIZE).min(this.package.content.len());
        let chunk = Bytes::copy_from_slice(&this.package.content[this.offset..end]);
        this.offset = end;
        Poll::Ready(Some(Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining() == 0
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining() as u64)
    }
}

impl Drop for PackageBody {
    fn drop(&mut self) {
        if self.remaining() > 0 {
            log::warn!(
                "Transfer of {} aborted after {} of {} bytes",
                self.package.name,
                self.offset,
                self.package.content.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest;
    use chrono::Utc;

    fn package(content: Vec<u8>) -> Arc<Package> {
        Arc::new(Package {
            name: "pkg".to_string(),
            digest: digest::hash(&content),
            content,
            published_at: Utc::now(),
        })
    }

    async fn next_frame(body: &mut PackageBody) -> Option<Bytes> {
        let frame = std::future::poll_fn(|cx| Pin::new(&mut *body).poll_frame(cx)).await?;
        frame.ok().and_then(|f| f.into_data().ok())
    }

    #[tokio::test]
    async fn test_frames_cover_content() {
        let content: Vec<u8> = (0..=255u8).cycle().take(2 * FRAME_SIZE + 5).collect();
        let mut body = PackageBody::new(package(content.clone()));
        assert_eq!(body.size_hint().exact(), Some(content.len() as u64));

        let first = next_frame(&mut body).await.unwrap();
        assert_eq!(first.len(), FRAME_SIZE);
        assert_eq!(body.size_hint().exact(), Some((FRAME_SIZE + 5) as u64));
        assert!(!body.is_end_stream());

        let mut received = first.to_vec();
        while let Some(chunk) = next_frame(&mut body).await {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, content);
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn test_small_body_is_one_frame() {
        let mut body = PackageBody::new(package(b"hello".to_vec()));
        assert_eq!(next_frame(&mut body).await.unwrap(), &b"hello"[..]);
        assert!(body.is_end_stream());
        assert!(next_frame(&mut body).await.is_none());
    }
}
