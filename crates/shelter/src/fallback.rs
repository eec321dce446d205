//! # Offline Fallback
//!
//! Substitute responses for requests that neither the network nor the cache
//! could answer. Nothing produced here is ever stored.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use crate::cache::{PartitionCache, PartitionRole};
use crate::request::{Destination, ProxyRequest, RequestKey};
use crate::response::{ProxyResponse, ResponseSource};

/// Placeholder graphic returned for images while offline
pub const OFFLINE_SVG: &str = r##"<svg width="200" height="150" xmlns="http://www.w3.org/2000/svg"><rect fill="#ddd" width="200" height="150"/><text x="50%" y="50%" text-anchor="middle" dy=".3em" fill="#999">Offline</text></svg>"##;

#[derive(Clone)]
pub struct OfflineFallback {
    cache: PartitionCache,
    root_document: RequestKey,
    offline_message: Bytes,
}

impl OfflineFallback {
    pub fn new(cache: PartitionCache, root_document: &Url, offline_message: impl Into<String>) -> Self {
        Self {
            cache,
            root_document: RequestKey::get(root_document),
            offline_message: Bytes::from(offline_message.into()),
        }
    }

    /// Pick a fallback by destination.
    ///
    /// Documents get the root page from the static partition, or nothing if
    /// install never stored it.
    pub async fn respond(&self, request: &ProxyRequest) -> Option<ProxyResponse> {
        match request.destination {
            Destination::Document => {
                let root = self
                    .cache
                    .lookup(PartitionRole::Static, &self.root_document)
                    .await;
                if root.is_none() {
                    tracing::warn!(url = %request.url, "Root document not cached, no document fallback");
                }
                root.map(|stored| stored.into_response(ResponseSource::Fallback))
            }
            Destination::Image => Some(Self::image_placeholder()),
            _ => Some(self.unavailable()),
        }
    }

    /// A freshly generated SVG placeholder
    pub fn image_placeholder() -> ProxyResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
        ProxyResponse::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(OFFLINE_SVG.as_bytes()),
            ResponseSource::Fallback,
        )
    }

    /// Generic 503 with the configured offline message
    pub fn unavailable(&self) -> ProxyResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        ProxyResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            headers,
            self.offline_message.clone(),
            ResponseSource::Fallback,
        )
    }
}
