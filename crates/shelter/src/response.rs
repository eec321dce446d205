//! # Responses
//!
//! Responses handed back to the host and the immutable snapshots kept in
//! cache partitions.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback,
}

/// A response produced for an intercepted request
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl ProxyResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, source: ResponseSource) -> Self {
        Self {
            status,
            headers,
            body,
            source,
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Snapshot this response for storage.
    ///
    /// Returns `None` for non-success statuses, which are never stored.
    pub fn snapshot(&self) -> Option<StoredResponse> {
        if !self.is_success() {
            return None;
        }

        Some(StoredResponse::new(
            self.status,
            self.headers.clone(),
            self.body.clone(),
        ))
    }
}

/// Immutable snapshot of a successful response
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Seconds since the unix epoch
    pub cached_at: u64,
}

impl StoredResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Size of the snapshot body in bytes
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn into_response(self, source: ResponseSource) -> ProxyResponse {
        ProxyResponse::new(self.status, self.headers, self.body, source)
    }

    /// Flatten the headers into name/value pairs, dropping non-UTF-8 values
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect()
    }

    /// Rebuild a header map from name/value pairs, skipping invalid entries
    pub fn headers_from_pairs(pairs: &[(String, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_only_for_success() {
        let ok = ProxyResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"ok"),
            ResponseSource::Network,
        );
        assert!(ok.snapshot().is_some());

        let missing = ProxyResponse::new(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            Bytes::new(),
            ResponseSource::Network,
        );
        assert!(missing.snapshot().is_none());
    }

    #[test]
    fn test_header_pairs_preserve_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
        let stored = StoredResponse::new(StatusCode::OK, headers, Bytes::new());

        let rebuilt = StoredResponse::headers_from_pairs(&stored.header_pairs());
        assert_eq!(rebuilt.get_all("set-cookie").iter().count(), 2);
        assert_eq!(rebuilt.get(CONTENT_TYPE).unwrap(), "text/css");
    }
}
