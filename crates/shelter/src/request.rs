//! # Requests
//!
//! Intercepted requests and the canonical keys used to store their responses.

use std::fmt;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use url::Url;

/// Header carrying the fetch destination of a browser request
pub const SEC_FETCH_DEST: HeaderName = HeaderName::from_static("sec-fetch-dest");

/// What the page expects to do with the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Destination {
    /// A full page navigation
    Document,
    /// An image element or CSS image
    Image,
    Script,
    Style,
    Font,
    Manifest,
    /// fetch()/XHR and anything not covered above
    #[default]
    Empty,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` value. Unknown values map to `Empty`.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "image" => Self::Image,
            "script" => Self::Script,
            "style" => Self::Style,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            _ => Self::Empty,
        }
    }

    /// Derive the destination from request headers.
    ///
    /// `Sec-Fetch-Dest` wins when present; otherwise the `Accept` header is
    /// inspected for HTML or image media types.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some(dest) = headers.get(SEC_FETCH_DEST).and_then(|v| v.to_str().ok()) {
            return Self::from_fetch_dest(dest);
        }

        match headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
            Some(accept) if accept.contains("text/html") => Self::Document,
            Some(accept) if accept.starts_with("image/") => Self::Image,
            _ => Self::Empty,
        }
    }
}

/// Canonical key of a stored response: method plus absolute URL without fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_owned(),
            url: url.into(),
        }
    }

    /// Key for a GET of the given URL
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    /// Rebuild a GET request for this key
    pub fn to_request(&self) -> Result<ProxyRequest, url::ParseError> {
        Ok(ProxyRequest::get(Url::parse(&self.url)?))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A request intercepted from a page
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ProxyRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            destination: Destination::default(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_key_strips_fragment_keeps_query() {
        let url = Url::parse("https://example.com/page?x=1#section").unwrap();
        let key = RequestKey::get(&url);
        assert_eq!(key.url, "https://example.com/page?x=1");
        assert_eq!(key.method, "GET");
        assert_eq!(key.to_string(), "GET https://example.com/page?x=1");
    }

    #[test]
    fn test_destination_prefers_fetch_dest() {
        let mut headers = HeaderMap::new();
        headers.insert(SEC_FETCH_DEST, HeaderValue::from_static("image"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        assert_eq!(Destination::from_headers(&headers), Destination::Image);
    }

    #[test]
    fn test_destination_from_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert_eq!(Destination::from_headers(&headers), Destination::Document);

        headers.insert(ACCEPT, HeaderValue::from_static("image/avif,image/webp"));
        assert_eq!(Destination::from_headers(&headers), Destination::Image);

        assert_eq!(Destination::from_headers(&HeaderMap::new()), Destination::Empty);
    }
}
