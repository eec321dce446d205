use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ShelterError;
use crate::cache::{PartitionRole, PartitionSet};
use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = concat!("shelter/", env!("CARGO_PKG_VERSION"));

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Origin (and scope) every relative path is resolved against
    pub origin: Url,

    /// Leading segment of every partition name
    pub cache_prefix: String,

    /// Version token shared by all partition names
    pub version: String,

    /// Paths fetched and stored at install time, matched exactly
    pub static_files: Vec<String>,

    /// Substrings that mark a URL as an image
    pub image_patterns: Vec<String>,

    /// Substrings that mark a URL as network-first
    pub network_first_patterns: Vec<String>,

    /// Static path served when a page navigation cannot be answered
    pub root_document: String,

    /// Activate right after install instead of waiting for SKIP_WAITING
    pub skip_waiting: bool,

    /// Tag of the sync trigger that refreshes the dynamic partition
    pub sync_tag: String,

    /// Maximum concurrent fetches during a background refresh
    pub sync_concurrency: usize,

    /// Body of the generic offline response
    pub offline_message: String,

    /// Optional byte limits for the in-memory partitions
    pub limits: PartitionLimits,

    pub notification: NotificationConfig,

    pub http: HttpConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:8080/").expect("valid default origin"),
            cache_prefix: "white-plus".to_owned(),
            version: "v1.0.0".to_owned(),
            static_files: [
                "/",
                "/index.html",
                "/style.css",
                "/app.js",
                "/manifest.json",
                "img/logoprincipal.webp",
                "img/strim.jpg",
            ]
            .map(String::from)
            .to_vec(),
            image_patterns: ["img/", ".jpg", ".jpeg", ".png", ".webp", ".gif", ".svg"]
                .map(String::from)
                .to_vec(),
            network_first_patterns: ["/api/", "https://pay.kirvano.com/", "https://wa.me/"]
                .map(String::from)
                .to_vec(),
            root_document: "/index.html".to_owned(),
            skip_waiting: true,
            sync_tag: "background-sync".to_owned(),
            sync_concurrency: 4,
            offline_message: "Offline - content not available".to_owned(),
            limits: PartitionLimits::default(),
            notification: NotificationConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> crate::builder::EngineConfigBuilder {
        crate::builder::EngineConfigBuilder::new()
    }

    /// The partition names of this version
    pub fn partition_set(&self) -> PartitionSet {
        PartitionSet::new(&self.cache_prefix, &self.version)
    }

    /// Resolve a path or URL against the origin
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }

    /// Check the values a running engine depends on
    pub fn validate(&self) -> Result<(), ShelterError> {
        if self.origin.cannot_be_a_base() || self.origin.host().is_none() {
            return Err(ShelterError::Config(format!(
                "origin must be an absolute http(s) URL, got {}",
                self.origin
            )));
        }
        if self.cache_prefix.trim().is_empty() {
            return Err(ShelterError::Config("cache_prefix must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ShelterError::Config("version must not be empty".into()));
        }
        if self.sync_concurrency == 0 {
            return Err(ShelterError::Config(
                "sync_concurrency must be greater than zero".into(),
            ));
        }
        if self.limits.dynamic_max_bytes == Some(0) || self.limits.image_max_bytes == Some(0) {
            return Err(ShelterError::Config(
                "partition limits must be greater than zero".into(),
            ));
        }
        for path in self.static_files.iter().chain([&self.root_document]) {
            self.resolve(path).map_err(|e| {
                ShelterError::Config(format!("invalid static path {path:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Byte limits for in-memory partitions. The static partition is never bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionLimits {
    pub dynamic_max_bytes: Option<u64>,
    pub image_max_bytes: Option<u64>,
}

impl PartitionLimits {
    pub fn for_role(&self, role: PartitionRole) -> Option<u64> {
        match role {
            PartitionRole::Static => None,
            PartitionRole::Dynamic => self.dynamic_max_bytes,
            PartitionRole::Image => self.image_max_bytes,
        }
    }
}

/// Contents of the notification shown on a push event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    /// Body used when the push carries no payload
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub image: Option<String>,
    pub vibrate: Vec<u32>,
    /// URL opened by the "open" action
    pub open_url: String,
    pub open_title: String,
    pub close_title: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "White Plus".to_owned(),
            default_body: "New update available!".to_owned(),
            icon: "img/logoprincipal.webp".to_owned(),
            badge: "img/logoprincipal.webp".to_owned(),
            image: Some("img/strim.jpg".to_owned()),
            vibrate: vec![200, 100, 200],
            open_url: "/".to_owned(),
            open_title: "Open White Plus".to_owned(),
            close_title: "Close".to_owned(),
        }
    }
}

/// Upstream HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall request timeout in seconds, 0 disables it
    pub timeout_secs: u64,

    /// Connection timeout in seconds, 0 disables it
    pub connect_timeout_secs: u64,

    /// Idle pooled connection timeout in seconds, 0 disables it
    pub pool_idle_timeout_secs: u64,

    pub follow_redirects: bool,

    pub user_agent: String,

    /// Extra headers sent with every upstream request
    pub headers: BTreeMap<String, String>,

    /// Explicit outbound proxy, overrides the system proxy
    pub proxy: Option<ProxyConfig>,

    pub use_system_proxy: bool,

    /// Requests slower than this are logged, 0 disables it
    pub slow_request_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: 90,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: BTreeMap::new(),
            proxy: None,
            use_system_proxy: true,
            slow_request_ms: 1000,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn slow_request_threshold(&self) -> Option<Duration> {
        (self.slow_request_ms > 0).then(|| Duration::from_millis(self.slow_request_ms))
    }

    /// Default headers merged with the configured ones.
    ///
    /// Configured headers take precedence; invalid names or values are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid configured header"),
            }
        }
        headers
    }
}
