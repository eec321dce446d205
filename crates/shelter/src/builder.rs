//! # Builder for EngineConfig
//!
//! This module provides a builder pattern implementation for creating and customizing
//! EngineConfig instances with a fluent API.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use shelter_engine::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .with_origin("https://white.plus/")
//!     .with_version("v2.0.0")
//!     .with_static_file("/offline.html")
//!     .with_timeout(Duration::from_secs(15))
//!     .with_header("X-Client", "shelter")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.version, "v2.0.0");
//! ```

use std::time::Duration;

use crate::cache::PartitionRole;
use crate::config::NotificationConfig;
use crate::proxy::ProxyConfig;
use crate::{EngineConfig, ShelterError};

/// Builder for creating EngineConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
    origin: Option<String>,
}

impl EngineConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            origin: None,
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            origin: None,
        }
    }

    /// Set the origin every relative path is resolved against
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the shared partition version token
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the leading segment of partition names
    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.cache_prefix = prefix.into();
        self
    }

    /// Replace the static-file allow-list
    pub fn with_static_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.static_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Add one path to the static-file allow-list
    pub fn with_static_file(mut self, file: impl Into<String>) -> Self {
        self.config.static_files.push(file.into());
        self
    }

    /// Replace the image substrings
    pub fn with_image_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.image_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the network-first substrings
    pub fn with_network_first_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.network_first_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_root_document(mut self, path: impl Into<String>) -> Self {
        self.config.root_document = path.into();
        self
    }

    /// Whether a freshly installed version activates without waiting
    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.config.skip_waiting = skip_waiting;
        self
    }

    pub fn with_sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.sync_tag = tag.into();
        self
    }

    pub fn with_sync_concurrency(mut self, concurrency: usize) -> Self {
        self.config.sync_concurrency = concurrency;
        self
    }

    pub fn with_offline_message(mut self, message: impl Into<String>) -> Self {
        self.config.offline_message = message.into();
        self
    }

    /// Bound an in-memory partition. Limits on the static role are ignored.
    pub fn with_partition_limit(mut self, role: PartitionRole, max_bytes: u64) -> Self {
        match role {
            PartitionRole::Static => {}
            PartitionRole::Dynamic => self.config.limits.dynamic_max_bytes = Some(max_bytes),
            PartitionRole::Image => self.config.limits.image_max_bytes = Some(max_bytes),
        }
        self
    }

    pub fn with_notification(mut self, notification: NotificationConfig) -> Self {
        self.config.notification = notification;
        self
    }

    /// Set the overall timeout for upstream requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the connection timeout for upstream requests
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.connect_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every upstream request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.http.headers.insert(name.into(), value.into());
        self
    }

    /// Set the outbound proxy
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.http.proxy = Some(proxy);
        self.config.http.use_system_proxy = false; // Explicit proxy overrides system proxy
        self
    }

    /// Set whether to use system proxy settings if available
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        // Only set system proxy if no explicit proxy is configured
        if self.config.http.proxy.is_none() {
            self.config.http.use_system_proxy = use_system_proxy;
        }
        self
    }

    /// Log upstream requests slower than this
    pub fn with_slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.config.http.slow_request_ms = threshold.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Build and validate the EngineConfig instance
    pub fn build(mut self) -> Result<EngineConfig, ShelterError> {
        if let Some(origin) = self.origin {
            self.config.origin = url::Url::parse(&origin)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyAuth, ProxyType};

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfigBuilder::new().build().unwrap();
        assert_eq!(config.version, "v1.0.0");
        assert_eq!(config.sync_tag, "background-sync");
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert!(config.http.use_system_proxy);
    }

    #[test]
    fn test_builder_customization() {
        let config = EngineConfigBuilder::new()
            .with_origin("https://white.plus/")
            .with_version("v2")
            .with_static_files(["/", "/index.html"])
            .with_static_file("/offline.html")
            .with_image_patterns([".avif"])
            .with_network_first_patterns(["/graphql"])
            .with_sync_concurrency(2)
            .with_partition_limit(PartitionRole::Image, 1024)
            .with_partition_limit(PartitionRole::Static, 1)
            .with_timeout(Duration::from_secs(5))
            .with_header("X-Site", "white-plus")
            .build()
            .unwrap();

        assert_eq!(config.origin.as_str(), "https://white.plus/");
        assert_eq!(config.static_files, vec!["/", "/index.html", "/offline.html"]);
        assert_eq!(config.image_patterns, vec![".avif"]);
        assert_eq!(config.network_first_patterns, vec!["/graphql"]);
        assert_eq!(config.sync_concurrency, 2);
        assert_eq!(config.limits.image_max_bytes, Some(1024));
        assert_eq!(config.limits.for_role(PartitionRole::Static), None);
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.headers["X-Site"], "white-plus");
    }

    #[test]
    fn test_builder_rejects_bad_origin() {
        let result = EngineConfigBuilder::new().with_origin("not a url").build();
        assert!(matches!(result, Err(ShelterError::UrlError(_))));

        let result = EngineConfigBuilder::new().with_sync_concurrency(0).build();
        assert!(matches!(result, Err(ShelterError::Config(_))));
    }

    #[test]
    fn test_proxy_configuration() {
        let proxy_config = ProxyConfig {
            url: "http://proxy.example.com:8080".to_string(),
            proxy_type: ProxyType::Http,
            auth: Some(ProxyAuth {
                username: "user".to_string(),
                password: "pass".to_string(),
            }),
        };

        let config = EngineConfigBuilder::new()
            .with_proxy(proxy_config.clone())
            .with_system_proxy(true)
            .build()
            .unwrap();

        assert_eq!(config.http.proxy, Some(proxy_config));
        assert!(!config.http.use_system_proxy);
    }
}
