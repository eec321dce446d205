//! # Network Fetcher
//!
//! The network side of every strategy: a `Fetcher` trait and its reqwest
//! implementation.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HOST, HeaderMap};
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::request::ProxyRequest;
use crate::response::{ProxyResponse, ResponseSource};
use crate::ShelterError;

/// Performs the network fetch for an intercepted request.
///
/// Only transport failures are errors; any HTTP status is a response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, ShelterError>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &HttpConfig) -> Result<Client, ShelterError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(8)
        .user_agent(&config.user_agent)
        .default_headers(config.header_map())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout().is_zero() {
        client_builder = client_builder.timeout(config.timeout());
    }

    if !config.connect_timeout().is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout());
    }

    if !config.pool_idle_timeout().is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.pool_idle_timeout());
    }

    if let Some(proxy_config) = &config.proxy {
        client_builder = client_builder.proxy(proxy_config.to_proxy()?);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured upstream proxy");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings for upstream requests");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Upstream proxy disabled");
    }

    client_builder.build().map_err(ShelterError::from)
}

/// Fetches requests from the network with a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    slow_request_threshold: Option<std::time::Duration>,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, ShelterError> {
        Ok(Self {
            client: create_client(config)?,
            slow_request_threshold: config.slow_request_threshold(),
        })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            slow_request_threshold: None,
        }
    }

    /// Request headers minus the ones the client manages itself
    fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
        let mut forwarded = headers.clone();
        for name in [HOST, CONNECTION, CONTENT_LENGTH, ACCEPT_ENCODING] {
            forwarded.remove(name);
        }
        forwarded
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, ShelterError> {
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(Self::forwarded_headers(&request.headers));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let elapsed = started.elapsed();
        if let Some(threshold) = self.slow_request_threshold {
            if elapsed > threshold {
                warn!(
                    url = %request.url,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow request detected"
                );
            }
        }

        debug!(
            method = %request.method,
            url = %request.url,
            status = %status,
            bytes = body.len(),
            "Fetched from network"
        );

        Ok(ProxyResponse::new(status, headers, body, ResponseSource::Network))
    }
}
