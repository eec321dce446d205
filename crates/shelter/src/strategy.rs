//! # Caching Strategies
//!
//! Cache-first, network-first and stale-while-revalidate, each reading and
//! writing exactly one partition. Revalidations started by
//! stale-while-revalidate run on a task tracker so they outlive the caller
//! and can be awaited with [`StrategyExecutor::settle`].

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::ShelterError;
use crate::cache::{PartitionCache, PartitionRole};
use crate::fallback::OfflineFallback;
use crate::fetcher::Fetcher;
use crate::request::{ProxyRequest, RequestKey};
use crate::response::{ProxyResponse, ResponseSource};

/// Policy combining cache lookup and network fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct StrategyExecutor {
    cache: PartitionCache,
    fetcher: Arc<dyn Fetcher>,
    fallback: OfflineFallback,
    revalidations: TaskTracker,
}

impl StrategyExecutor {
    pub fn new(cache: PartitionCache, fetcher: Arc<dyn Fetcher>, fallback: OfflineFallback) -> Self {
        Self {
            cache,
            fetcher,
            fallback,
            revalidations: TaskTracker::new(),
        }
    }

    pub fn cache(&self) -> &PartitionCache {
        &self.cache
    }

    /// Run the request through a strategy against one partition
    pub async fn execute(
        &self,
        strategy: Strategy,
        role: PartitionRole,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, ShelterError> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(role, request).await,
            Strategy::NetworkFirst => self.network_first(role, request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(role, request).await,
        }
    }

    /// Serve the cached snapshot without touching the network. On a miss,
    /// fetch and store a successful result; on failure, fall back.
    pub async fn cache_first(
        &self,
        role: PartitionRole,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, ShelterError> {
        let key = request.key();
        if let Some(hit) = self.cache.lookup(role, &key).await {
            debug!(key = %key, partition = %role, "Cache hit");
            return Ok(hit.into_response(ResponseSource::Cache));
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.cache.store_response(role, key, &response).await;
                Ok(response)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache-first fetch failed");
                self.fall_back(request, e).await
            }
        }
    }

    /// Prefer a fresh network result, refreshing the partition. On failure,
    /// serve the cached snapshot, then the fallback.
    pub async fn network_first(
        &self,
        role: PartitionRole,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, ShelterError> {
        let key = request.key();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.cache.store_response(role, key, &response).await;
                Ok(response)
            }
            Err(e) => {
                if let Some(hit) = self.cache.lookup(role, &key).await {
                    debug!(key = %key, error = %e, "Network failed, serving cached snapshot");
                    return Ok(hit.into_response(ResponseSource::Cache));
                }
                warn!(key = %key, error = %e, "Network-first fetch failed with nothing cached");
                self.fall_back(request, e).await
            }
        }
    }

    /// Answer from the cache immediately and refresh it in the background.
    ///
    /// On a miss the caller waits for the network. A miss combined with a
    /// network failure is an error rather than a fallback.
    pub async fn stale_while_revalidate(
        &self,
        role: PartitionRole,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, ShelterError> {
        let key = request.key();
        let cached = self.cache.lookup(role, &key).await;
        let revalidation = self.revalidations.spawn(revalidate(
            self.cache.clone(),
            self.fetcher.clone(),
            role,
            key.clone(),
            request.clone(),
        ));

        if let Some(hit) = cached {
            debug!(key = %key, "Serving stale snapshot while revalidating");
            return Ok(hit.into_response(ResponseSource::Cache));
        }

        match revalidation.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ShelterError::NoResponse(format!("{key}: {e}"))),
            Err(e) => Err(ShelterError::NoResponse(format!("{key}: revalidation aborted: {e}"))),
        }
    }

    /// Wait for every revalidation started so far
    pub async fn settle(&self) {
        self.revalidations.close();
        self.revalidations.wait().await;
        self.revalidations.reopen();
    }

    /// Number of revalidations still running
    pub fn pending_revalidations(&self) -> usize {
        self.revalidations.len()
    }

    async fn fall_back(
        &self,
        request: &ProxyRequest,
        cause: ShelterError,
    ) -> Result<ProxyResponse, ShelterError> {
        self.fallback
            .respond(request)
            .await
            .ok_or_else(|| ShelterError::NoResponse(format!("{}: {cause}", request.url)))
    }
}

async fn revalidate(
    cache: PartitionCache,
    fetcher: Arc<dyn Fetcher>,
    role: PartitionRole,
    key: RequestKey,
    request: ProxyRequest,
) -> Result<ProxyResponse, ShelterError> {
    match fetcher.fetch(&request).await {
        Ok(response) => {
            if cache.store_response(role, key.clone(), &response).await {
                debug!(key = %key, "Revalidated snapshot");
            }
            Ok(response)
        }
        Err(e) => {
            debug!(key = %key, error = %e, "Revalidation failed");
            Err(e)
        }
    }
}
