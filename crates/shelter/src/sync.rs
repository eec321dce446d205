//! # Background Refresh
//!
//! Re-fetches every entry of the dynamic partition when a sync trigger
//! arrives. Individual failures are counted and skipped.

use std::sync::Arc;

use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ShelterError;
use crate::cache::{PartitionCache, PartitionRole};
use crate::fetcher::Fetcher;
use crate::request::RequestKey;

/// Outcome of one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct BackgroundRefresh {
    cache: PartitionCache,
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
}

impl BackgroundRefresh {
    pub fn new(cache: PartitionCache, fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        Self {
            cache,
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Refresh every key of the dynamic partition with bounded concurrency
    pub async fn run(&self) -> Result<RefreshReport, ShelterError> {
        let keys = self.cache.keys(PartitionRole::Dynamic).await?;
        info!(
            partition = %self.cache.name(PartitionRole::Dynamic),
            keys = keys.len(),
            "Refreshing dynamic partition"
        );

        let outcomes: Vec<bool> = stream::iter(keys)
            .map(|key| self.refresh(key))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let refreshed = outcomes.iter().filter(|ok| **ok).count();
        let report = RefreshReport {
            refreshed,
            failed: outcomes.len() - refreshed,
        };
        info!(refreshed = report.refreshed, failed = report.failed, "Background refresh completed");
        Ok(report)
    }

    async fn refresh(&self, key: RequestKey) -> bool {
        let request = match key.to_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping unparseable key");
                return false;
            }
        };

        match self.fetcher.fetch(&request).await {
            Ok(response) if response.is_success() => {
                debug!(key = %key, "Refreshed");
                self.cache
                    .store_response(PartitionRole::Dynamic, key, &response)
                    .await
            }
            Ok(response) => {
                warn!(key = %key, status = %response.status, "Failed to update cached resource");
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to update cached resource");
                false
            }
        }
    }
}
