//! # Partition Cache
//!
//! This module provides the facade the strategies use to reach the partitions
//! of the current version, whatever store backs them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::providers::PartitionStore;
use crate::cache::types::{PartitionRole, PartitionSet, StoreResult};
use crate::request::RequestKey;
use crate::response::{ProxyResponse, StoredResponse};

/// Outcome of removing partitions that belong to other versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Partitions of the current version that were left alone
    pub kept: Vec<String>,
    /// Partitions that were deleted
    pub deleted: Vec<String>,
    /// Partitions whose deletion failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Partitions of one version on top of a shared store.
///
/// Clones share the closed flag: once the version is retired none of them
/// write again, so a pruned partition is never recreated by stragglers.
#[derive(Clone)]
pub struct PartitionCache {
    store: Arc<dyn PartitionStore>,
    partitions: PartitionSet,
    closed: Arc<AtomicBool>,
}

impl PartitionCache {
    pub fn new(store: Arc<dyn PartitionStore>, partitions: PartitionSet) -> Self {
        Self {
            store,
            partitions,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop writing snapshots. Lookups keep working.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<dyn PartitionStore> {
        &self.store
    }

    pub fn partitions(&self) -> &PartitionSet {
        &self.partitions
    }

    /// Name of the partition for a role
    pub fn name(&self, role: PartitionRole) -> String {
        self.partitions.name(role)
    }

    /// Look up a snapshot. Store errors are logged and treated as a miss.
    pub async fn lookup(&self, role: PartitionRole, key: &RequestKey) -> Option<StoredResponse> {
        let partition = self.name(role);
        match self.store.get(&partition, key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(partition = %partition, key = %key, error = %e, "Partition lookup failed");
                None
            }
        }
    }

    /// Store a snapshot of a successful response.
    ///
    /// Returns whether a snapshot was written. Non-success responses are
    /// skipped and store errors are logged.
    pub async fn store_response(
        &self,
        role: PartitionRole,
        key: RequestKey,
        response: &ProxyResponse,
    ) -> bool {
        let Some(snapshot) = response.snapshot() else {
            debug!(key = %key, status = %response.status, "Not caching unsuccessful response");
            return false;
        };

        if self.is_closed() {
            debug!(key = %key, "Partition cache closed, not storing snapshot");
            return false;
        }

        let partition = self.name(role);
        match self.store.put(&partition, key.clone(), snapshot).await {
            Ok(()) => true,
            Err(e) => {
                warn!(partition = %partition, key = %key, error = %e, "Failed to store snapshot");
                false
            }
        }
    }

    /// Store a batch of snapshots into one partition
    pub async fn store_batch(
        &self,
        role: PartitionRole,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> StoreResult<()> {
        if self.is_closed() {
            return Err(std::io::Error::other("partition cache is closed"));
        }
        self.store.put_all(&self.name(role), entries).await
    }

    /// Keys of the partition for a role
    pub async fn keys(&self, role: PartitionRole) -> StoreResult<Vec<RequestKey>> {
        self.store.keys(&self.name(role)).await
    }

    /// Delete every partition that does not belong to the current version.
    ///
    /// Failures are collected rather than returned so cleanup stays best-effort.
    pub async fn prune(&self) -> StoreResult<PruneReport> {
        let mut report = PruneReport::default();

        for name in self.store.partitions().await? {
            if self.partitions.contains(&name) {
                report.kept.push(name);
                continue;
            }

            info!(partition = %name, "Deleting old partition");
            match self.store.delete(&name).await {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(partition = %name, error = %e, "Failed to delete old partition");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
