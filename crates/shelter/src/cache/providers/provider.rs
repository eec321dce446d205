//! # Partition Store
//!
//! This module defines the store trait that all partition providers must follow.

use async_trait::async_trait;
use tracing::warn;

use crate::cache::types::StoreResult;
use crate::request::RequestKey;
use crate::response::StoredResponse;

/// A store of named partitions, each mapping request keys to snapshots
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the partition if it does not exist yet
    async fn open(&self, partition: &str) -> StoreResult<()>;

    /// Names of every existing partition
    async fn partitions(&self) -> StoreResult<Vec<String>>;

    /// Delete a whole partition. Returns whether it existed.
    async fn delete(&self, partition: &str) -> StoreResult<bool>;

    /// Look up a snapshot. A missing partition is a miss.
    async fn get(&self, partition: &str, key: &RequestKey) -> StoreResult<Option<StoredResponse>>;

    /// Store a snapshot, creating the partition on first write
    async fn put(
        &self,
        partition: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreResult<()>;

    /// Remove one snapshot. Returns whether it existed.
    async fn remove(&self, partition: &str, key: &RequestKey) -> StoreResult<bool>;

    /// Keys currently stored in a partition
    async fn keys(&self, partition: &str) -> StoreResult<Vec<RequestKey>>;

    /// Store several snapshots, all or none.
    ///
    /// When a write fails, the entries already written are put back to what
    /// they were before the batch.
    async fn put_all(
        &self,
        partition: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> StoreResult<()> {
        self.open(partition).await?;

        let mut written = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let previous = self.get(partition, &key).await?;
            if let Err(e) = self.put(partition, key.clone(), response).await {
                warn!(partition, key = %key, error = %e, "Batch write failed, rolling back");
                roll_back(self, partition, written).await;
                return Err(e);
            }
            written.push((key, previous));
        }
        Ok(())
    }
}

/// Undo batch writes, newest first
async fn roll_back<S: PartitionStore + ?Sized>(
    store: &S,
    partition: &str,
    written: Vec<(RequestKey, Option<StoredResponse>)>,
) {
    for (key, previous) in written.into_iter().rev() {
        let restored = match previous {
            Some(response) => store.put(partition, key.clone(), response).await,
            None => store.remove(partition, &key).await.map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(partition, key = %key, error = %e, "Failed to roll back entry");
        }
    }
}
