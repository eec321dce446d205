//! # Memory Store
//!
//! This module provides an in-memory partition store using Moka caches,
//! one cache per partition.

use std::collections::HashMap;

use moka::future::Cache as MokaCache;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::providers::PartitionStore;
use crate::cache::types::StoreResult;
use crate::request::RequestKey;
use crate::response::StoredResponse;

type Partition = MokaCache<RequestKey, StoredResponse>;

/// In-memory partition store.
///
/// Partitions are unbounded unless a byte limit was registered for their
/// name, in which case Moka evicts entries by body size.
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, Partition>>,
    limits: HashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the total body size of a partition
    pub fn with_partition_limit(mut self, partition: impl Into<String>, max_bytes: u64) -> Self {
        if max_bytes == 0 {
            panic!("Partition size limit must be greater than zero");
        }
        self.limits.insert(partition.into(), max_bytes);
        self
    }

    fn build_partition(&self, name: &str) -> Partition {
        match self.limits.get(name) {
            Some(&max_bytes) => {
                debug!(partition = name, max_bytes, "Creating bounded memory partition");
                MokaCache::builder()
                    .weigher(|_k, v: &StoredResponse| v.body.len().try_into().unwrap_or(u32::MAX))
                    .max_capacity(max_bytes)
                    .build()
            }
            None => {
                debug!(partition = name, "Creating memory partition");
                MokaCache::builder().build()
            }
        }
    }

    fn partition(&self, name: &str) -> Option<Partition> {
        self.partitions.read().get(name).cloned()
    }

    fn partition_or_create(&self, name: &str) -> Partition {
        if let Some(partition) = self.partition(name) {
            return partition;
        }

        let mut partitions = self.partitions.write();
        partitions
            .entry(name.to_owned())
            .or_insert_with(|| self.build_partition(name))
            .clone()
    }
}

#[async_trait::async_trait]
impl PartitionStore for MemoryStore {
    async fn open(&self, partition: &str) -> StoreResult<()> {
        self.partition_or_create(partition);
        Ok(())
    }

    async fn partitions(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.partitions.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, partition: &str) -> StoreResult<bool> {
        let removed = self.partitions.write().remove(partition);
        match removed {
            Some(cache) => {
                cache.invalidate_all();
                debug!(partition, "Deleted memory partition");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, partition: &str, key: &RequestKey) -> StoreResult<Option<StoredResponse>> {
        let Some(cache) = self.partition(partition) else {
            return Ok(None);
        };
        Ok(cache.get(key).await)
    }

    async fn put(
        &self,
        partition: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreResult<()> {
        if let Some(&max_bytes) = self.limits.get(partition) {
            if response.size() > max_bytes {
                warn!(
                    partition,
                    key = %key,
                    size = response.size(),
                    max_bytes,
                    "Entry too large for memory partition, skipping"
                );
                return Ok(());
            }
        }

        let cache = self.partition_or_create(partition);
        cache.insert(key, response).await;
        Ok(())
    }

    async fn remove(&self, partition: &str, key: &RequestKey) -> StoreResult<bool> {
        let Some(cache) = self.partition(partition) else {
            return Ok(false);
        };
        Ok(cache.remove(key).await.is_some())
    }

    async fn keys(&self, partition: &str) -> StoreResult<Vec<RequestKey>> {
        let Some(cache) = self.partition(partition) else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<RequestKey> = cache.iter().map(|(k, _)| (*k).clone()).collect();
        keys.sort();
        Ok(keys)
    }
}
