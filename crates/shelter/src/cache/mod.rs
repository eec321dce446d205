//! # Partition Store
//!
//! Named, versioned partitions of request→response snapshots, the facade the
//! strategies use to reach them, and the store providers behind it.

mod manager;
pub mod providers;
mod types;

pub use manager::{PartitionCache, PruneReport};
pub use types::{PartitionRole, PartitionSet, StoreResult};

pub use providers::{FileStore, MemoryStore, PartitionStore};
