//! # Store Providers
//!
//! This module contains the partition store implementations.

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::provider::PartitionStore;

// Store interface
pub mod provider;

// Individual store implementations
pub mod file;
pub mod memory;
