//! # Shelter Engine
//!
//! An offline-capable caching layer that sits between a page and the
//! network. Every intercepted request is classified, routed to a caching
//! strategy backed by versioned cache partitions, and answered from the
//! network, a stored snapshot or a synthesized offline fallback.
//!
//! ## Features
//!
//! - Cache-first, network-first and stale-while-revalidate strategies
//! - Versioned partitions retired at activation
//! - Atomic install of a static-file allow-list
//! - Background refresh of the dynamic partition
//! - Memory (Moka) and file backed partition stores
//! - Push notification and message handling

pub mod builder;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fallback;
pub mod fetcher;
pub mod lifecycle;
pub mod message;
pub mod notification;
pub mod proxy;
pub mod registration;
pub mod request;
pub mod response;
pub mod strategy;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::EngineConfigBuilder;
pub use cache::{FileStore, MemoryStore, PartitionCache, PartitionRole, PartitionStore};
pub use classifier::{Classifier, ResourceClass};
pub use config::{EngineConfig, HttpConfig, NotificationConfig};
pub use engine::Engine;
pub use error::ShelterError;
pub use event::{Effect, Event};
pub use fetcher::{Fetcher, HttpFetcher, create_client};
pub use lifecycle::{ActivationReport, InstallReport, WorkerState};
pub use message::ClientMessage;
pub use registration::{RegisterOutcome, Registration};
pub use request::{Destination, ProxyRequest, RequestKey};
pub use response::{ProxyResponse, ResponseSource, StoredResponse};
pub use strategy::Strategy;
pub use sync::RefreshReport;
