//! # Cache Types
//!
//! This module defines common types used across the partition store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic role of a cache partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    /// Pre-populated at install time, long lived
    Static,
    /// General content, populated lazily
    Dynamic,
    /// Images, populated lazily and evictable
    Image,
}

impl PartitionRole {
    pub const ALL: [PartitionRole; 3] = [
        PartitionRole::Static,
        PartitionRole::Dynamic,
        PartitionRole::Image,
    ];

    /// Segment used inside partition names
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionRole::Static => "static",
            PartitionRole::Dynamic => "dynamic",
            PartitionRole::Image => "images",
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three partition names of one version.
///
/// All names share a single version token, so bumping it retires every
/// partition of the previous version at the next activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
    prefix: String,
    version: String,
}

impl PartitionSet {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of the partition holding the given role
    pub fn name(&self, role: PartitionRole) -> String {
        format!("{}-{}-{}", self.prefix, role.as_str(), self.version)
    }

    /// All expected partition names, in role order
    pub fn names(&self) -> Vec<String> {
        PartitionRole::ALL.iter().map(|r| self.name(*r)).collect()
    }

    /// Whether a partition name belongs to this version
    pub fn contains(&self, name: &str) -> bool {
        PartitionRole::ALL.iter().any(|r| self.name(*r) == name)
    }
}

/// Result of a store operation
pub type StoreResult<T> = std::result::Result<T, std::io::Error>;
