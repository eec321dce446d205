//! Messages posted to the engine by pages and hosts.

use serde::{Deserialize, Serialize};

/// A message tagged by its `type` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate the waiting engine now
    SkipWaiting,
    /// Fetch the URLs and store them in the dynamic partition as one batch
    CacheUrls { urls: Vec<String> },
    /// Any other type
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a JSON message. Anything unreadable is treated as unknown.
    pub fn parse(data: &[u8]) -> Self {
        match serde_json::from_slice(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unreadable message");
                ClientMessage::Unknown
            }
        }
    }
}
