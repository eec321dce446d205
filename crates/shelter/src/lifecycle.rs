//! # Lifecycle
//!
//! Install and activate state of one engine version, plus the all-or-nothing
//! batch fetch used to populate partitions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::ShelterError;
use crate::cache::PruneReport;
use crate::fetcher::Fetcher;
use crate::request::{ProxyRequest, RequestKey};
use crate::response::StoredResponse;

/// Lifecycle state of an engine version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed, waiting for the previous version to give way
    Waiting,
    Active,
    /// Failed to install or replaced by a newer version
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub partition: String,
    /// Number of static files stored
    pub stored: usize,
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub version: String,
    pub pruned: PruneReport,
    pub claimed_clients: bool,
}

/// State machine guarding install and activate transitions
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Parsed → Installing
    pub(crate) fn begin_install(&self) -> Result<(), ShelterError> {
        self.transition(&[WorkerState::Parsed], WorkerState::Installing)
    }

    /// Installing → Waiting, optionally requesting skip-waiting
    pub(crate) fn finish_install(&self, skip_waiting: bool) -> Result<(), ShelterError> {
        self.transition(&[WorkerState::Installing], WorkerState::Waiting)?;
        if skip_waiting {
            self.request_skip_waiting();
        }
        Ok(())
    }

    /// Activation runs from Waiting, and again from Active
    pub(crate) fn check_activatable(&self) -> Result<(), ShelterError> {
        let state = self.state();
        match state {
            WorkerState::Waiting | WorkerState::Active => Ok(()),
            other => Err(ShelterError::Lifecycle(format!("cannot activate from {other}"))),
        }
    }

    pub(crate) fn mark_active(&self) {
        self.set(WorkerState::Active);
    }

    /// Adopt a version that was installed by an earlier run
    pub(crate) fn restore(&self) -> Result<(), ShelterError> {
        self.transition(&[WorkerState::Parsed], WorkerState::Waiting)
    }

    pub fn retire(&self) {
        self.set(WorkerState::Redundant);
    }

    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    fn set(&self, next: WorkerState) {
        let mut state = self.state.lock();
        debug!(from = %*state, to = %next, "Lifecycle transition");
        *state = next;
    }

    fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<(), ShelterError> {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return Err(ShelterError::Lifecycle(format!("{} -> {to}", *state)));
        }
        debug!(from = %*state, to = %to, "Lifecycle transition");
        *state = to;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch every URL concurrently and snapshot the results.
///
/// Any transport failure or unsuccessful status fails the whole batch, so
/// nothing is returned for storing unless every fetch succeeded.
pub async fn fetch_all(
    fetcher: &dyn Fetcher,
    urls: &[Url],
) -> Result<Vec<(RequestKey, StoredResponse)>, ShelterError> {
    try_join_all(urls.iter().map(|url| async move {
        let request = ProxyRequest::get(url.clone());
        let response = fetcher.fetch(&request).await?;
        match response.snapshot() {
            Some(snapshot) => Ok((request.key(), snapshot)),
            None => Err(ShelterError::StatusCode {
                url: url.to_string(),
                status: response.status,
            }),
        }
    }))
    .await
}
