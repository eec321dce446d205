//! # Registration
//!
//! Holds the engine serving requests and the one waiting to replace it.
//! A version only takes over once it installed completely.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::ShelterError;
use crate::engine::Engine;
use crate::event::{Effect, Event};
use crate::lifecycle::ActivationReport;
use crate::message::ClientMessage;

/// Result of registering a new version
#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    Activated(ActivationReport),
    /// Installed, activation deferred until SKIP_WAITING
    Waiting,
}

#[derive(Default)]
pub struct Registration {
    active: RwLock<Option<Arc<Engine>>>,
    waiting: RwLock<Option<Arc<Engine>>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<Arc<Engine>> {
        self.active.read().clone()
    }

    pub fn waiting(&self) -> Option<Arc<Engine>> {
        self.waiting.read().clone()
    }

    /// Install a new version.
    ///
    /// A failed install leaves the active engine in service. A successful
    /// one activates right away when skip-waiting was requested or nothing
    /// is active yet.
    pub async fn register(&self, engine: Arc<Engine>) -> Result<RegisterOutcome, ShelterError> {
        if let Err(e) = engine.install().await {
            if let Some(active) = self.active() {
                warn!(
                    failed = %engine.version(),
                    active = %active.version(),
                    "Install failed, keeping active version"
                );
            }
            return Err(e);
        }
        self.settle_installed(engine).await
    }

    /// Adopt a version whose static files are already stored, installing it
    /// otherwise
    pub async fn resume(&self, engine: Arc<Engine>) -> Result<RegisterOutcome, ShelterError> {
        if engine.restore().await? {
            return self.promote(engine).await.map(RegisterOutcome::Activated);
        }
        self.register(engine).await
    }

    async fn settle_installed(&self, engine: Arc<Engine>) -> Result<RegisterOutcome, ShelterError> {
        if engine.lifecycle().skip_waiting_requested() || self.active().is_none() {
            return self.promote(engine).await.map(RegisterOutcome::Activated);
        }

        info!(version = %engine.version(), "Installed, waiting for SKIP_WAITING");
        if let Some(previous) = self.waiting.write().replace(engine) {
            previous.retire();
        }
        Ok(RegisterOutcome::Waiting)
    }

    /// Activate the waiting engine, if any
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>, ShelterError> {
        let Some(engine) = self.waiting.write().take() else {
            return Ok(None);
        };
        engine.lifecycle().request_skip_waiting();
        self.promote(engine).await.map(Some)
    }

    /// Put an installed engine in service.
    ///
    /// The previous engine is retired and its revalidations drained before
    /// the new one prunes.
    async fn promote(&self, engine: Arc<Engine>) -> Result<ActivationReport, ShelterError> {
        engine.lifecycle().check_activatable()?;
        let previous = self.active.write().replace(engine.clone());

        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, &engine)) {
            previous.retire();
            previous.settle().await;
            info!(
                from = %previous.version(),
                to = %engine.version(),
                "Replaced active version"
            );
        }
        engine.activate().await
    }

    /// Route an event to the active engine.
    ///
    /// SKIP_WAITING is handled here. Without an active engine requests pass
    /// through and everything else is ignored.
    pub async fn dispatch(&self, event: Event) -> Result<Effect, ShelterError> {
        if let Event::Message(ClientMessage::SkipWaiting) = event {
            self.skip_waiting().await?;
            return Ok(Effect::SkipWaiting);
        }

        match self.active() {
            Some(engine) => engine.dispatch(event).await,
            None => Ok(match event {
                Event::Fetch(request) => Effect::Passthrough(request),
                _ => Effect::Ignored,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use crate::cache::{MemoryStore, PartitionStore};
    use crate::lifecycle::WorkerState;
    use crate::request::ProxyRequest;
    use crate::test_support::{MockFetcher, ORIGIN, url};
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::time::Duration;

    fn versioned(
        version: &str,
        skip_waiting: bool,
        store: &Arc<dyn PartitionStore>,
        fetcher: &Arc<MockFetcher>,
    ) -> Arc<Engine> {
        let config = EngineConfig::builder()
            .with_origin(ORIGIN)
            .with_version(version)
            .with_skip_waiting(skip_waiting)
            .build()
            .unwrap();
        Arc::new(Engine::new(config, store.clone(), fetcher.clone()).unwrap())
    }

    fn serve_static_files(fetcher: &MockFetcher, tag: &str) {
        for file in EngineConfig::default().static_files {
            fetcher.respond(&file, &format!("{tag} {file}"));
        }
    }

    async fn style_body(registration: &Registration) -> Bytes {
        match registration
            .dispatch(Event::Fetch(ProxyRequest::get(url("/style.css"))))
            .await
            .unwrap()
        {
            Effect::Respond(response) => response.body,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_install_keeps_active_version() {
        let store: Arc<dyn PartitionStore> = Arc::new(MemoryStore::new());
        let fetcher = MockFetcher::new();
        serve_static_files(&fetcher, "v1");

        let registration = Registration::new();
        let v1 = versioned("v1", true, &store, &fetcher);
        assert!(matches!(
            registration.register(v1.clone()).await.unwrap(),
            RegisterOutcome::Activated(_)
        ));

        serve_static_files(&fetcher, "v2");
        fetcher.respond_with("/manifest.json", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        let v2 = versioned("v2", true, &store, &fetcher);
        let result = registration.register(v2.clone()).await;

        assert!(matches!(result, Err(ShelterError::Install(_))));
        assert_eq!(v2.state(), WorkerState::Redundant);
        assert_eq!(v1.state(), WorkerState::Active);
        assert!(Arc::ptr_eq(&registration.active().unwrap(), &v1));
        assert_eq!(
            store.partitions().await.unwrap(),
            vec!["white-plus-static-v1"]
        );
        assert_eq!(style_body(&registration).await, Bytes::from_static(b"v1 /style.css"));
    }

    #[tokio::test]
    async fn test_waiting_version_activates_on_skip_waiting() {
        let store: Arc<dyn PartitionStore> = Arc::new(MemoryStore::new());
        let fetcher = MockFetcher::new();
        serve_static_files(&fetcher, "v1");

        let registration = Registration::new();
        // Nothing active yet, so even a waiting-style version activates
        let v1 = versioned("v1", false, &store, &fetcher);
        registration.register(v1.clone()).await.unwrap();
        assert_eq!(v1.state(), WorkerState::Active);

        serve_static_files(&fetcher, "v2");
        let v2 = versioned("v2", false, &store, &fetcher);
        assert!(matches!(
            registration.register(v2.clone()).await.unwrap(),
            RegisterOutcome::Waiting
        ));
        assert_eq!(v2.state(), WorkerState::Waiting);
        assert_eq!(style_body(&registration).await, Bytes::from_static(b"v1 /style.css"));

        let effect = registration
            .dispatch(Event::Message(ClientMessage::parse(br#"{"type":"SKIP_WAITING"}"#)))
            .await
            .unwrap();
        assert!(matches!(effect, Effect::SkipWaiting));
        assert_eq!(v2.state(), WorkerState::Active);
        assert_eq!(v1.state(), WorkerState::Redundant);
        assert!(registration.waiting().is_none());
        assert_eq!(style_body(&registration).await, Bytes::from_static(b"v2 /style.css"));
        assert_eq!(
            store.partitions().await.unwrap(),
            vec!["white-plus-static-v2"]
        );
    }

    #[tokio::test]
    async fn test_pending_revalidation_does_not_recreate_pruned_partition() {
        let store: Arc<dyn PartitionStore> = Arc::new(MemoryStore::new());
        let fetcher = MockFetcher::new();
        serve_static_files(&fetcher, "v1");
        fetcher.respond("/plans", "plans v1");

        let registration = Arc::new(Registration::new());
        let v1 = versioned("v1", true, &store, &fetcher);
        registration.register(v1.clone()).await.unwrap();
        registration
            .dispatch(Event::Fetch(ProxyRequest::get(url("/plans"))))
            .await
            .unwrap();
        v1.settle().await;

        // Served stale, the refetch hangs on the gate
        let gate = fetcher.respond_gated("/plans", "plans v1 refreshed");
        registration
            .dispatch(Event::Fetch(ProxyRequest::get(url("/plans"))))
            .await
            .unwrap();

        serve_static_files(&fetcher, "v2");
        let v2 = versioned("v2", true, &store, &fetcher);
        let promotion = tokio::spawn({
            let registration = registration.clone();
            async move { registration.register(v2).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.add_permits(1);

        let outcome = promotion.await.unwrap().unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated(_)));
        v1.settle().await;

        assert_eq!(v1.state(), WorkerState::Redundant);
        assert_eq!(
            store.partitions().await.unwrap(),
            vec!["white-plus-static-v2"]
        );
    }

    #[tokio::test]
    async fn test_without_active_engine_requests_pass_through() {
        let registration = Registration::new();
        let effect = registration
            .dispatch(Event::Fetch(ProxyRequest::get(url("/plans"))))
            .await
            .unwrap();
        assert!(matches!(effect, Effect::Passthrough(_)));
        assert!(registration.skip_waiting().await.unwrap().is_none());
    }
}
