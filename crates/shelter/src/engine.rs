//! # Engine
//!
//! One version of the caching layer: its configuration, partitions,
//! classifier and strategies, driven by lifecycle and request events.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::ShelterError;
use crate::cache::{MemoryStore, PartitionCache, PartitionRole, PartitionStore, PruneReport};
use crate::classifier::{Classifier, ResourceClass};
use crate::config::EngineConfig;
use crate::event::{Effect, Event};
use crate::fallback::OfflineFallback;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::lifecycle::{ActivationReport, InstallReport, Lifecycle, WorkerState, fetch_all};
use crate::message::ClientMessage;
use crate::notification::{ClickOutcome, Notification, handle_click};
use crate::request::{ProxyRequest, RequestKey};
use crate::response::ProxyResponse;
use crate::strategy::StrategyExecutor;
use crate::sync::{BackgroundRefresh, RefreshReport};

pub struct Engine {
    config: Arc<EngineConfig>,
    cache: PartitionCache,
    classifier: Classifier,
    executor: StrategyExecutor,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: Lifecycle,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PartitionStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ShelterError> {
        config.validate()?;

        let cache = PartitionCache::new(store, config.partition_set());
        let root = config.resolve(&config.root_document)?;
        let fallback = OfflineFallback::new(cache.clone(), &root, config.offline_message.clone());
        let executor = StrategyExecutor::new(cache.clone(), fetcher.clone(), fallback);

        Ok(Self {
            classifier: Classifier::from_config(&config),
            config: Arc::new(config),
            cache,
            executor,
            fetcher,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Engine fetching through reqwest with the configured HTTP settings
    pub fn with_http(config: EngineConfig, store: Arc<dyn PartitionStore>) -> Result<Self, ShelterError> {
        let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
        Self::new(config, store, fetcher)
    }

    /// A memory store honoring the configured partition limits
    pub fn memory_store(config: &EngineConfig) -> MemoryStore {
        let partitions = config.partition_set();
        PartitionRole::ALL
            .into_iter()
            .filter_map(|role| Some((role, config.limits.for_role(role)?)))
            .fold(MemoryStore::new(), |store, (role, max_bytes)| {
                store.with_partition_limit(partitions.name(role), max_bytes)
            })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn cache(&self) -> &PartitionCache {
        &self.cache
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Absolute URLs of the static files
    pub fn static_urls(&self) -> Result<Vec<Url>, ShelterError> {
        self.config
            .static_files
            .iter()
            .map(|file| self.config.resolve(file).map_err(ShelterError::from))
            .collect()
    }

    /// Whether every static file is already in the static partition
    pub async fn is_installed(&self) -> Result<bool, ShelterError> {
        let stored = self.cache.keys(PartitionRole::Static).await?;
        Ok(self
            .static_urls()?
            .iter()
            .all(|url| stored.contains(&RequestKey::get(url))))
    }

    /// Fetch every static file and store them as one batch.
    ///
    /// Nothing is written unless every fetch succeeded. On failure this
    /// engine becomes redundant.
    pub async fn install(&self) -> Result<InstallReport, ShelterError> {
        self.lifecycle.begin_install()?;
        let partition = self.cache.name(PartitionRole::Static);
        info!(version = %self.version(), partition = %partition, "Installing static files");

        match self.populate_static().await {
            Ok(stored) => {
                self.lifecycle.finish_install(self.config.skip_waiting)?;
                info!(version = %self.version(), stored, "Static files cached");
                Ok(InstallReport {
                    version: self.version().to_owned(),
                    partition,
                    stored,
                    skip_waiting: self.lifecycle.skip_waiting_requested(),
                })
            }
            Err(e) => {
                self.retire();
                error!(version = %self.version(), error = %e, "Failed to cache static files");
                Err(ShelterError::Install(e.to_string()))
            }
        }
    }

    async fn populate_static(&self) -> Result<usize, ShelterError> {
        let urls = self.static_urls()?;
        let entries = fetch_all(self.fetcher.as_ref(), &urls).await?;
        let stored = entries.len();
        if let Err(e) = self.cache.store_batch(PartitionRole::Static, entries).await {
            let partition = self.cache.name(PartitionRole::Static);
            if let Err(delete_error) = self.cache.store().delete(&partition).await {
                warn!(partition = %partition, error = %delete_error, "Failed to drop partially installed partition");
            }
            return Err(e.into());
        }
        Ok(stored)
    }

    /// Adopt static files stored by an earlier run instead of installing
    pub async fn restore(&self) -> Result<bool, ShelterError> {
        if !self.is_installed().await? {
            return Ok(false);
        }
        self.lifecycle.restore()?;
        info!(version = %self.version(), "Restored installed version");
        Ok(true)
    }

    /// Delete the partitions of other versions and claim clients.
    ///
    /// Deletion failures are reported without blocking activation.
    pub async fn activate(&self) -> Result<ActivationReport, ShelterError> {
        self.lifecycle.check_activatable()?;

        let pruned = match self.cache.prune().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Could not list partitions, skipping cleanup");
                PruneReport::default()
            }
        };
        self.lifecycle.mark_active();
        info!(
            version = %self.version(),
            deleted = pruned.deleted.len(),
            failed = pruned.failed.len(),
            "Activated, claiming clients"
        );

        Ok(ActivationReport {
            version: self.version().to_owned(),
            pruned,
            claimed_clients: true,
        })
    }

    /// Classify the request and run it through its strategy
    pub async fn respond(&self, request: &ProxyRequest) -> Result<ProxyResponse, ShelterError> {
        let class = self.classifier.classify_url(&request.url);
        let (strategy, role) = class.route();
        debug!(url = %request.url, class = %class, strategy = %strategy, "Routing request");
        self.executor.execute(strategy, role, request).await
    }

    pub fn classify(&self, url: &str) -> ResourceClass {
        self.classifier.classify(url)
    }

    /// Refresh the dynamic partition if the tag matches.
    ///
    /// Returns `None` for other tags.
    pub async fn sync(&self, tag: &str) -> Result<Option<RefreshReport>, ShelterError> {
        if tag != self.config.sync_tag {
            debug!(tag, "Ignoring sync with unknown tag");
            return Ok(None);
        }
        info!(tag, "Background sync triggered");
        let refresh = BackgroundRefresh::new(
            self.cache.clone(),
            self.fetcher.clone(),
            self.config.sync_concurrency,
        );
        refresh.run().await.map(Some)
    }

    /// Fetch the URLs and store them in the dynamic partition as one batch
    pub async fn cache_urls(&self, urls: &[String]) -> Result<usize, ShelterError> {
        let urls = urls
            .iter()
            .map(|u| self.config.resolve(u))
            .collect::<Result<Vec<_>, _>>()?;
        let entries = fetch_all(self.fetcher.as_ref(), &urls).await?;
        let stored = entries.len();
        self.cache.store_batch(PartitionRole::Dynamic, entries).await?;
        info!(stored, "Cached requested URLs");
        Ok(stored)
    }

    pub fn push(&self, payload: Option<&str>) -> Notification {
        info!("Push notification received");
        Notification::from_push(&self.config.notification, payload)
    }

    pub fn notification_click(&self, action: &str, url: Option<&str>) -> Result<ClickOutcome, ShelterError> {
        debug!(action, "Notification clicked");
        Ok(handle_click(&self.config.origin, action, url)?)
    }

    /// Take this version out of service. Its partitions receive no more
    /// writes, including from revalidations still in flight.
    pub fn retire(&self) {
        self.lifecycle.retire();
        self.cache.close();
    }

    /// Wait for background revalidations to finish
    pub async fn settle(&self) {
        self.executor.settle().await;
    }

    /// Handle one event.
    ///
    /// Only an active engine answers fetches. Until activation, and after
    /// retirement, requests pass through to the network untouched.
    pub async fn dispatch(&self, event: Event) -> Result<Effect, ShelterError> {
        match event {
            Event::Install => self.install().await.map(Effect::Installed),
            Event::Activate => self.activate().await.map(Effect::Activated),
            Event::Fetch(request) => {
                if !request.is_get() || self.state() != WorkerState::Active {
                    return Ok(Effect::Passthrough(request));
                }
                match self.respond(&request).await {
                    Ok(response) => Ok(Effect::Respond(response)),
                    Err(ShelterError::NoResponse(reason)) => Ok(Effect::NoResponse(reason)),
                    Err(e) => Err(e),
                }
            }
            Event::Sync { tag } => Ok(match self.sync(&tag).await? {
                Some(report) => Effect::Synced(report),
                None => Effect::SyncIgnored,
            }),
            Event::Push { payload } => Ok(Effect::ShowNotification(self.push(payload.as_deref()))),
            Event::NotificationClick { action, url } => {
                Ok(match self.notification_click(&action, url.as_deref())? {
                    ClickOutcome::OpenWindow(url) => Effect::OpenWindow(url),
                    ClickOutcome::Close => Effect::CloseNotification,
                })
            }
            Event::Message(message) => match message {
                ClientMessage::SkipWaiting => {
                    self.lifecycle.request_skip_waiting();
                    Ok(Effect::SkipWaiting)
                }
                ClientMessage::CacheUrls { urls } => self.cache_urls(&urls).await.map(Effect::CachedUrls),
                ClientMessage::Unknown => Ok(Effect::Ignored),
            },
        }
    }
}
