//! Scripted network and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;
use url::Url;

use crate::fetcher::Fetcher;
use crate::request::ProxyRequest;
use crate::response::{ProxyResponse, ResponseSource};
use crate::{EngineConfig, ShelterError};

pub(crate) const ORIGIN: &str = "https://white.plus/";

#[inline]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

pub(crate) fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Default configuration bound to the test origin
pub(crate) fn config() -> EngineConfig {
    EngineConfig::builder().with_origin(ORIGIN).build().unwrap()
}

#[derive(Clone)]
enum Reply {
    Respond(StatusCode, Bytes),
    Fail,
}

#[derive(Clone)]
struct Route {
    reply: Reply,
    gate: Option<Arc<Semaphore>>,
}

/// A fetcher answering from a table of scripted routes.
///
/// Unknown URLs fail like an unreachable network.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl MockFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn route(&self, path: &str, route: Route) {
        self.routes.lock().insert(url(path).to_string(), route);
    }

    /// Answer 200 with a text body
    pub(crate) fn respond(&self, path: &str, body: &str) {
        self.respond_with(path, StatusCode::OK, body);
    }

    pub(crate) fn respond_with(&self, path: &str, status: StatusCode, body: &str) {
        self.route(
            path,
            Route {
                reply: Reply::Respond(status, Bytes::from(body.to_owned())),
                gate: None,
            },
        );
    }

    /// Fail with a transport error
    pub(crate) fn fail(&self, path: &str) {
        self.route(
            path,
            Route {
                reply: Reply::Fail,
                gate: None,
            },
        );
    }

    /// Answer 200 once a permit is added to the returned gate
    pub(crate) fn respond_gated(&self, path: &str, body: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.route(
            path,
            Route {
                reply: Reply::Respond(StatusCode::OK, Bytes::from(body.to_owned())),
                gate: Some(gate.clone()),
            },
        );
        gate
    }

    /// Make every fetch fail regardless of routes
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches issued for a path
    pub(crate) fn calls(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls.lock().iter().filter(|u| **u == target).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, ShelterError> {
        let target = request.url.to_string();
        self.calls.lock().push(target.clone());

        let route = self.routes.lock().get(&target).cloned();
        if let Some(gate) = route.as_ref().and_then(|r| r.gate.clone()) {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(unreachable_error(&target));
        }

        match route.map(|r| r.reply) {
            Some(Reply::Respond(status, body)) => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                Ok(ProxyResponse::new(status, headers, body, ResponseSource::Network))
            }
            Some(Reply::Fail) | None => Err(unreachable_error(&target)),
        }
    }
}

fn unreachable_error(url: &str) -> ShelterError {
    ShelterError::IoError(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        format!("network unreachable: {url}"),
    ))
}
