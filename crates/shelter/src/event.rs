//! Events delivered to an engine and the effects the host must carry out.

use url::Url;

use crate::lifecycle::{ActivationReport, InstallReport};
use crate::message::ClientMessage;
use crate::notification::Notification;
use crate::request::ProxyRequest;
use crate::response::ProxyResponse;
use crate::sync::RefreshReport;

#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    /// An intercepted request
    Fetch(ProxyRequest),
    Sync { tag: String },
    Push { payload: Option<String> },
    NotificationClick { action: String, url: Option<String> },
    Message(ClientMessage),
}

#[derive(Debug, Clone)]
pub enum Effect {
    Installed(InstallReport),
    Activated(ActivationReport),
    /// Answer the request with this response
    Respond(ProxyResponse),
    /// Not handled, send the request to the network untouched
    Passthrough(ProxyRequest),
    /// Neither network, cache nor fallback could answer
    NoResponse(String),
    Synced(RefreshReport),
    SyncIgnored,
    ShowNotification(Notification),
    /// Close the notification and open a window at the URL
    OpenWindow(Url),
    CloseNotification,
    SkipWaiting,
    /// Number of URLs stored
    CachedUrls(usize),
    Ignored,
}
