//! # Push Notifications
//!
//! Builds the notification shown for a push event and decides what a click
//! on it does.

use serde::Serialize;
use url::Url;

use crate::config::NotificationConfig;

pub const ACTION_OPEN: &str = "open";
pub const ACTION_CLOSE: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    /// Opened by the "open" action
    pub url: String,
}

/// A notification request for the host to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the notification for a push. An empty or missing payload uses
    /// the configured default body.
    pub fn from_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
        let body = payload
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&config.default_body)
            .to_owned();

        Self {
            title: config.title.clone(),
            body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            image: config.image.clone(),
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                url: config.open_url.clone(),
            },
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.to_owned(),
                    title: config.open_title.clone(),
                    icon: config.icon.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_owned(),
                    title: config.close_title.clone(),
                    icon: config.icon.clone(),
                },
            ],
        }
    }
}

/// What the host does after a notification click. The notification is
/// always closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    OpenWindow(Url),
    Close,
}

/// Resolve a click. Only the "open" action opens a window, at the
/// notification's URL or the origin root.
pub fn handle_click(
    origin: &Url,
    action: &str,
    url: Option<&str>,
) -> Result<ClickOutcome, url::ParseError> {
    if action != ACTION_OPEN {
        return Ok(ClickOutcome::Close);
    }

    let target = url.filter(|u| !u.is_empty()).unwrap_or("/");
    Ok(ClickOutcome::OpenWindow(origin.join(target)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_payload_becomes_body() {
        let config = NotificationConfig::default();
        let notification = Notification::from_push(&config, Some("Novo plano"));
        assert_eq!(notification.title, "White Plus");
        assert_eq!(notification.body, "Novo plano");
        assert_eq!(notification.vibrate, vec![200, 100, 200]);
        assert_eq!(notification.data.url, "/");
        let actions: Vec<_> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, [ACTION_OPEN, ACTION_CLOSE]);
    }

    #[test]
    fn test_missing_payload_uses_default_body() {
        let config = NotificationConfig::default();
        assert_eq!(
            Notification::from_push(&config, None).body,
            config.default_body
        );
        assert_eq!(
            Notification::from_push(&config, Some("  ")).body,
            config.default_body
        );
    }

    #[test]
    fn test_click_actions() {
        let origin = Url::parse("https://white.plus/").unwrap();
        assert_eq!(
            handle_click(&origin, "open", Some("/plans")).unwrap(),
            ClickOutcome::OpenWindow(Url::parse("https://white.plus/plans").unwrap())
        );
        assert_eq!(
            handle_click(&origin, "open", None).unwrap(),
            ClickOutcome::OpenWindow(origin.clone())
        );
        assert_eq!(handle_click(&origin, "close", Some("/plans")).unwrap(), ClickOutcome::Close);
        assert_eq!(handle_click(&origin, "", None).unwrap(), ClickOutcome::Close);
    }
}
