//! Push notification contract.
//!
//! A push message carries an optional JSON payload; missing fields fall
//! back to app defaults. The resulting notification offers two actions,
//! `view` and `dismiss`, and clicking dispatches to a navigation target:
//! view opens the events section, dismiss does nothing, and the default
//! click opens the app root.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fallback notification title
const DEFAULT_TITLE: &str = "TideCache";

/// Fallback notification body
const DEFAULT_BODY: &str = "New beach cleanup event available!";

/// Stable tag so repeated pushes replace rather than stack
const NOTIFICATION_TAG: &str = "tidecache-notification";

/// Payload of an incoming push message. All fields are optional; an empty
/// push still produces a notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PushPayload {
    /// Parse raw push bytes. Absent or malformed payloads yield defaults.
    pub fn parse(raw: Option<&[u8]>) -> Self {
        match raw {
            Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|e| {
                debug!(error = %e, "malformed push payload, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// A displayable notification built from a push payload.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn from_payload(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: "/assets/icon-192x192.png".to_string(),
            badge: "/assets/icon-72x72.png".to_string(),
            tag: NOTIFICATION_TAG.to_string(),
            require_interaction: true,
            actions: vec![
                NotificationAction {
                    action: "view".to_string(),
                    title: "View Event".to_string(),
                    icon: "/assets/action-view.png".to_string(),
                },
                NotificationAction {
                    action: "dismiss".to_string(),
                    title: "Dismiss".to_string(),
                    icon: "/assets/action-dismiss.png".to_string(),
                },
            ],
            data: payload.data,
        }
    }
}

/// Where a notification click should take the user, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Open a window at this app-relative URL
    Open(String),
    /// Close the notification and do nothing else
    None,
}

/// Dispatch a notification click. `action` is the id of the pressed action
/// button, or empty for a click on the notification body.
pub fn dispatch_click(action: &str) -> ClickOutcome {
    match action {
        "view" => ClickOutcome::Open("/#events".to_string()),
        "dismiss" => ClickOutcome::None,
        _ => ClickOutcome::Open("/".to_string()),
    }
}
