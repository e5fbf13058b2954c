//! User-visible notifications.

use serde::Serialize;
use tracing::{error, info, warn};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Info,
    Success,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: NotificationKind::Error,
        }
    }
}

/// Fire-and-forget sink for notifications. Never read back.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            title,
            description,
            kind,
        } = notification;
        match kind {
            NotificationKind::Error => error!(title = %title, "{}", description),
            NotificationKind::Warning => warn!(title = %title, "{}", description),
            NotificationKind::Info | NotificationKind::Success => {
                info!(title = %title, "{}", description)
            }
        }
    }
}
