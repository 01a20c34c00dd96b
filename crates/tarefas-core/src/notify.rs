use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// A user-facing message, the terminal equivalent of a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server answered 401 and the stored token was discarded. The
    /// front end should send the user back to the login entry point.
    Expired,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn session(&self, event: SessionEvent);
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Reports a failed operation. `message` is the operation-specific text,
/// the error detail goes into the description.
pub fn report_failure(notifier: &dyn Notifier, message: &str, err: &Error) {
    notifier.notify(Notification {
        level: Level::Error,
        title: message.to_string(),
        description: err.to_string(),
    });
}

pub fn report_success(notifier: &dyn Notifier, title: &str, description: impl Into<String>) {
    notifier.notify(Notification {
        level: Level::Info,
        title: title.to_string(),
        description: description.into(),
    });
}

/// Default notifier: routes notifications into the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Info => info!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
            Level::Error => warn!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
        }
    }

    fn session(&self, event: SessionEvent) {
        warn!(?event, "session event");
    }
}

/// Keeps every notification and session event in memory. Used by the CLI to
/// print what happened after a command and by tests to count reports.
#[derive(Debug, Default)]
pub struct Recorder {
    notifications: Mutex<Vec<Notification>>,
    events: Mutex<Vec<SessionEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.level == Level::Error)
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn drain(&self) -> (Vec<Notification>, Vec<SessionEvent>) {
        (
            std::mem::take(&mut *self.notifications.lock()),
            std::mem::take(&mut *self.events.lock()),
        )
    }
}

impl Notifier for Recorder {
    fn notify(&self, notification: Notification) {
        LogNotifier.notify(notification.clone());
        self.notifications.lock().push(notification);
    }

    fn session(&self, event: SessionEvent) {
        LogNotifier.session(event);
        self.events.lock().push(event);
    }
}
