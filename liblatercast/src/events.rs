//! Lifecycle event distribution
//!
//! The dispatcher fans scheduler lifecycle events out to every currently
//! connected observer (UI sessions, log sinks) over a broadcast channel,
//! and separately surfaces user-facing alerts for terminal outcomes.
//!
//! Delivery is best-effort and at-most-once per connected observer: with no
//! subscribers an emit is dropped immediately, lagging subscribers lose the
//! oldest events first, and observers connecting after an event was emitted
//! never see it retroactively.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{PublishResult, ScheduledPost};

pub type EventReceiver = broadcast::Receiver<Event>;
pub type AlertReceiver = broadcast::Receiver<Alert>;

/// Lifecycle events observers receive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A due post was leased and its publish pass began
    Started {
        post_id: String,
        platforms: Vec<String>,
    },

    /// The pass ended with at least one platform success
    Published {
        post_id: String,
        results: Vec<PublishResult>,
    },

    /// Every platform attempt in the pass failed
    Failed {
        post_id: String,
        results: Vec<PublishResult>,
    },
}

impl Event {
    pub fn post_id(&self) -> &str {
        match self {
            Event::Started { post_id, .. }
            | Event::Published { post_id, .. }
            | Event::Failed { post_id, .. } => post_id,
        }
    }
}

/// User-facing notification for a terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub post_id: String,
}

impl Alert {
    pub fn published(post: &ScheduledPost) -> Self {
        Self {
            title: "Post published".to_string(),
            body: format!(
                "\"{}\" went out successfully.",
                truncate_caption(&post.caption, 50)
            ),
            post_id: post.id.clone(),
        }
    }

    pub fn failed(post: &ScheduledPost, results: &[PublishResult]) -> Self {
        let errors: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.platform,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();

        Self {
            title: "Publishing failed".to_string(),
            body: format!(
                "Could not publish \"{}\". {}",
                truncate_caption(&post.caption, 40),
                errors.join("; ")
            ),
            post_id: post.id.clone(),
        }
    }
}

/// Truncate a caption for display, appending an ellipsis when shortened.
fn truncate_caption(caption: &str, max_chars: usize) -> String {
    if caption.chars().count() <= max_chars {
        caption.to_string()
    } else {
        let head: String = caption.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// Fan-out hub for lifecycle events and user alerts
#[derive(Clone)]
pub struct NotificationDispatcher {
    events: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Alert>,
}

impl NotificationDispatcher {
    /// Create a dispatcher with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self { events, alerts }
    }

    /// Subscribe to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Subscribe to user-facing alerts emitted from now on.
    pub fn subscribe_alerts(&self) -> AlertReceiver {
        self.alerts.subscribe()
    }

    /// Emit an event to all current subscribers. Never blocks; dropped
    /// when nobody is listening.
    pub fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Surface a user-facing alert. Never blocks.
    pub fn alert(&self, alert: Alert) {
        let _ = self.alerts.send(alert);
    }

    /// Number of currently connected event observers.
    pub fn observer_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
