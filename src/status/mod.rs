//! Refill progress events
//!
//! Observers subscribe to a broadcast stream of [`CacheStatus`]. Events are
//! ephemeral: a subscriber only sees what is emitted after it subscribed, and
//! nothing is persisted.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, error};

const CHANNEL_CAPACITY: usize = 256;

pub type StatusSender = broadcast::Sender<CacheStatus>;
pub type StatusReceiver = broadcast::Receiver<CacheStatus>;

/// One progress or diagnostic event from a refill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheStatus {
    Error { description: String },
    /// Catalog request issued; the path has credentials masked
    Requesting { path: String },
    RequestApiSuccess,
    /// Terminal event of a refill that reached the download stage or failed
    RequestImagesDone { succeeded: usize },
    /// Terminal event of a refill skipped by the unseen threshold
    SkipFetchTargetUnseenReached,
}

impl CacheStatus {
    /// Exactly one terminal event closes every refill
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CacheStatus::RequestImagesDone { .. } | CacheStatus::SkipFetchTargetUnseenReached
        )
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Error { description } => write!(f, "error: {description}"),
            CacheStatus::Requesting { path } => write!(f, "requesting {path}"),
            CacheStatus::RequestApiSuccess => write!(f, "catalog request succeeded"),
            CacheStatus::RequestImagesDone { succeeded } => {
                write!(f, "refill done, {succeeded} image(s) downloaded")
            }
            CacheStatus::SkipFetchTargetUnseenReached => {
                write!(f, "refill skipped, enough unseen images cached")
            }
        }
    }
}

#[derive(Clone)]
pub struct StatusChannel {
    sender: StatusSender,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, status: CacheStatus) {
        match &status {
            CacheStatus::Error { description } => error!("{}", description),
            other => debug!("Status: {}", other),
        }
        let _ = self.sender.send(status);
    }

    pub fn error(&self, description: impl Into<String>) {
        self.emit(CacheStatus::Error {
            description: description.into(),
        });
    }
}
