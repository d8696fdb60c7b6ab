//! Collaborators the tracker consumes but does not implement. The host wires them to the browser,
//! tests wire them to mocks.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use super::{
    event::{TabId, TabSnapshot},
    idle::IdleState,
};

/// Answers questions about browser tabs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TabSource: Send + Sync {
    async fn tab(&self, id: TabId) -> Result<TabSnapshot>;

    /// The tab currently in the foreground, if any.
    async fn foreground_tab(&self) -> Result<Option<TabSnapshot>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdleSource: Send + Sync {
    /// Current idle state given the configured idle timeout.
    async fn query_state(&self, threshold: Duration) -> Result<IdleState>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Fire and forget notification sink.
#[cfg_attr(test, automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
