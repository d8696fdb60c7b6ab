use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::idle::IdleState;

/// Opaque browser tab identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

/// What the browser knows about a tab at the moment it was queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: TabId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

/// Lifecycle and idle events, applied strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TrackerEvent {
    /// A tab became the foreground tab.
    #[serde(rename_all = "camelCase")]
    Activate { tab_id: TabId },
    /// A tab finished (or progressed in) loading a new address.
    #[serde(rename_all = "camelCase")]
    Navigate {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        fav_icon_url: Option<String>,
        complete: bool,
        foreground: bool,
    },
    #[serde(rename_all = "camelCase")]
    Close { tab_id: TabId },
    IdleState { state: IdleState },
    #[serde(rename_all = "camelCase")]
    IdleTime { idle_seconds: u64 },
}
