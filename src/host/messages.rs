use serde::{Deserialize, Serialize};

use crate::tracker::{
    command::Reply,
    event::{TabId, TabSnapshot, TrackerEvent},
    idle::IdleState,
    sources::Notification,
};

/// Messages the browser extension sends to the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// A lifecycle or idle event. `tab` carries what the extension knows about the tab involved.
    Event {
        #[serde(flatten)]
        event: TrackerEvent,
        #[serde(default)]
        tab: Option<TabSnapshot>,
    },
    /// Full view of the open tabs, sent when the extension connects.
    #[serde(rename_all = "camelCase")]
    Sync {
        tabs: Vec<TabSnapshot>,
        #[serde(default)]
        active_tab_id: Option<TabId>,
        #[serde(default)]
        idle: Option<IdleState>,
    },
    /// A user interface request. The command is decoded separately so unknown actions still get a
    /// response with the right id.
    Command {
        id: u64,
        command: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Reply(Reply),
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub status: ResponseStatus,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl ResponseFrame {
    pub fn success(id: u64, reply: Reply) -> Self {
        Self {
            id: Some(id),
            status: ResponseStatus::Success,
            body: ResponseBody::Reply(reply),
        }
    }

    pub fn error(id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            body: ResponseBody::Error {
                error: error.into(),
            },
        }
    }
}

/// Messages the host sends to the browser extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    Response(ResponseFrame),
    Notification(Notification),
}

/// Best effort extraction of the request id of a frame that failed to decode.
pub fn request_id(frame: &[u8]) -> Option<u64> {
    serde_json::from_slice::<serde_json::Value>(frame)
        .ok()?
        .get("id")?
        .as_u64()
}
