//! Browser backed realizations of the tracker's collaborators. The browser cannot be queried
//! synchronously over native messaging, so the host keeps the latest view the extension reported
//! and answers from it.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use super::messages::Outbound;
use crate::tracker::{
    event::{TabId, TabSnapshot, TrackerEvent},
    idle::IdleState,
    sources::{IdleSource, Notification, Notifier, TabSource},
};

#[derive(Debug)]
struct CachedView {
    tabs: HashMap<TabId, TabSnapshot>,
    foreground: Option<TabId>,
    idle: IdleState,
}

impl Default for CachedView {
    fn default() -> Self {
        Self {
            tabs: HashMap::new(),
            foreground: None,
            idle: IdleState::Active,
        }
    }
}

/// Last known state of the browser's tabs and of the user's idleness.
#[derive(Debug, Clone, Default)]
pub struct HostCache {
    view: Arc<Mutex<CachedView>>,
}

impl HostCache {
    /// Replaces the whole view, used when the extension (re)connects.
    pub async fn replace(
        &self,
        tabs: Vec<TabSnapshot>,
        foreground: Option<TabId>,
        idle: Option<IdleState>,
    ) {
        let mut view = self.view.lock().await;
        view.tabs = tabs.into_iter().map(|tab| (tab.id, tab)).collect();
        view.foreground = foreground;
        if let Some(idle) = idle {
            view.idle = idle;
        }
        debug!("Synchronized {} tabs", view.tabs.len());
    }

    /// Applies what an event tells about the browser before the tracker sees it.
    pub async fn observe(&self, event: &TrackerEvent, tab: Option<TabSnapshot>) {
        let mut view = self.view.lock().await;
        if let Some(tab) = tab {
            view.tabs.insert(tab.id, tab);
        }

        match event {
            TrackerEvent::Activate { tab_id } => view.foreground = Some(*tab_id),
            TrackerEvent::Navigate {
                tab_id,
                url,
                title,
                fav_icon_url,
                ..
            } => {
                let tab = view.tabs.entry(*tab_id).or_insert_with(|| TabSnapshot {
                    id: *tab_id,
                    url: None,
                    title: None,
                    fav_icon_url: None,
                });
                tab.url = Some(url.clone());
                if title.is_some() {
                    tab.title = title.clone();
                }
                if fav_icon_url.is_some() {
                    tab.fav_icon_url = fav_icon_url.clone();
                }
            }
            TrackerEvent::Close { tab_id } => {
                view.tabs.remove(tab_id);
                if view.foreground == Some(*tab_id) {
                    view.foreground = None;
                }
            }
            TrackerEvent::IdleState { state } => view.idle = *state,
            TrackerEvent::IdleTime { .. } => {}
        }
    }
}

#[async_trait]
impl TabSource for HostCache {
    async fn tab(&self, id: TabId) -> Result<TabSnapshot> {
        self.view
            .lock()
            .await
            .tabs
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("The browser never reported {id}"))
    }

    async fn foreground_tab(&self) -> Result<Option<TabSnapshot>> {
        let view = self.view.lock().await;
        Ok(view.foreground.and_then(|id| view.tabs.get(&id).cloned()))
    }
}

#[async_trait]
impl IdleSource for HostCache {
    async fn query_state(&self, _threshold: Duration) -> Result<IdleState> {
        Ok(self.view.lock().await.idle)
    }
}

/// Forwards notifications to the browser as outbound frames. The queue is unbounded so a
/// notification is never dropped while the writer is busy.
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.sender.send(Outbound::Notification(notification)) {
            error!("Failed to queue notification {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tokio::sync::mpsc;

    use super::{ChannelNotifier, HostCache};
    use crate::{
        host::messages::Outbound,
        tracker::{
            event::{TabId, TabSnapshot, TrackerEvent},
            idle::IdleState,
            sources::{IdleSource, Notification, Notifier, TabSource},
        },
    };

    fn tab(id: i64, url: &str) -> TabSnapshot {
        TabSnapshot {
            id: TabId(id),
            url: Some(url.into()),
            title: None,
            fav_icon_url: None,
        }
    }

    #[tokio::test]
    async fn test_cache_follows_events() -> Result<()> {
        let cache = HostCache::default();
        cache
            .replace(vec![tab(1, "https://a.com"), tab(2, "https://b.com")], Some(TabId(1)), None)
            .await;
        assert_eq!(cache.foreground_tab().await?, Some(tab(1, "https://a.com")));

        cache
            .observe(&TrackerEvent::Activate { tab_id: TabId(2) }, None)
            .await;
        cache
            .observe(
                &TrackerEvent::Navigate {
                    tab_id: TabId(2),
                    url: "https://c.com".into(),
                    title: Some("C".into()),
                    fav_icon_url: None,
                    complete: true,
                    foreground: true,
                },
                None,
            )
            .await;
        let foreground = cache.foreground_tab().await?.unwrap();
        assert_eq!(foreground.url.as_deref(), Some("https://c.com"));
        assert_eq!(foreground.title.as_deref(), Some("C"));

        cache
            .observe(&TrackerEvent::Close { tab_id: TabId(2) }, None)
            .await;
        assert_eq!(cache.foreground_tab().await?, None);
        assert!(cache.tab(TabId(2)).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_reports_idle_state() -> Result<()> {
        let cache = HostCache::default();
        let threshold = std::time::Duration::from_secs(60);
        assert_eq!(cache.query_state(threshold).await?, IdleState::Active);
        cache
            .observe(
                &TrackerEvent::IdleState {
                    state: IdleState::Locked,
                },
                None,
            )
            .await;
        assert_eq!(cache.query_state(threshold).await?, IdleState::Locked);
        Ok(())
    }

    #[tokio::test]
    async fn test_notifier_queues_frame() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let notifier = ChannelNotifier::new(sender);
        let notification = Notification {
            title: "Time Limit Reached".into(),
            message: "m".into(),
        };
        notifier.notify(notification.clone());
        assert_eq!(
            receiver.recv().await,
            Some(Outbound::Notification(notification))
        );
    }

    #[tokio::test]
    async fn test_notifier_keeps_every_frame_while_writer_is_behind() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let notifier = ChannelNotifier::new(sender);
        for i in 0..100 {
            notifier.notify(Notification {
                title: "Time Limit Reached".into(),
                message: format!("site{i}.com"),
            });
        }
        drop(notifier);

        let mut received = Vec::new();
        while let Some(frame) = receiver.recv().await {
            received.push(frame);
        }
        assert_eq!(received.len(), 100);
        assert_eq!(
            received[99],
            Outbound::Notification(Notification {
                title: "Time Limit Reached".into(),
                message: "site99.com".into(),
            })
        );
    }
}
