use std::{io, path::PathBuf};

use anyhow::Result;
use bridge::{ChannelNotifier, HostCache};
use futures::Stream;
use messages::Outbound;
use module::TrackerModule;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    storage::{json_store::JsonFileStore, StateStore},
    tracker::{Collaborators, Tracker, TrackerConfig},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod bridge;
pub mod framing;
pub mod messages;
pub mod module;
pub mod shutdown;

/// Represents the starting point for the host. Talks to the browser over stdin and stdout.
pub async fn start_host(dir: PathBuf, config: TrackerConfig) -> Result<()> {
    info!("Starting host in {dir:?} with {config:?}");
    let store = JsonFileStore::new(dir)?;

    let (sender, receiver) = mpsc::unbounded_channel::<Outbound>();
    let shutdown_token = CancellationToken::new();
    let inbound = Box::pin(framing::read_frames(tokio::io::stdin()));

    let module = create_module(
        store,
        inbound,
        sender,
        &shutdown_token,
        DefaultClock,
        config,
    );

    let (_, module_result, writer_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        module.run(),
        framing::write_frames(tokio::io::stdout(), receiver),
    );

    if let Err(module_result) = module_result {
        error!("Tracker module got an error {:?}", module_result);
    }

    if let Err(writer_result) = writer_result {
        error!("Writer got an error {:?}", writer_result);
    }

    Ok(())
}

fn create_module<S, I>(
    store: S,
    inbound: I,
    sender: mpsc::UnboundedSender<Outbound>,
    shutdown_token: &CancellationToken,
    clock: impl Clock + Clone,
    config: TrackerConfig,
) -> TrackerModule<S, I>
where
    S: StateStore,
    I: Stream<Item = Result<Vec<u8>, io::Error>> + Unpin,
{
    let cache = HostCache::default();
    let tracker = Tracker::new(
        store,
        Collaborators {
            clock: Box::new(clock.clone()),
            tabs: Box::new(cache.clone()),
            idle: Box::new(cache.clone()),
            notifier: Box::new(ChannelNotifier::new(sender.clone())),
        },
        config,
    );
    TrackerModule::new(
        tracker,
        inbound,
        cache,
        sender,
        shutdown_token.clone(),
        Box::new(clock),
    )
}

#[cfg(test)]
mod host_tests {
    use std::{io, sync::Arc, time::Duration};

    use anyhow::Result;
    use futures::{stream, StreamExt};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::create_module;
    use crate::{
        host::messages::Outbound,
        storage::{memory::MemoryStore, StoredState},
        tracker::{test_support::TEST_START_DATE, TrackerConfig},
        utils::{clock::ManualClock, logging::TEST_LOGGING},
    };

    /// Each step moves the clock by some seconds and then delivers a frame.
    fn script(
        clock: &ManualClock,
        steps: Vec<(i64, Value)>,
    ) -> impl futures::Stream<Item = Result<Vec<u8>, io::Error>> + Unpin {
        let clock = clock.clone();
        stream::iter(steps).map(move |(seconds, frame)| {
            clock.advance(seconds);
            Ok(serde_json::to_vec(&frame).unwrap())
        })
    }

    fn sync_on(url: &str) -> Value {
        json!({"type": "sync", "tabs": [{"id": 1, "url": url}], "activeTabId": 1})
    }

    async fn run_script(
        state: StoredState,
        steps: Vec<(i64, Value)>,
    ) -> Result<(Arc<MemoryStore>, Vec<Value>)> {
        *TEST_LOGGING;
        let clock = ManualClock::starting_at(TEST_START_DATE);
        let store = Arc::new(MemoryStore::with_state(state));
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let shutdown_token = CancellationToken::new();

        let module = create_module(
            store.clone(),
            script(&clock, steps),
            sender,
            &shutdown_token,
            clock.clone(),
            TrackerConfig::default(),
        );
        module.run().await?;
        assert!(shutdown_token.is_cancelled());

        let mut frames = Vec::new();
        while let Some(frame) = receiver.recv().await {
            frames.push(serde_json::to_value(&frame)?);
        }
        Ok((store, frames))
    }

    #[tokio::test]
    async fn test_disconnect_flushes_and_saves() -> Result<()> {
        let (store, frames) = run_script(
            StoredState::default(),
            vec![(0, sync_on("https://a.com")), (7, json!({"type": "event", "event": "close", "tabId": 99}))],
        )
        .await?;

        assert!(frames.is_empty());
        let state = store.snapshot().await;
        assert_eq!(state.history[&TEST_START_DATE.date()]["a.com"], 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_commands_get_responses() -> Result<()> {
        let (_, frames) = run_script(
            StoredState::default(),
            vec![
                (0, sync_on("https://www.a.com/page")),
                (20, json!({"type": "command", "id": 1, "command": {"action": "getHistory"}})),
                (0, json!({"type": "command", "id": 2, "command": {"action": "launchRockets"}})),
                (0, json!({"type": "command", "id": 3, "command": {"action": "setLimit", "domain": "a.com", "seconds": 0}})),
            ],
        )
        .await?;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[0]["status"], "success");
        assert_eq!(frames[0]["history"]["2018-07-04"]["a.com"], 20);
        assert_eq!(frames[0]["analytics"]["totalTimeToday"], 20);

        assert_eq!(frames[1]["id"], 2);
        assert_eq!(frames[1]["status"], "error");
        assert!(frames[1]["error"]
            .as_str()
            .unwrap()
            .starts_with("Unknown action"));

        assert_eq!(frames[2]["id"], 3);
        assert_eq!(frames[2]["status"], "error");
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_stop_the_host() -> Result<()> {
        let (_, frames) = run_script(
            StoredState::default(),
            vec![
                (0, json!({"type": "command", "id": 5})),
                (0, json!({"garbage": true})),
                (0, json!({"type": "command", "id": 6, "command": {"action": "ping"}})),
            ],
        )
        .await?;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], 5);
        assert_eq!(frames[0]["status"], "error");
        assert_eq!(frames[1]["id"], 6);
        assert_eq!(frames[1]["message"], "Tracker active");
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_notification_is_forwarded() -> Result<()> {
        let mut state = StoredState::default();
        state.settings.enable_time_limits = true;
        state.limits.insert("a.com".into(), 60);

        let (_, frames) = run_script(
            state,
            vec![
                (0, sync_on("https://a.com")),
                (61, json!({"type": "command", "id": 1, "command": {"action": "ping"}})),
            ],
        )
        .await?;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "notification");
        assert_eq!(frames[0]["title"], "Time Limit Reached");
        assert_eq!(frames[0]["message"], "You've reached your 1m limit for a.com.");
        assert_eq!(frames[1]["type"], "response");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_persists() -> Result<()> {
        *TEST_LOGGING;
        let clock = ManualClock::starting_at(TEST_START_DATE);
        let store = Arc::new(MemoryStore::default());
        let (sender, _receiver) = mpsc::unbounded_channel();
        let (frames, inbound) = futures::channel::mpsc::unbounded::<Result<Vec<u8>, io::Error>>();
        let shutdown_token = CancellationToken::new();

        let module = create_module(
            store.clone(),
            inbound,
            sender,
            &shutdown_token,
            clock.clone(),
            TrackerConfig {
                min_flush: Duration::from_secs(15),
                flush_interval: Duration::from_secs(30),
            },
        );

        let driver = async {
            frames.unbounded_send(Ok(serde_json::to_vec(&sync_on("https://a.com"))?))?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            clock.advance(20);
            // Lands after the first tick at 30s.
            tokio::time::sleep(Duration::from_secs(40)).await;
            let state = store.snapshot().await;
            assert_eq!(state.history[&TEST_START_DATE.date()]["a.com"], 20);
            assert_eq!(store.save_count(), 1);
            shutdown_token.cancel();
            Ok::<_, anyhow::Error>(())
        };

        let (module_result, driver_result) = tokio::join!(module.run(), driver);
        module_result?;
        driver_result?;
        Ok(())
    }
}
