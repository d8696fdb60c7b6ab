use std::io;

use anyhow::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    bridge::HostCache,
    messages::{request_id, Inbound, Outbound, ResponseFrame},
};
use crate::{
    storage::StateStore,
    tracker::{command::Command, event::TrackerEvent, Tracker},
    utils::clock::Clock,
};

/// Single queue the host runs on: inbound frames and the periodic flush are handled strictly one
/// at a time.
pub struct TrackerModule<S: StateStore, I> {
    tracker: Tracker<S>,
    inbound: I,
    cache: HostCache,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
}

impl<S, I> TrackerModule<S, I>
where
    S: StateStore,
    I: Stream<Item = Result<Vec<u8>, io::Error>> + Unpin,
{
    pub fn new(
        tracker: Tracker<S>,
        inbound: I,
        cache: HostCache,
        outbound: mpsc::UnboundedSender<Outbound>,
        shutdown: CancellationToken,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            inbound,
            cache,
            outbound,
            shutdown,
            clock,
        }
    }

    /// Executes the host event loop until the browser disconnects or a shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        self.tracker.init().await;

        let interval = self.tracker.config().flush_interval;
        let mut collection_point = self.clock.instant() + interval;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down on request");
                    break;
                }
                frame = self.inbound.next() => match frame {
                    Some(Ok(frame)) => self.process_frame(&frame).await,
                    Some(Err(e)) => {
                        error!("Failed to read from the browser {e:?}");
                        break;
                    }
                    None => {
                        info!("Browser closed the connection");
                        break;
                    }
                },
                _ = self.clock.sleep_until(collection_point) => {
                    collection_point += interval;
                    // After a suspend, skip the missed ticks instead of replaying them.
                    let now = self.clock.instant();
                    if collection_point < now {
                        collection_point = now + interval;
                    }
                    self.tracker.tick().await;
                }
            }
        }

        self.tracker.shutdown().await;
        // Lets the signal listener finish when the browser went away first.
        self.shutdown.cancel();
        Ok(())
    }

    async fn process_frame(&mut self, frame: &[u8]) {
        let inbound = match serde_json::from_slice::<Inbound>(frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Malformed message from the browser {e}");
                if let Some(id) = request_id(frame) {
                    self.respond(ResponseFrame::error(Some(id), format!("Malformed message: {e}")));
                }
                return;
            }
        };

        match inbound {
            Inbound::Event { event, tab } => {
                self.cache.observe(&event, tab).await;
                self.tracker.handle_event(event).await;
            }
            Inbound::Sync {
                tabs,
                active_tab_id,
                idle,
            } => {
                self.cache.replace(tabs, active_tab_id, idle).await;
                if let Some(state) = idle {
                    self.tracker
                        .handle_event(TrackerEvent::IdleState { state })
                        .await;
                }
                if let Some(tab_id) = active_tab_id {
                    self.tracker
                        .handle_event(TrackerEvent::Activate { tab_id })
                        .await;
                }
            }
            Inbound::Command { id, command } => {
                let response = match serde_json::from_value::<Command>(command) {
                    Err(e) => {
                        warn!("Rejecting request {id} {e}");
                        ResponseFrame::error(Some(id), format!("Unknown action: {e}"))
                    }
                    Ok(command) => match self.tracker.execute(command).await {
                        Ok(reply) => ResponseFrame::success(id, reply),
                        Err(e) => {
                            warn!("Request {id} failed {e:?}");
                            ResponseFrame::error(Some(id), format!("{e:#}"))
                        }
                    },
                };
                self.respond(response);
            }
        }
    }

    fn respond(&self, response: ResponseFrame) {
        debug!("Responding {response:?}");
        if let Err(e) = self.outbound.send(Outbound::Response(response)) {
            error!("Failed to queue response {e:?}");
        }
    }
}
