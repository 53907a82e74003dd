//! Status channel: the ordered event stream one submitter sees.
//!
//! A channel task merges two sources for a single job: events from the
//! executor (via [`ChannelSink`](super::sink::ChannelSink)) and periodic
//! position snapshots from the [`JobQueue`]. It ends when the job is
//! terminal or the client goes away; either way its timer goes with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use super::model::StatusEvent;
use super::queue::JobQueue;
use crate::config::ServerConfig;

/// Outbound buffer between the channel task and the transport.
const OUTBOUND_CAPACITY: usize = 64;

/// Timing knobs for a status channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub poll_interval: Duration,
    pub close_grace: Duration,
}

impl From<&ServerConfig> for ChannelConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            close_grace: config.close_grace,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

pub struct StatusChannel {
    queue: Arc<JobQueue>,
    job_id: Uuid,
    events: mpsc::UnboundedReceiver<StatusEvent>,
    out: mpsc::Sender<StatusEvent>,
    config: ChannelConfig,
}

impl StatusChannel {
    /// Spawn the channel task for `job_id` and return the client-facing stream.
    /// Dropping the stream counts as a client disconnect.
    pub fn open(
        queue: Arc<JobQueue>,
        job_id: Uuid,
        events: mpsc::UnboundedReceiver<StatusEvent>,
        config: ChannelConfig,
    ) -> ReceiverStream<StatusEvent> {
        let (out, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let channel = Self {
            queue,
            job_id,
            events,
            out,
            config,
        };
        tokio::spawn(channel.run());
        ReceiverStream::new(rx)
    }

    async fn run(mut self) {
        let job_id = self.job_id;
        let ack = StatusEvent::info(format!("Job {job_id} queued"));
        if self.out.send(ack).await.is_err() {
            return;
        }

        match self.relay().await {
            Exit::Disconnected => {
                debug!(job_id = %job_id, "Client disconnected, status channel released");
            }
            Exit::Drained => debug!(job_id = %job_id, "Status channel closed"),
            Exit::Terminal => {
                self.drain().await;
                debug!(job_id = %job_id, "Status channel closed after grace");
            }
        }
    }

    /// Forward executor events and position snapshots until something ends the stream.
    async fn relay(&mut self) -> Exit {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.out.closed() => return Exit::Disconnected,

                event = self.events.recv() => match event {
                    Some(event) => {
                        let terminal = event.is_terminal();
                        if self.out.send(event).await.is_err() {
                            return Exit::Disconnected;
                        }
                        // No positions after `done`/`error`.
                        if terminal {
                            return Exit::Terminal;
                        }
                    }
                    // Executor side is gone, so every event has been forwarded.
                    None => return Exit::Drained,
                },

                _ = ticker.tick() => {
                    let position = self.queue.position(self.job_id);
                    if position < 0 {
                        return Exit::Terminal;
                    }
                    let event = StatusEvent::Position { job_id: self.job_id, position };
                    if self.out.send(event).await.is_err() {
                        return Exit::Disconnected;
                    }
                }
            }
        }
    }

    /// Flush executor events that arrive within the grace window.
    async fn drain(&mut self) {
        let deadline = Instant::now() + self.config.close_grace;
        loop {
            tokio::select! {
                _ = self.out.closed() => return,
                _ = tokio::time::sleep_until(deadline) => return,
                event = self.events.recv() => match event {
                    Some(event) => {
                        if self.out.send(event).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                },
            }
        }
    }
}

enum Exit {
    Disconnected,
    Drained,
    Terminal,
}
