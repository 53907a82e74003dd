//! Event sinks: where a running job writes its status events.

use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use super::model::StatusEvent;

/// Destination for the events a job produces while it runs.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// Forwards events into the submitting client's status channel.
pub struct ChannelSink {
    job_id: Uuid,
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its status channel reads from.
    pub fn new(job_id: Uuid) -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { job_id, tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StatusEvent) {
        // The client may have gone away; the job keeps running regardless.
        if self.tx.send(event).is_err() {
            trace!(job_id = %self.job_id, "Status channel closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new(Uuid::new_v4());
        sink.emit(StatusEvent::info("one"));
        sink.emit(StatusEvent::Done { count: 0 });
        drop(sink);

        assert_eq!(rx.recv().await, Some(StatusEvent::info("one")));
        assert_eq!(rx.recv().await, Some(StatusEvent::Done { count: 0 }));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelSink::new(Uuid::new_v4());
        drop(rx);
        sink.emit(StatusEvent::info("nobody listening"));
    }
}
