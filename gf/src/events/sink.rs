//! Where a run pushes its events

use tokio::sync::mpsc;
use tracing::debug;

use super::bus::EventEmitter;
use super::types::PipelineEvent;

/// Push interface for a run's events, in emission order
pub trait ProgressSink: Send + Sync {
    fn send(&self, event: PipelineEvent);
}

impl ProgressSink for EventEmitter {
    fn send(&self, event: PipelineEvent) {
        self.emit(event);
    }
}

impl ProgressSink for mpsc::UnboundedSender<PipelineEvent> {
    fn send(&self, event: PipelineEvent) {
        if mpsc::UnboundedSender::send(self, event).is_err() {
            debug!("ProgressSink::send: receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    #[tokio::test]
    async fn test_unbounded_sender_is_a_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: &dyn ProgressSink = &tx;
        sink.send(PipelineEvent::status("r", 0.1, "idea", 0));
        assert_eq!(rx.recv().await.unwrap().progress(), Some(0.1));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ProgressSink::send(&tx, PipelineEvent::status("r", 0.1, "idea", 0));
    }

    #[tokio::test]
    async fn test_emitter_is_a_sink() {
        let bus = EventBus::with_default_capacity();
        let mut rx = bus.subscribe();
        let sink: Box<dyn ProgressSink> = Box::new(bus.emitter_for("r"));
        sink.send(PipelineEvent::status("r", 1.0, "done", 5));
        assert_eq!(rx.recv().await.unwrap().token_count(), 5);
    }
}
