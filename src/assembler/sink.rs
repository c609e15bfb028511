//! Output boundary of the assembler
//!
//! A completed [`EventBatch`] is handed to an [`OutputSink`] as one unit.
//! The decoder binary uses the bounded channel implementation, feeding a
//! separate sender task that owns the ZMQ PUB socket.

use tokio::sync::mpsc;

use crate::common::{Message, PipelineError, PipelineResult};
use crate::dataformat::EventBatch;

/// Receives one batch per completed cycle
pub trait OutputSink {
    fn publish(&mut self, batch: EventBatch) -> PipelineResult<()>;
}

/// Collects batches in memory
impl OutputSink for Vec<EventBatch> {
    fn publish(&mut self, batch: EventBatch) -> PipelineResult<()> {
        self.push(batch);
        Ok(())
    }
}

/// Forwards batches to a sender task without blocking
impl OutputSink for mpsc::Sender<Message> {
    fn publish(&mut self, batch: EventBatch) -> PipelineResult<()> {
        self.try_send(Message::data(batch)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PipelineError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => PipelineError::ChannelSend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<EventBatch> = Vec::new();
        sink.publish(EventBatch::new(1, 0)).unwrap();
        sink.publish(EventBatch::new(1, 1)).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].sequence_number, 1);
    }

    #[test]
    fn channel_sink_forwards() {
        let (mut tx, mut rx) = mpsc::channel::<Message>(2);
        tx.publish(EventBatch::new(5, 3)).unwrap();
        match tokio_test::block_on(rx.recv()) {
            Some(Message::Data(batch)) => {
                assert_eq!(batch.routing_id, 5);
                assert_eq!(batch.sequence_number, 3);
            }
            other => panic!("Expected Data message, got {:?}", other),
        }
    }

    #[test]
    fn channel_sink_full_and_closed() {
        let (mut tx, rx) = mpsc::channel::<Message>(1);
        tx.publish(EventBatch::new(0, 0)).unwrap();
        assert!(matches!(
            tx.publish(EventBatch::new(0, 1)),
            Err(PipelineError::ChannelFull)
        ));
        drop(rx);
        assert!(matches!(
            tx.publish(EventBatch::new(0, 2)),
            Err(PipelineError::ChannelSend)
        ));
    }
}
