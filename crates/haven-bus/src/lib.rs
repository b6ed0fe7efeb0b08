//! The Message Bus: two FIFO queues (inbound, outbound) connecting channel
//! supervisors to the agent loop. Not persisted — in-flight messages at
//! shutdown are dropped, matching the spec's own non-guarantee.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use haven_core::{InboundMessage, OutboundMessage};

const CONSUME_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// One direction of the bus: a cloneable sender plus a single-consumer
/// receiver guarded by a mutex so `consume` can take `&self`.
struct Queue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> Queue<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn publish(&self, msg: T) {
        // Unbounded: send never blocks the producer. A closed receiver
        // (shutdown mid-flight) means the message is silently dropped,
        // matching the bus's no-delivery-guarantee contract.
        let _ = self.tx.send(msg);
    }

    /// Wait for the next message, polling `cancelled` roughly once a
    /// second so callers can react to a shutdown signal without a
    /// dedicated cancellation channel per queue.
    async fn consume(&self, cancelled: impl Fn() -> bool) -> Option<T> {
        let mut rx = self.rx.lock().await;
        loop {
            tokio::select! {
                msg = rx.recv() => return msg,
                _ = tokio::time::sleep(CONSUME_POLL_INTERVAL) => {
                    if cancelled() {
                        return None;
                    }
                }
            }
        }
    }
}

/// Shared bus connecting channel supervisors (producers of inbound,
/// consumers of outbound) to the agent loop (consumer of inbound,
/// producer of outbound).
pub struct MessageBus {
    inbound: Queue<InboundMessage>,
    outbound: Queue<OutboundMessage>,
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inbound: Queue::new(),
            outbound: Queue::new(),
        })
    }

    pub fn publish_inbound(&self, msg: InboundMessage) {
        self.inbound.publish(msg);
    }

    pub fn publish_outbound(&self, msg: OutboundMessage) {
        self.outbound.publish(msg);
    }

    /// Consumed by the agent loop. `cancelled` is typically a closure over
    /// a `watch::Receiver<bool>` running flag.
    pub async fn consume_inbound(&self, cancelled: impl Fn() -> bool) -> Option<InboundMessage> {
        self.inbound.consume(cancelled).await
    }

    /// Consumed by the channel manager's outbound dispatcher.
    pub async fn consume_outbound(&self, cancelled: impl Fn() -> bool) -> Option<OutboundMessage> {
        self.outbound.consume(cancelled).await
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self {
            inbound: Queue::new(),
            outbound: Queue::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_consume_inbound_round_trips() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage {
            channel: "cli".to_string(),
            sender_id: "u1".to_string(),
            chat_id: "c1".to_string(),
            content: "hi".to_string(),
            media: vec![],
            metadata: Default::default(),
        });
        let msg = bus.consume_inbound(|| false).await.unwrap();
        assert_eq!(msg.content, "hi");
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let bus = MessageBus::new();
        for i in 0..3 {
            bus.publish_outbound(OutboundMessage::text("cli", "c1", format!("msg{i}")));
        }
        for i in 0..3 {
            let msg = bus.consume_outbound(|| false).await.unwrap();
            assert_eq!(msg.content, format!("msg{i}"));
        }
    }

    #[tokio::test]
    async fn consume_returns_none_once_cancelled_and_empty() {
        let bus = MessageBus::new();
        let msg = bus.consume_inbound(|| true).await;
        assert!(msg.is_none());
    }
}
