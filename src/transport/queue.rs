//! Thread-safe message queues decoupling network I/O from application logic.
//!
//! Two independent FIFO queues, incoming and outgoing. Producers (receive
//! loops, the UI) enqueue without blocking; consumers block in `dequeue`
//! until an item arrives or the queues are closed. Closing is idempotent and
//! wakes every blocked consumer so shutdown never leaves a task hanging.
//!
//! Matching the classic blocking-collection contract, a closed queue still
//! drains items that were enqueued before the close; the closed signal is
//! returned only once the queue is empty.

use crate::transport::Message;
use crate::utils::{MessengerError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// One direction of message flow
struct Channel {
    state: Mutex<ChannelState>,
    notify: Notify,
}

struct ChannelState {
    items: VecDeque<Message>,
    closed: bool,
}

impl Channel {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn enqueue(&self, message: Message) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.closed {
                log::debug!("dropping message {} enqueued after close", message.id);
                return;
            }
            state.items.push_back(message);
        }
        self.notify.notify_waiters();
    }

    async fn dequeue(&self) -> Result<Message> {
        loop {
            // Register for notification before checking the queue so an
            // enqueue between the check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("queue lock poisoned");
                if let Some(message) = state.items.pop_front() {
                    return Ok(message);
                }
                if state.closed {
                    return Err(MessengerError::QueueClosed);
                }
            }

            notified.await;
        }
    }

    fn try_dequeue(&self) -> Option<Message> {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .items
            .pop_front()
    }

    fn count(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").items.len()
    }

    fn close(&self) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().expect("queue lock poisoned").closed
    }
}

/// Paired incoming/outgoing message queues
pub struct MessageQueue {
    incoming: Channel,
    outgoing: Channel,
}

impl MessageQueue {
    /// Create a new pair of open queues
    pub fn new() -> Self {
        Self {
            incoming: Channel::new(),
            outgoing: Channel::new(),
        }
    }

    /// Enqueue a message received from the network
    pub fn enqueue_incoming(&self, message: Message) {
        self.incoming.enqueue(message);
    }

    /// Dequeue an incoming message, waiting until one is available.
    ///
    /// # Errors
    ///
    /// [`MessengerError::QueueClosed`] once the queues are closed and drained.
    pub async fn dequeue_incoming(&self) -> Result<Message> {
        self.incoming.dequeue().await
    }

    /// Take an incoming message without waiting
    pub fn try_dequeue_incoming(&self) -> Option<Message> {
        self.incoming.try_dequeue()
    }

    /// Number of incoming messages waiting to be processed
    pub fn incoming_count(&self) -> usize {
        self.incoming.count()
    }

    /// Enqueue a message to be sent to the network
    pub fn enqueue_outgoing(&self, message: Message) {
        self.outgoing.enqueue(message);
    }

    /// Dequeue an outgoing message, waiting until one is available.
    ///
    /// # Errors
    ///
    /// [`MessengerError::QueueClosed`] once the queues are closed and drained.
    pub async fn dequeue_outgoing(&self) -> Result<Message> {
        self.outgoing.dequeue().await
    }

    /// Take an outgoing message without waiting
    pub fn try_dequeue_outgoing(&self) -> Option<Message> {
        self.outgoing.try_dequeue()
    }

    /// Number of outgoing messages waiting to be sent
    pub fn outgoing_count(&self) -> usize {
        self.outgoing.count()
    }

    /// Close both queues, waking every blocked consumer. Idempotent.
    pub fn close(&self) {
        self.incoming.close();
        self.outgoing.close();
    }

    /// Whether the queues have been closed
    pub fn is_closed(&self) -> bool {
        self.incoming.is_closed()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MessageQueue::new();
        for i in 0..10 {
            queue.enqueue_incoming(Message::new_chat("alice", format!("msg-{i}")));
        }

        for i in 0..10 {
            let message = queue.dequeue_incoming().await.unwrap();
            assert_eq!(message.content, format!("msg-{i}"));
        }
        assert_eq!(queue.incoming_count(), 0);
    }

    #[tokio::test]
    async fn test_directions_are_independent() {
        let queue = MessageQueue::new();
        queue.enqueue_incoming(Message::new_chat("alice", "in"));
        queue.enqueue_outgoing(Message::new_chat("me", "out"));

        assert_eq!(queue.incoming_count(), 1);
        assert_eq!(queue.outgoing_count(), 1);
        assert_eq!(queue.dequeue_incoming().await.unwrap().content, "in");
        assert_eq!(queue.dequeue_outgoing().await.unwrap().content, "out");
    }

    #[tokio::test]
    async fn test_try_dequeue_does_not_block() {
        let queue = MessageQueue::new();
        assert!(queue.try_dequeue_incoming().is_none());

        queue.enqueue_incoming(Message::new_chat("alice", "hi"));
        assert!(queue.try_dequeue_incoming().is_some());
        assert!(queue.try_dequeue_incoming().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_blocks_until_enqueue() {
        let queue = Arc::new(MessageQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue_incoming().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.enqueue_incoming(Message::new_chat("alice", "wake up"));

        let message = timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(message.content, "wake up");
    }

    #[tokio::test]
    async fn test_close_wakes_all_blocked_consumers() {
        let queue = Arc::new(MessageQueue::new());

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move { queue.dequeue_incoming().await }));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.close();

        for consumer in consumers {
            let result = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
            assert!(matches!(result, Err(MessengerError::QueueClosed)));
        }
    }

    #[tokio::test]
    async fn test_close_drains_remaining_items_first() {
        let queue = MessageQueue::new();
        queue.enqueue_incoming(Message::new_chat("alice", "before close"));
        queue.close();

        let message = queue.dequeue_incoming().await.unwrap();
        assert_eq!(message.content, "before close");
        assert!(matches!(
            queue.dequeue_incoming().await,
            Err(MessengerError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let queue = MessageQueue::new();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(
            queue.dequeue_outgoing().await,
            Err(MessengerError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_dropped() {
        let queue = MessageQueue::new();
        queue.close();
        queue.enqueue_incoming(Message::new_chat("alice", "late"));
        assert_eq!(queue.incoming_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers_consumers() {
        let queue = Arc::new(MessageQueue::new());
        let total = 100usize;

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for i in 0..(total / 4) {
                    queue.enqueue_incoming(Message::new_chat("p", format!("{p}-{i}")));
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..2 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut seen = 0usize;
                while queue.dequeue_incoming().await.is_ok() {
                    seen += 1;
                }
                seen
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        // Give consumers a chance to drain before closing
        while queue.incoming_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        queue.close();

        let mut seen = 0usize;
        for consumer in consumers {
            seen += timeout(Duration::from_secs(2), consumer).await.unwrap().unwrap();
        }
        assert_eq!(seen, total);
    }
}
