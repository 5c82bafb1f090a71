use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::message::Message;

/// Result of a drain: everything that was queued, in FIFO order, or the
/// signal that the queue is closed and empty and the consumer can stop.
#[derive(Debug, PartialEq, Eq)]
pub enum Drained {
    Batch(Vec<Message>),
    Closed,
}

/// An unbounded FIFO handoff between one producer and one consumer.
///
/// Producers push without waiting. The consumer takes everything queued in
/// one batch and sleeps while the queue is empty. Closing wakes the
/// consumer and rejects later pushes, but messages queued before the close
/// are still delivered, so a final message followed by a close is never
/// lost.
pub struct MessageQueue {
    inner: Mutex<Inner>,
    available: Notify,
}

struct Inner {
    items: VecDeque<Message>,
    closed: bool,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Enqueues a message and wakes the consumer. Hands the message back if
    /// the queue is already closed.
    pub async fn push(&self, message: Message) -> Result<(), Message> {
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(message);
            }
            inner.items.push_back(message);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Takes every queued message at once, waiting if there are none yet.
    /// Returns [`Drained::Closed`] once the queue is closed and empty.
    pub async fn drain_all(&self) -> Drained {
        loop {
            // Register interest before checking state so a push or close
            // landing in between cannot be missed.
            let available = self.available.notified();
            {
                let mut inner = self.inner.lock().await;
                if !inner.items.is_empty() {
                    return Drained::Batch(inner.items.drain(..).collect());
                }
                if inner.closed {
                    return Drained::Closed;
                }
            }
            available.await;
        }
    }

    /// Closes the queue and wakes the consumer. Already-queued messages are
    /// still drained; only new pushes are rejected. Idempotent.
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
        self.available.notify_one();
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Number of messages currently waiting. Diagnostics only.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
