use crate::communication::traits::{Publisher, Subscriber};
use crate::error::{BonsaiError, BonsaiResult};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lock-free atomic metrics for Hub monitoring
#[derive(Debug, Default)]
pub struct AtomicHubMetrics {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub send_failures: AtomicU64,
}

impl AtomicHubMetrics {
    /// Get current metrics snapshot (for monitoring/debugging)
    pub fn snapshot(&self) -> HubMetrics {
        HubMetrics {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub send_failures: u64,
}

struct HubInner<T> {
    topic_name: String,
    capacity: usize,
    subscribers: Mutex<Vec<Sender<T>>>,
    metrics: AtomicHubMetrics,
}

/// In-process publish/subscribe topic.
///
/// Every subscriber gets its own bounded queue; `send` clones the message into
/// each of them. A full subscriber queue counts as a send failure for that
/// subscriber only.
pub struct Hub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("topic_name", &self.inner.topic_name)
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    /// Create a new Hub
    pub fn new(topic_name: &str) -> Self {
        Self::new_with_capacity(topic_name, 1024)
    }

    /// Create a new Hub with custom per-subscriber capacity
    pub fn new_with_capacity(topic_name: &str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topic_name: topic_name.to_string(),
                capacity: capacity.max(1),
                subscribers: Mutex::new(Vec::new()),
                metrics: AtomicHubMetrics::default(),
            }),
        }
    }

    pub fn topic_name(&self) -> &str {
        &self.inner.topic_name
    }

    /// Register a new subscriber. Only messages sent afterwards are delivered.
    pub fn subscribe(&self) -> HubSubscriber<T> {
        let (tx, rx) = channel::bounded(self.inner.capacity);
        self.inner.subscribers.lock().push(tx);
        HubSubscriber {
            topic_name: self.inner.topic_name.clone(),
            rx,
            inner: self.inner.clone(),
        }
    }

    /// Publish to all live subscribers. Returns how many received the message.
    pub fn send(&self, msg: T) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(msg.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.inner
                    .metrics
                    .send_failures
                    .fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        self.inner
            .metrics
            .messages_sent
            .fetch_add(1, Ordering::Relaxed);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn metrics(&self) -> HubMetrics {
        self.inner.metrics.snapshot()
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> Publisher<T> for Hub<T> {
    fn send(&self, msg: T) -> BonsaiResult<()> {
        if Hub::send(self, msg) == 0 && self.subscriber_count() > 0 {
            return Err(BonsaiError::internal(format!(
                "No subscriber of '{}' accepted the message",
                self.topic_name()
            )));
        }
        Ok(())
    }
}

/// Receiving end of a [`Hub`].
pub struct HubSubscriber<T> {
    topic_name: String,
    rx: Receiver<T>,
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for HubSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            topic_name: self.topic_name.clone(),
            rx: self.rx.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for HubSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSubscriber")
            .field("topic_name", &self.topic_name)
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl<T> HubSubscriber<T> {
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    fn count_received(&self) {
        self.inner
            .metrics
            .messages_received
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Receive without blocking
    pub fn recv(&self) -> Option<T> {
        let msg = self.rx.try_recv().ok()?;
        self.count_received();
        Some(msg)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let msg = self.rx.recv_timeout(timeout).ok()?;
        self.count_received();
        Some(msg)
    }

    /// Drain everything currently queued.
    pub fn try_iter(&self) -> Vec<T> {
        let drained: Vec<T> = self.rx.try_iter().collect();
        for _ in &drained {
            self.count_received();
        }
        drained
    }

    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Keep only the newest queued message.
    pub fn latest(&self) -> Option<T> {
        self.try_iter().pop()
    }
}

impl<T: Send + Sync + std::fmt::Debug> Subscriber<T> for HubSubscriber<T> {
    fn recv(&self) -> Option<T> {
        HubSubscriber::recv(self)
    }

    fn has_messages(&self) -> bool {
        self.has_pending()
    }
}
