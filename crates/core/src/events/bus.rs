use std::sync::Arc;
use tokio::sync::broadcast;

/// In-process event bus backed by `tokio::broadcast`.
///
/// Delivery is best effort: publishing with no subscribers is not an error
/// for callers that ignore the returned count, and slow receivers may lag.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: Arc<broadcast::Sender<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<E: Clone> EventBus<E> {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.sender.send(event)
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(1024)
    }
}
