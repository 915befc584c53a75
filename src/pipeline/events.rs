//! Event fan-out to async consumers.
//!
//! [`EventChannel`] is an [`EventReceiver`] that broadcasts every event it
//! receives, so a session can hand it to a pipeline and await events from
//! any number of tasks.

use crate::error::Error;
use crate::event::{Event, EventReceiver, EventType};
use tokio::sync::broadcast;

/// Broadcasting event receiver.
#[derive(Clone)]
pub struct EventChannel {
    sender: broadcast::Sender<Event>,
}

impl EventChannel {
    /// Create a channel buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast an event.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn send(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Create a subscription.
    ///
    /// Subscribers only see events sent after they subscribed.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventReceiver for EventChannel {
    fn on_event(&self, event: Event) {
        self.send(event);
    }
}

/// One consumer's view of an [`EventChannel`].
pub struct EventSubscription {
    receiver: broadcast::Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// Returns `None` once the channel is dropped. Events missed because
    /// the subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait until a `Ready` event arrives.
    ///
    /// Returns the carried code if an `Error` event arrives first, or
    /// [`Error::Unknown`] if the channel closes.
    pub async fn wait_ready(&mut self) -> Result<Event, Error> {
        while let Some(event) = self.recv().await {
            match event.event_type {
                EventType::Ready => return Ok(event),
                EventType::Error => return Err(event.error_code().unwrap_or(Error::Unknown)),
                _ => continue,
            }
        }
        Err(Error::Unknown)
    }
}
