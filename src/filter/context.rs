//! Filter init context.
//!
//! The context is handed to a filter when it joins a pipeline and carries
//! the non-owning references the filter keeps for the rest of its life.

use crate::event::EventReceiver;
use crate::filter::{Filter, FilterCallback};
use std::sync::{Arc, Weak};

/// Context passed to [`Filter::init`].
#[derive(Clone)]
pub struct InitContext {
    /// The filter being initialized, as shared by its owner.
    filter: Weak<dyn Filter>,
    /// Where the filter sends events (usually its pipeline).
    receiver: Option<Weak<dyn EventReceiver>>,
    /// Where the filter reports structural changes.
    callback: Option<Weak<dyn FilterCallback>>,
}

impl InitContext {
    /// Create a context for `filter` with no receiver or callback.
    pub fn new(filter: &Arc<dyn Filter>) -> Self {
        Self {
            filter: Arc::downgrade(filter),
            receiver: None,
            callback: None,
        }
    }

    /// Set the event receiver.
    pub fn with_receiver(mut self, receiver: Weak<dyn EventReceiver>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Set the structural callback.
    pub fn with_callback(mut self, callback: Weak<dyn FilterCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Get the filter handle.
    pub fn filter(&self) -> &Weak<dyn Filter> {
        &self.filter
    }

    /// Get the event receiver.
    pub fn receiver(&self) -> Option<&Weak<dyn EventReceiver>> {
        self.receiver.as_ref()
    }

    /// Get the structural callback.
    pub fn callback(&self) -> Option<&Weak<dyn FilterCallback>> {
        self.callback.as_ref()
    }
}

impl std::fmt::Debug for InitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitContext")
            .field("filter_alive", &(self.filter.strong_count() > 0))
            .field("has_receiver", &self.receiver.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
