use super::event::Event;
use super::EventConsumer;
use crate::sync::Arc;
use crossbeam::deque::Injector;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// The event bus of a build session.
///
/// Every subsystem (the workers, the cache controller, the drive) holds a clone of the same
/// channel and pushes onto it without locking. Readers attach with [EventChannel::consumer].
///
#[derive(Clone, Default)]
pub struct EventChannel {
    bus: Arc<Injector<Event>>,
    sent: Arc<AtomicUsize>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether there are events on the bus that no consumer has fetched yet.
    pub fn is_empty(&self) -> bool {
        self.bus.is_empty()
    }

    /// How many events have been sent over the lifetime of this channel.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn send<E>(&self, event: E)
    where
        E: Into<Event>,
    {
        let event = event.into();
        trace!("event: {:?}", event);
        self.bus.push(event);
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consumer(&self) -> EventConsumer {
        EventConsumer::new(self.bus.clone())
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("pending", &self.bus.len())
            .field("sent", &self.sent())
            .finish()
    }
}
