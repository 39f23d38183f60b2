use super::event::Event;
use crate::sync::Arc;
use crossbeam::deque::{Injector, Steal, Worker};

/// A reader attached to an [super::EventChannel].
///
/// Consumers move events from the shared bus into a private FIFO queue in batches. An event that
/// one consumer fetched is never seen by another.
///
pub struct EventConsumer {
    bus: Arc<Injector<Event>>,
    local: Worker<Event>,
}

impl EventConsumer {
    pub(crate) fn new(bus: Arc<Injector<Event>>) -> Self {
        Self {
            bus,
            local: Worker::new_fifo(),
        }
    }

    /// Move the next batch of events from the bus into this consumer. Returns false when the bus
    /// had nothing to give.
    pub fn fetch(&self) -> bool {
        loop {
            match self.bus.steal_batch(&self.local) {
                Steal::Success(()) => return true,
                Steal::Empty => return false,
                Steal::Retry => continue,
            }
        }
    }

    pub fn pop(&self) -> Option<Event> {
        self.local.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && !self.fetch()
    }

    /// Read everything currently on the bus, in order.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = vec![];
        loop {
            while let Some(event) = self.pop() {
                events.push(event);
            }
            if !self.fetch() {
                return events;
            }
        }
    }
}

impl Iterator for &EventConsumer {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}
