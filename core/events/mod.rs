//! # Build events
//!
//! Everything that happens during a build session that a reporter might care about: the build
//! starting and stopping, nodes being picked up and finished, and the cache going to the local
//! and remote stores.
//!
//! Events carry only owned strings and plain values. The engine writes to an [EventChannel] and
//! never reads back from it.
//!
mod channel;
mod consumer;
pub mod event;

pub use channel::*;
pub use consumer::*;
pub use event::*;
