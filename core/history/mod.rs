//! # Execution History
//!
//! Work identities and the persisted record of what every unit of work last did.
//!
mod entry;
mod error;
mod identity;
mod store;

pub use entry::*;
pub use error::*;
pub use identity::*;
pub use store::*;
