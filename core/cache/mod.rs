//! # Build Cache
//!
//! The [BuildCacheController] decides, once per cache key and build, whether outputs can be
//! loaded from a [LocalStore] or a [RemoteStore], and stores freshly produced outputs back into
//! them. Outputs travel between the workspace and the stores packed by the [EntryPacker].
//!
mod breaker;
mod controller;
mod error;
mod local;
mod packer;
mod remote;

pub use breaker::*;
pub use controller::*;
pub use error::*;
pub use local::*;
pub use packer::*;
pub use remote::*;
