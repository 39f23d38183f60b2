mod implementation;
mod origin;
mod outcome;
mod property;
mod unit_of_work;
mod work_id;

pub use implementation::*;
pub use origin::*;
pub use outcome::*;
pub use property::*;
pub use unit_of_work::*;
pub use work_id::*;
