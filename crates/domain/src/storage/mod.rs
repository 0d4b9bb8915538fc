//! Persistence contracts consumed by the monitor and satisfied by the storage
//! crate.

mod traits;

pub use traits::*;
