//! Configuration and persistence
//!
//! Board-agnostic tunables plus the postcard codec for records kept in
//! flash.

pub mod persist;
pub mod types;

pub use persist::{load, save, PersistError, RECORD_MAX};
pub use types::*;
