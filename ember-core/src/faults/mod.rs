//! Fault reporting
//!
//! Diagnostic codes and the bounded error log the engine writes when a
//! sensor fault or refresh timeout forces a transition.

pub mod codes;
pub mod log;

pub use codes::ErrorCode;
pub use log::{ErrorLog, ErrorRecord, MAX_ERRORS};
