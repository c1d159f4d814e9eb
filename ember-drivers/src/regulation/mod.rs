//! Actuator regulation loops
//!
//! Closed-loop control of the nozzle air compressor (on measured pressure)
//! and the combustion fan (on tachometer speed).

pub mod loops;
pub mod pid;
pub mod tachometer;

pub use loops::{RegulationIo, RegulationLoops, Setpoints};
pub use pid::{open_loop, PidLoop, NOMINAL_SUPPLY_MV};
pub use tachometer::{Tachometer, STALLED};
