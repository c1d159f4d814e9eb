//! Hardware driver implementations
//!
//! Board-independent drivers the firmware and the simulator share:
//!
//! - Fixed-point helpers
//! - Regulation loops (nozzle air pressure, combustion fan speed)
//! - Fan tachometer
//! - Dosing pump pulse generator
//! - ADC conversions for the sensor channels

#![no_std]
#![deny(unsafe_code)]

pub mod fixed;
pub mod pump;
pub mod regulation;
pub mod sensor;

pub use pump::{DosingPump, PumpError};
pub use regulation::{RegulationIo, RegulationLoops, Setpoints};
