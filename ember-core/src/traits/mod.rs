//! Hardware abstraction traits
//!
//! These traits define the interface between the control engine and the
//! board (or simulated plant) it drives.

pub mod plant;

pub use plant::{ActuatorOutput, SensorInput};
