//! Sensor front-ends

pub mod convert;

pub use convert::{PressureSensor, RawSample};
