//! Heater control
//!
//! The combustion sequence, the state it runs on and the engine that
//! advances it once per control period.

pub mod channels;
pub mod engine;
pub mod sequence;
pub mod state;
pub mod status;
pub mod virtual_sensors;

pub use channels::{celsius, Actuator, Outputs, Readings, Sensor, ACTMAX, ACTUATOR_COUNT, SENSOR_COUNT};
pub use engine::{Cause, Engine, Iteration, Transition};
pub use sequence::{ms_to_periods, SequenceEntry, SequenceTable, PERIODS_PER_SECOND};
pub use state::{HeaterState, PersistentData, RunTime, CO2_UNITY};
pub use status::{Status, STATUS_COUNT};
pub use virtual_sensors::{heating_power, FlameObserver};
