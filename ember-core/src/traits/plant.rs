//! Sensor and actuator traits

use crate::heater::{Outputs, Readings};

/// Source of sensor samples
///
/// Implementations sample the physical channels in the background (ADC
/// sequences, tachometer) and report when a complete new cycle is in.
pub trait SensorInput {
    /// Fill the physical channels of `readings`
    ///
    /// The virtual channels (heating power, flame) are left untouched.
    fn read(&mut self, readings: &mut Readings);

    /// Whether a complete sample cycle finished since the last
    /// [`invalidate`](Self::invalidate)
    fn is_fresh(&self) -> bool;

    /// Discard the current sample cycle
    ///
    /// Called after every state transition so supervision never judges the
    /// new state on readings taken under the old one.
    fn invalidate(&mut self);

    /// Front-panel switch
    fn button(&mut self) -> bool {
        false
    }
}

/// Sink for actuator commands
pub trait ActuatorOutput {
    /// Commit all channels
    ///
    /// Regulated channels (compressor, fan, dosing pump) take the value as
    /// a setpoint; the rest drive their outputs directly.
    fn write(&mut self, outputs: &Outputs);

    /// Switch the combustion subsystem, its PWM and regulation timer
    fn set_power(&mut self, on: bool);
}
