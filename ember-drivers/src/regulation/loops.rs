//! Nozzle air pressure and combustion fan regulation
//!
//! The engine commits actuator vectors at 16 Hz; the loops here run from a
//! faster periodic timer. Setpoints cross from the control task to the
//! timer callback through atomics, so the callback never borrows the
//! heater state.

use portable_atomic::{AtomicU16, Ordering};

use ember_core::config::HeaterConfig;
use ember_core::heater::{Actuator, Outputs, ACTMAX};
use ember_hal::clock::Jiffies;

use super::pid::PidLoop;
use super::tachometer::Tachometer;

/// Setpoints shared between the control task and the regulation timer
#[derive(Debug, Default)]
pub struct Setpoints {
    pressure: AtomicU16,
    fan: AtomicU16,
}

impl Setpoints {
    /// Both setpoints zero
    pub const fn new() -> Self {
        Self {
            pressure: AtomicU16::new(0),
            fan: AtomicU16::new(0),
        }
    }

    /// Take the regulated channels from a committed actuator vector
    pub fn store(&self, outputs: &Outputs) {
        self.pressure
            .store(outputs[Actuator::Compressor], Ordering::Relaxed);
        self.fan
            .store(outputs[Actuator::CombustionFan], Ordering::Relaxed);
    }

    /// Nozzle air pressure setpoint, actuator domain
    pub fn pressure(&self) -> u16 {
        self.pressure.load(Ordering::Relaxed)
    }

    /// Combustion fan setpoint, RPM
    pub fn fan(&self) -> u16 {
        self.fan.load(Ordering::Relaxed)
    }
}

/// Board side of the regulation loops
pub trait RegulationIo {
    /// Measured nozzle air pressure, actuator domain
    fn pressure(&mut self) -> u16;

    /// Supply voltage, mV
    fn supply_mv(&mut self) -> u16;

    /// Compressor PWM compare value (inverted: ACTMAX is off)
    fn set_compressor_duty(&mut self, duty: u16);

    /// Combustion fan PWM compare value (inverted: ACTMAX is off)
    fn set_fan_duty(&mut self, duty: u16);
}

/// Both regulation loops and the fan tachometer
#[derive(Debug, Clone)]
pub struct RegulationLoops {
    pressure: PidLoop,
    fan: PidLoop,
    tachometer: Tachometer,
    enabled: bool,
}

impl RegulationLoops {
    /// Loops configured from the heater configuration, initially disabled
    pub fn new(config: &HeaterConfig) -> Self {
        Self {
            pressure: PidLoop::new(config.pressure_loop),
            fan: PidLoop::new(config.fan_loop),
            tachometer: Tachometer::new(
                config.jiffy_hz,
                config.regulation_period,
                config.fan_loop.floor,
            ),
            enabled: false,
        }
    }

    /// Start regulating from a clean state
    ///
    /// Called when subsystem power comes on.
    pub fn enable(&mut self) {
        self.pressure.reset();
        self.fan.reset();
        self.tachometer.reset();
        self.enabled = true;
    }

    /// Stop regulating and drive both PWM outputs off
    pub fn disable<IO: RegulationIo>(&mut self, io: &mut IO) {
        self.enabled = false;
        self.pressure.reset();
        self.fan.reset();
        self.tachometer.reset();
        io.set_compressor_duty(ACTMAX);
        io.set_fan_duty(ACTMAX);
    }

    /// Whether the loops are running
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fan revolution edge (from the tachometer interrupt)
    pub fn fan_edge(&mut self, now: Jiffies) {
        self.tachometer.edge(now);
    }

    /// Measured fan speed, RPM
    pub fn fan_rpm(&self) -> u16 {
        self.tachometer.rpm()
    }

    /// Last loop outputs as (compressor, fan), actuator domain
    pub fn outputs(&self) -> (u16, u16) {
        (self.pressure.output(), self.fan.output())
    }

    /// Pressure loop
    pub fn pressure_loop(&mut self) -> &mut PidLoop {
        &mut self.pressure
    }

    /// Fan loop
    pub fn fan_loop(&mut self) -> &mut PidLoop {
        &mut self.fan
    }

    /// One regulation tick
    ///
    /// Returns `true` to request a scheduler wakeup: a finished tick means
    /// the sensor sample now reflects the current actuator state.
    pub fn iterate<IO: RegulationIo>(&mut self, setpoints: &Setpoints, io: &mut IO) -> bool {
        if !self.enabled {
            return false;
        }

        let supply = io.supply_mv();

        let measured = io.pressure();
        let out = self.pressure.update(setpoints.pressure(), measured, supply);
        io.set_compressor_duty(ACTMAX - out);

        self.tachometer.tick();
        let out = self.fan.update(setpoints.fan(), self.tachometer.rpm(), supply);
        io.set_fan_duty(ACTMAX - out);

        true
    }
}
