//! Simulated controller board
//!
//! [`Board`] stands in for the microcontroller: it owns the jiffy clock,
//! the timer wheel, the regulation loops and the dosing pump, and steps
//! the [`HeaterModel`] whenever the scheduler idles. [`SimPlant`] is the
//! board's sensor/actuator face handed to the controller.

use std::cell::{Cell, Ref, RefCell};
use std::convert::Infallible;

use ember_core::config::HeaterConfig;
use ember_core::heater::{Actuator, Outputs, Readings, Sensor, ACTMAX};
use ember_core::traits::{ActuatorOutput, SensorInput};
use ember_drivers::{DosingPump, RegulationIo, RegulationLoops, Setpoints};
use ember_hal::clock::{Clock, Jiffies, IDLE_FOREVER};
use ember_hal::timer::{SoftTimers, TimerHandle, TimerService};
use embedded_hal::digital::{ErrorType, OutputPin};
use tracing::warn;

use crate::model::{HeaterModel, PlantParams};

/// Physics step, jiffies
const STEP: Jiffies = 8;

/// Timer slots: regulation tick and pump pulse train
const TIMER_SLOTS: usize = 4;

/// Dosing pump solenoid output
#[derive(Debug, Default)]
pub struct SolenoidPin {
    high: bool,
}

impl ErrorType for SolenoidPin {
    type Error = Infallible;
}

impl OutputPin for SolenoidPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        Ok(())
    }
}

/// Regulation loop I/O wired to the model
struct ModelIo<'a>(&'a mut HeaterModel);

impl RegulationIo for ModelIo<'_> {
    fn pressure(&mut self) -> u16 {
        self.0.pressure()
    }

    fn supply_mv(&mut self) -> u16 {
        self.0.supply_mv()
    }

    fn set_compressor_duty(&mut self, duty: u16) {
        self.0.set_compressor(ACTMAX - duty.min(ACTMAX));
    }

    fn set_fan_duty(&mut self, duty: u16) {
        self.0.set_fan(ACTMAX - duty.min(ACTMAX));
    }
}

struct Hardware {
    model: HeaterModel,
    timers: SoftTimers<TIMER_SLOTS>,
    loops: RegulationLoops,
    pump: DosingPump<SolenoidPin>,
    regulation: Option<TimerHandle>,
    powered: bool,
    button: bool,
    tick_seen: bool,
    fresh: bool,
}

impl Hardware {
    /// Route one timer expiry; returns whether it requests a wakeup
    fn on_timer(&mut self, handle: TimerHandle, setpoints: &Setpoints) -> bool {
        if self.regulation == Some(handle) {
            let ticked = self.loops.iterate(setpoints, &mut ModelIo(&mut self.model));
            self.tick_seen |= ticked;
            return ticked;
        }

        if self.pump.timer() == Some(handle) {
            match self.pump.on_timer(&mut self.timers) {
                Ok(wake) => {
                    if self.pump.is_energized() {
                        self.model.stroke();
                    }
                    return wake;
                }
                Err(e) => warn!(?e, "dosing pump timer failed"),
            }
        }

        false
    }
}

/// The simulated board
pub struct Board {
    jiffy_hz: u32,
    regulation_period: Jiffies,
    now: Cell<Jiffies>,
    setpoints: Setpoints,
    hw: RefCell<Hardware>,
}

impl Board {
    /// Board at time zero with the plant at rest
    pub fn new(config: &HeaterConfig, params: PlantParams) -> Self {
        Self {
            jiffy_hz: config.jiffy_hz,
            regulation_period: config.regulation_period,
            now: Cell::new(0),
            setpoints: Setpoints::new(),
            hw: RefCell::new(Hardware {
                model: HeaterModel::new(params),
                timers: SoftTimers::new(),
                loops: RegulationLoops::new(config),
                pump: DosingPump::new(SolenoidPin::default(), config.jiffy_hz),
                regulation: None,
                powered: false,
                button: false,
                tick_seen: false,
                fresh: false,
            }),
        }
    }

    /// Sensor/actuator interface for the controller
    pub fn plant(&self) -> SimPlant<'_> {
        SimPlant(self)
    }

    /// Jiffies for `seconds` of simulated time
    pub fn seconds(&self, seconds: f32) -> Jiffies {
        (seconds * self.jiffy_hz as f32) as Jiffies
    }

    /// Simulated time, seconds
    pub fn time_s(&self) -> f32 {
        self.now.get() as f32 / self.jiffy_hz as f32
    }

    /// Hold or release the front-panel switch
    pub fn set_button(&self, pressed: bool) {
        self.hw.borrow_mut().button = pressed;
    }

    /// The heater model
    pub fn model(&self) -> Ref<'_, HeaterModel> {
        Ref::map(self.hw.borrow(), |hw| &hw.model)
    }

    /// Combustion fan speed as the tachometer measures it, RPM
    pub fn fan_rpm(&self) -> u16 {
        self.hw.borrow().loops.fan_rpm()
    }

    /// Whether the combustion subsystem is powered
    pub fn is_powered(&self) -> bool {
        self.hw.borrow().powered
    }

    /// Step physics and timers by `step` jiffies
    fn advance(&self, step: Jiffies) -> bool {
        let start = self.now.get();
        let mut guard = self.hw.borrow_mut();
        let hw = &mut *guard;

        let dt = step as f32 / self.jiffy_hz as f32;
        if let Some(fraction) = hw.model.step(dt) {
            let at = start.wrapping_add((fraction * step as f32) as Jiffies);
            hw.loops.fan_edge(at);
        }
        self.now.set(start.wrapping_add(step));

        let mut fired = Vec::new();
        hw.timers.advance(step, |handle| {
            fired.push(handle);
            false
        });

        fired
            .into_iter()
            .fold(false, |wake, handle| hw.on_timer(handle, &self.setpoints) | wake)
    }
}

impl Clock for Board {
    fn now(&self) -> Jiffies {
        self.now.get()
    }

    fn idle(&self, max: Jiffies) {
        // Nothing external interrupts an unbounded idle in the simulation
        let mut left = if max == IDLE_FOREVER {
            self.jiffy_hz
        } else {
            max
        };

        while left > 0 {
            let step = left.min(STEP);
            left -= step;
            if self.advance(step) {
                break;
            }
        }
    }
}

/// The board as seen by the controller
pub struct SimPlant<'a>(&'a Board);

impl SensorInput for SimPlant<'_> {
    fn read(&mut self, readings: &mut Readings) {
        let mut hw = self.0.hw.borrow_mut();
        hw.model.fill(readings);
        readings[Sensor::FanSpeed] = hw.loops.fan_rpm();

        // Unpowered there is no regulation tick to wait for
        if hw.tick_seen || !hw.powered {
            hw.fresh = true;
        }
    }

    fn is_fresh(&self) -> bool {
        self.0.hw.borrow().fresh
    }

    fn invalidate(&mut self) {
        let mut hw = self.0.hw.borrow_mut();
        hw.fresh = false;
        hw.tick_seen = false;
    }

    fn button(&mut self) -> bool {
        self.0.hw.borrow().button
    }
}

impl ActuatorOutput for SimPlant<'_> {
    fn write(&mut self, outputs: &Outputs) {
        self.0.setpoints.store(outputs);

        let mut guard = self.0.hw.borrow_mut();
        let hw = &mut *guard;
        hw.model.set_outputs(outputs);
        if let Err(e) = hw.pump.set_rate(outputs[Actuator::DosingPump], &mut hw.timers) {
            warn!(?e, "dosing pump rejected rate");
        }
    }

    fn set_power(&mut self, on: bool) {
        let mut guard = self.0.hw.borrow_mut();
        let hw = &mut *guard;
        if hw.powered == on {
            return;
        }
        hw.powered = on;

        if on {
            hw.loops.enable();
            hw.regulation = hw.timers.create(self.0.regulation_period);
            if hw.regulation.is_none() {
                warn!("no timer slot for the regulation tick");
            }
        } else {
            hw.loops.disable(&mut ModelIo(&mut hw.model));
            if let Some(handle) = hw.regulation.take() {
                hw.timers.destroy(handle);
            }
            hw.tick_seen = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        Board::new(&HeaterConfig::default(), PlantParams::default())
    }

    #[test]
    fn test_idle_advances_time() {
        let board = board();
        board.idle(4096);
        assert_eq!(board.now(), 4096);
        board.idle(IDLE_FOREVER);
        assert_eq!(board.now(), 8192);
    }

    #[test]
    fn test_regulation_tick_cuts_idle_short() {
        let board = board();
        board.plant().set_power(true);
        board.idle(4096);
        // First tick after one regulation period, rounded up to a step
        assert_eq!(board.now(), 384);
        assert!(board.is_powered());
    }

    #[test]
    fn test_fresh_needs_tick_after_invalidate() {
        let board = board();
        let mut plant = board.plant();
        plant.set_power(true);
        plant.invalidate();

        let mut readings = Readings::default();
        plant.read(&mut readings);
        assert!(!plant.is_fresh());

        board.idle(1000);
        plant.read(&mut readings);
        assert!(plant.is_fresh());
        assert_eq!(readings[Sensor::Supply], 13_800);
    }

    #[test]
    fn test_pump_strokes_reach_model() {
        let board = board();
        let mut plant = board.plant();
        let mut outputs = Outputs::OFF;
        outputs[Actuator::DosingPump] = 40;
        plant.write(&outputs);
        while board.time_s() < 10.0 {
            board.idle(4096);
        }
        // Two strokes per second
        let strokes = board.model().strokes();
        assert!((19..=20).contains(&strokes), "{strokes}");

        plant.write(&Outputs::OFF);
        board.idle(8192);
        assert_eq!(board.model().strokes(), strokes);
    }

    #[test]
    fn test_fan_regulates_to_setpoint() {
        let board = board();
        let mut plant = board.plant();
        plant.set_power(true);
        let mut outputs = Outputs::OFF;
        outputs[Actuator::CombustionFan] = 1400;
        plant.write(&outputs);
        while board.time_s() < 20.0 {
            board.idle(4096);
        }
        let rpm = board.fan_rpm();
        assert!(rpm.abs_diff(1400) < 150, "{rpm}");
    }

    #[test]
    fn test_power_off_stops_loops() {
        let board = board();
        let mut plant = board.plant();
        plant.set_power(true);
        let mut outputs = Outputs::OFF;
        outputs[Actuator::Compressor] = 100;
        plant.write(&outputs);
        while board.time_s() < 5.0 {
            board.idle(4096);
        }
        assert!(board.model().pressure() > 50);

        plant.set_power(false);
        board.idle(4096);
        assert!(!board.is_powered());
        assert!(board.model().pressure() < 8);
    }
}
