//! Table-driven control engine
//!
//! [`Engine::iterate`] runs once per control period (1/16 s):
//!
//! 1. A pending override, or an expired state timer, switches status.
//! 2. If no switch happened and a fresh sensor sample is in, every sensor
//!    is checked against the current entry's bounds. Out-of-bounds samples
//!    raise a per-sensor fault counter; in-bounds samples lower it. The
//!    first counter to exceed the entry's threshold routes the heater to
//!    that sensor's failure state, logging and cutting power first unless
//!    the entry masks the sensor.
//! 3. States that need a live command count down the refresh window and
//!    force a stop once it runs out.
//! 4. Outside test mode, every actuator follows its ramp.
//! 5. Outputs are committed; after a switch the sensor cycle is discarded.
//! 6. Run time counters advance once per second.
//!
//! At most one transition happens per call.

use super::channels::{Actuator, Sensor, SENSOR_COUNT};
use super::sequence::{SequenceTable, PERIODS_PER_SECOND};
use super::state::HeaterState;
use super::status::Status;
use crate::faults::{ErrorCode, ErrorLog};
use crate::traits::{ActuatorOutput, SensorInput};

/// Fractional bits of the CO2 calibration factor
const CO2_CAL_SHIFT: u32 = 7;

/// Why a transition happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cause {
    /// The state's timer ran out
    Timeout,
    /// The command side requested it
    Override,
    /// A sensor exceeded its fault threshold
    SensorFault(Sensor),
    /// The active command was not refreshed in time
    RefreshTimeout,
}

/// A status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    /// Status before
    pub from: Status,
    /// Status after
    pub to: Status,
    /// Trigger
    pub cause: Cause,
}

/// What one iteration did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Iteration {
    /// Status change, if any
    pub transition: Option<Transition>,
    /// Error logged this iteration
    pub error: Option<ErrorCode>,
    /// Persistent counters changed enough to be saved
    pub counters_dirty: bool,
}

/// The control engine
///
/// Owns the sequence table and the sub-second tick counter; everything
/// else lives in [`HeaterState`].
#[derive(Debug, Clone)]
pub struct Engine {
    table: SequenceTable,
    ticks: u32,
}

impl Engine {
    /// Create an engine running `table`
    pub fn new(table: SequenceTable) -> Self {
        Self { table, ticks: 0 }
    }

    /// The sequence table
    pub fn table(&self) -> &SequenceTable {
        &self.table
    }

    /// Enter `target`, or the pending override if one is set
    ///
    /// Reloads the state timer, carries the requested run time across
    /// burn states and clears every fault counter. Returns whether the
    /// status actually changed.
    pub fn switch_status(&self, state: &mut HeaterState, target: Status) -> bool {
        let target = state.pending.take().unwrap_or(target);
        let previous = state.status;
        let entry = self.table.entry(target);

        if previous.uses_request_time() {
            state.request_time = state.remaining;
        }

        state.remaining = match target {
            Status::BurnHigh | Status::BurnLow | Status::Vent | Status::Test => {
                state.request_time
            }
            Status::RampUp | Status::RampDown => {
                state.request_time = state.request_time.saturating_sub(entry.duration);
                entry.duration
            }
            _ => entry.duration,
        };

        state.status = target;
        state.faults = [0; SENSOR_COUNT];

        let changed = previous != target;
        if changed && target == Status::Start {
            state.persistent.start_counter = state.persistent.start_counter.wrapping_add(1);
        }
        changed
    }

    /// Run one control period
    pub fn iterate<P>(&mut self, state: &mut HeaterState, log: &mut ErrorLog, plant: &mut P) -> Iteration
    where
        P: SensorInput + ActuatorOutput,
    {
        let mut iteration = Iteration::default();
        let mut changed = false;

        if state.pending.is_some() {
            let next = self.table.entry(state.status).next;
            changed = self.enter(state, next, Cause::Override, &mut iteration);
        } else if state.remaining > 0 {
            state.remaining -= 1;
        } else {
            let next = self.table.entry(state.status).next;
            changed = self.enter(state, next, Cause::Timeout, &mut iteration);
        }

        if state.sensors_fresh && !changed {
            changed = self.supervise(state, log, plant, &mut iteration);
        }

        if state.status.requires_refresh() {
            if state.refresh_countdown > 0 {
                state.refresh_countdown -= 1;
            } else if !changed {
                let next = if state.status.past_ignition() {
                    Status::Stop
                } else {
                    Status::Off
                };

                #[cfg(feature = "defmt")]
                defmt::warn!("command refresh timed out in {}", state.status);

                plant.set_power(false);
                log.record(state, ErrorCode::REFRESH, 0);
                iteration.error = Some(ErrorCode::REFRESH);
                changed = self.enter(state, next, Cause::RefreshTimeout, &mut iteration);
                state.refresh_command = None;
            }
        }
        if state.status == Status::Off {
            state.refresh_command = None;
        }

        if state.status != Status::Test {
            let entry = self.table.entry(state.status);
            for actuator in Actuator::ALL {
                state.outputs[actuator] = entry.ramp(actuator, state.remaining);
            }
            let fan = u32::from(state.outputs[Actuator::CombustionFan]);
            let scaled = (u32::from(state.persistent.co2_cal) * fan) >> CO2_CAL_SHIFT;
            state.outputs[Actuator::CombustionFan] = scaled.min(u32::from(u16::MAX)) as u16;
        }

        plant.write(&state.outputs);

        if changed {
            state.sensors_fresh = false;
            plant.invalidate();
        }

        if iteration.transition.is_some_and(|t| t.to == Status::Start) {
            iteration.counters_dirty = true;
        }

        self.ticks += 1;
        if self.ticks >= PERIODS_PER_SECOND {
            self.ticks = 0;
            let persistent = &mut state.persistent;
            let mut rolled = persistent.operating.add_second();
            if state.status != Status::Off {
                rolled |= persistent.working.add_second();
            }
            iteration.counters_dirty |= rolled;
        }

        iteration
    }

    /// Check every sensor against the current entry; returns whether a
    /// fault switched status
    fn supervise<P>(
        &self,
        state: &mut HeaterState,
        log: &mut ErrorLog,
        plant: &mut P,
        iteration: &mut Iteration,
    ) -> bool
    where
        P: ActuatorOutput,
    {
        let entry = self.table.entry(state.status);

        for sensor in Sensor::ALL {
            let value = state.readings[sensor];
            let faults = &mut state.faults[sensor.index()];

            if entry.in_bounds(sensor, value) {
                *faults = faults.saturating_sub(1);
                continue;
            }

            *faults = faults.saturating_add(1);
            if *faults <= entry.max_faults {
                continue;
            }

            let next = entry.failure_route(sensor, value);
            if !entry.is_masked(sensor) {
                #[cfg(feature = "defmt")]
                defmt::warn!("sensor {} fault in {}: {}", sensor, state.status, value);

                plant.set_power(false);
                let code = ErrorCode::for_sensor(sensor);
                log.record(state, code, sensor.index() as u8);
                iteration.error = Some(code);
            }
            return self.enter(state, next, Cause::SensorFault(sensor), iteration);
        }

        false
    }

    fn enter(
        &self,
        state: &mut HeaterState,
        target: Status,
        cause: Cause,
        iteration: &mut Iteration,
    ) -> bool {
        let from = state.status;
        let changed = self.switch_status(state, target);
        if changed {
            #[cfg(feature = "defmt")]
            defmt::debug!("status {} -> {} ({})", from, state.status, cause);

            iteration.transition = Some(Transition {
                from,
                to: state.status,
                cause,
            });
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BurnerProfile;
    use crate::heater::channels::{celsius, Outputs, Readings, ACTMAX_LD2};
    use proptest::prelude::*;

    /// Plant double recording what the engine commits
    #[derive(Default)]
    struct MockPlant {
        written: Option<Outputs>,
        power: Option<bool>,
        invalidations: u32,
    }

    impl SensorInput for MockPlant {
        fn read(&mut self, _readings: &mut Readings) {}

        fn is_fresh(&self) -> bool {
            true
        }

        fn invalidate(&mut self) {
            self.invalidations += 1;
        }
    }

    impl ActuatorOutput for MockPlant {
        fn write(&mut self, outputs: &Outputs) {
            self.written = Some(*outputs);
        }

        fn set_power(&mut self, on: bool) {
            self.power = Some(on);
        }
    }

    fn engine() -> Engine {
        Engine::new(SequenceTable::factory(BurnerProfile::default()))
    }

    /// Readings inside every bound of `status`
    fn nominal(engine: &Engine, status: Status) -> Readings {
        let entry = engine.table().entry(status);
        let mut readings = Readings::default();
        for sensor in Sensor::ALL {
            let i = sensor.index();
            readings.0[i] = entry.sensor_min[i];
        }
        readings
    }

    fn state_in(engine: &Engine, status: Status, remaining: u32) -> HeaterState {
        let mut state = HeaterState::default();
        state.status = status;
        state.remaining = remaining;
        state.readings = nominal(engine, status);
        state.refresh_countdown = 320;
        state.refresh_command = Some(0x21);
        state
    }

    #[test]
    fn test_timeout_transition() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Start, 1);

        let first = engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(first.transition, None);
        assert_eq!(state.remaining, 0);

        let second = engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(
            second.transition,
            Some(Transition {
                from: Status::Start,
                to: Status::Preheat,
                cause: Cause::Timeout,
            })
        );
        assert_eq!(state.remaining, 2880);
        assert_eq!(plant.invalidations, 1);
        assert!(!state.sensors_fresh);
    }

    #[test]
    fn test_masked_fault_routes_without_logging() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::BurnHigh, 500);
        state.readings[Sensor::HeatExchangerTemp] = celsius(85);

        for _ in 0..10 {
            state.sensors_fresh = true;
            let it = engine.iterate(&mut state, &mut log, &mut plant);
            assert_eq!(it.transition, None);
        }
        state.sensors_fresh = true;
        let it = engine.iterate(&mut state, &mut log, &mut plant);

        assert_eq!(state.status, Status::RampDown);
        assert_eq!(
            it.transition.map(|t| t.cause),
            Some(Cause::SensorFault(Sensor::HeatExchangerTemp))
        );
        assert!(log.is_empty());
        assert_eq!(it.error, None);
        assert_eq!(plant.power, None);
    }

    #[test]
    fn test_unmasked_fault_cuts_power_and_logs() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Ignite, 300);
        state.readings[Sensor::Supply] = 9_000;

        for _ in 0..3 {
            state.sensors_fresh = true;
            engine.iterate(&mut state, &mut log, &mut plant);
        }

        assert_eq!(state.status, Status::Off);
        assert_eq!(plant.power, Some(false));
        let record = log.find(ErrorCode::SUPPLY_LOW).unwrap();
        assert_eq!(record.status, Status::Ignite);
        assert_eq!(record.sensor, Sensor::Supply.index() as u8);
        assert_eq!(record.supply_mv, 9_000);
        assert!(log.is_dirty());
    }

    #[test]
    fn test_overheat_locks() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::BurnLow, 1000);
        state.readings[Sensor::Overheat] = 1;
        state.sensors_fresh = true;

        for _ in 0..11 {
            state.sensors_fresh = true;
            engine.iterate(&mut state, &mut log, &mut plant);
        }
        assert_eq!(state.status, Status::Locked);
        assert!(log.find(ErrorCode::OVERHEAT).is_some());
    }

    #[test]
    fn test_refresh_timeout_before_ignition_forces_off() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Ignite, 300);
        state.refresh_countdown = 0;

        let it = engine.iterate(&mut state, &mut log, &mut plant);

        assert_eq!(state.status, Status::Off);
        assert_eq!(it.error, Some(ErrorCode::REFRESH));
        assert_eq!(it.transition.map(|t| t.cause), Some(Cause::RefreshTimeout));
        let record = log.find(ErrorCode::REFRESH).unwrap();
        assert_eq!(record.status, Status::Ignite);
        assert_eq!(state.refresh_command, None);
    }

    #[test]
    fn test_refresh_timeout_after_ignition_stops() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::BurnLow, 5000);
        state.refresh_countdown = 0;

        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(state.status, Status::Stop);
        assert_eq!(state.request_time, 4999);
    }

    #[test]
    fn test_refresh_countdown_decrements() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Glow, 300);
        state.refresh_countdown = 2;

        engine.iterate(&mut state, &mut log, &mut plant);
        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(state.status, Status::Glow);
        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(state.status, Status::Off);
    }

    #[test]
    fn test_refresh_not_required_in_cooldown() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Cooldown, 300);
        state.refresh_countdown = 0;

        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(state.status, Status::Cooldown);
        assert!(log.is_empty());
    }

    #[test]
    fn test_override_applies_with_time_left() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Off, 12);
        state.request_time = 960;
        state.request(Status::Vent);

        let it = engine.iterate(&mut state, &mut log, &mut plant);

        assert_eq!(state.status, Status::Vent);
        assert_eq!(state.pending, None);
        assert_eq!(state.remaining, 960);
        assert_eq!(it.transition.map(|t| t.cause), Some(Cause::Override));
        let outputs = plant.written.unwrap();
        assert_eq!(outputs[Actuator::VehicleFan], 100 << ACTMAX_LD2);
    }

    #[test]
    fn test_override_tick_skips_watchdog() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Glow, 100);
        state.refresh_countdown = 0;
        state.request(Status::Vent);

        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(state.status, Status::Vent);
        assert!(log.is_empty());
    }

    #[test]
    fn test_watchdog_deferred_after_timeout() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Glow, 0);
        state.refresh_countdown = 0;

        let first = engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(first.transition.map(|t| t.to), Some(Status::Ignite));
        assert!(log.is_empty());

        let second = engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(second.transition.map(|t| t.to), Some(Status::Off));
        assert_eq!(second.error, Some(ErrorCode::REFRESH));
    }

    #[test]
    fn test_budget_carries_across_burn_states() {
        let engine = engine();
        let mut state = HeaterState::default();
        state.status = Status::Stabilize;
        state.request_time = 10_000;

        engine.switch_status(&mut state, Status::BurnLow);
        assert_eq!(state.remaining, 10_000);

        state.remaining = 7_000;
        engine.switch_status(&mut state, Status::RampUp);
        assert_eq!(state.request_time, 7_000 - 320);
        assert_eq!(state.remaining, 320);

        state.remaining = 0;
        engine.switch_status(&mut state, Status::BurnHigh);
        assert_eq!(state.remaining, 6_680);
    }

    #[test]
    fn test_switch_clears_faults_and_counts_starts() {
        let engine = engine();
        let mut state = HeaterState::default();
        state.faults = [3; SENSOR_COUNT];

        assert!(engine.switch_status(&mut state, Status::Start));
        assert_eq!(state.faults, [0; SENSOR_COUNT]);
        assert_eq!(state.persistent.start_counter, 1);
        assert_eq!(state.remaining, 48);

        assert!(!engine.switch_status(&mut state, Status::Start));
        assert_eq!(state.persistent.start_counter, 1);
    }

    #[test]
    fn test_test_mode_keeps_outputs() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Test, 100);
        state.outputs[Actuator::GlowPlug] = 200;

        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(plant.written.unwrap()[Actuator::GlowPlug], 200);
    }

    #[test]
    fn test_co2_calibration_scales_fan() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::BurnHigh, 1000);
        state.persistent.co2_cal = 0xa0;

        engine.iterate(&mut state, &mut log, &mut plant);
        assert_eq!(state.outputs[Actuator::CombustionFan], 2875);
    }

    #[test]
    fn test_duration_accounting() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Cooldown, 900);
        state.persistent.working.seconds = 59;

        let mut dirty = false;
        for _ in 0..16 {
            dirty |= engine.iterate(&mut state, &mut log, &mut plant).counters_dirty;
        }
        assert!(dirty);
        assert_eq!(state.persistent.working.minutes, 1);
        assert_eq!(state.persistent.operating.seconds, 1);

        state.status = Status::Off;
        state.remaining = 100;
        for _ in 0..16 {
            engine.iterate(&mut state, &mut log, &mut plant);
        }
        assert_eq!(state.persistent.working.seconds, 0);
        assert_eq!(state.persistent.operating.seconds, 2);
    }

    #[test]
    fn test_stale_sensors_ignored() {
        let mut engine = engine();
        let mut log = ErrorLog::new();
        let mut plant = MockPlant::default();
        let mut state = state_in(&engine, Status::Ignite, 300);
        state.readings[Sensor::Supply] = 0;
        state.sensors_fresh = false;

        for _ in 0..10 {
            engine.iterate(&mut state, &mut log, &mut plant);
        }
        assert_eq!(state.status, Status::Ignite);
        assert_eq!(state.faults, [0; SENSOR_COUNT]);
    }

    proptest! {
        #[test]
        fn fault_counters_stay_bounded(samples in proptest::collection::vec(any::<bool>(), 1..200)) {
            let mut engine = engine();
            let mut log = ErrorLog::new();
            let mut plant = MockPlant::default();
            let mut state = state_in(&engine, Status::RampUp, 320);
            state.refresh_countdown = u32::MAX;
            let threshold = engine.table().entry(Status::RampUp).max_faults;

            for bad in samples {
                state.readings[Sensor::Flame] = if bad { 0 } else { 1 };
                state.sensors_fresh = true;
                let it = engine.iterate(&mut state, &mut log, &mut plant);
                if it.transition.is_some() {
                    prop_assert_eq!(state.faults, [0; SENSOR_COUNT]);
                    break;
                }
                for count in state.faults {
                    prop_assert!(count <= threshold);
                }
            }
        }

        #[test]
        fn remaining_counts_down_to_single_timeout(remaining in 0u32..200) {
            let mut engine = engine();
            let mut log = ErrorLog::new();
            let mut plant = MockPlant::default();
            let mut state = state_in(&engine, Status::Cooldown, remaining);

            let mut transitions = 0;
            for _ in 0..=remaining {
                let it = engine.iterate(&mut state, &mut log, &mut plant);
                transitions += usize::from(it.transition.is_some());
            }
            prop_assert_eq!(transitions, 1);
            prop_assert_eq!(state.status, Status::End);
        }
    }
}
