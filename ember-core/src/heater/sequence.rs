//! Combustion sequence table
//!
//! One [`SequenceEntry`] per [`Status`]: how long the state lasts, where it
//! goes next, how each actuator ramps across it, and which sensor values
//! are acceptable while in it.
//!
//! # Ramps
//!
//! Each actuator stores its end value and a per-period step. With `r`
//! periods remaining the output is the end value minus `r` steps, so the
//! output starts at the ramp's start value and lands exactly on the end
//! value when the state times out.
//!
//! Percent channels are stored in percent and scaled to the actuator
//! domain on the way out. The dosing pump is stored in its own unit. The
//! combustion fan target is stored pre-divided by 4 so RPM values keep
//! headroom in the shifted arithmetic.

use serde::{Deserialize, Serialize};

use super::channels::{
    celsius, Actuator, Sensor, ACTMAX_LD2, ACTUATOR_COUNT, SENSOR_COUNT,
};
use super::status::{Status, STATUS_COUNT};
use crate::config::{BurnerProfile, DOSING_LEVELS};

/// Control iterations per second
pub const PERIODS_PER_SECOND: u32 = 16;

/// Fractional bits of a ramp step
pub const STEP_SCALE: u32 = 8;

/// Fault mask covering every sensor
pub const MASK_ALL: u16 = (1 << SENSOR_COUNT) - 1;

/// Convert milliseconds to control periods
pub const fn ms_to_periods(ms: u32) -> u32 {
    PERIODS_PER_SECOND * ms / 1000
}

/// One state of the combustion sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceEntry {
    /// Periods spent in this state before timing out
    pub duration: u32,
    /// State entered on timeout
    pub next: Status,
    /// Ramp end value per actuator
    pub target: [u16; ACTUATOR_COUNT],
    /// Ramp step per actuator and period, fixed point
    pub step: [i32; ACTUATOR_COUNT],
    /// Lowest acceptable reading per sensor
    pub sensor_min: [u16; SENSOR_COUNT],
    /// Highest acceptable reading per sensor
    pub sensor_max: [u16; SENSOR_COUNT],
    /// Failure route for a reading below its minimum
    pub on_below: [Status; SENSOR_COUNT],
    /// Failure route for a reading above its maximum
    pub on_above: [Status; SENSOR_COUNT],
    /// Consecutive out-of-bounds samples tolerated
    pub max_faults: u8,
    /// Sensors whose faults route without logging or cut-off
    pub fault_mask: u16,
}

impl SequenceEntry {
    /// Actuator value with `remaining` periods left in the state
    pub fn ramp(&self, actuator: Actuator, remaining: u32) -> u16 {
        let i = actuator.index();
        let step = i64::from(self.step[i]) * i64::from(remaining);
        let target = i64::from(self.target[i]);

        let value = match actuator {
            Actuator::DosingPump => target - (step >> STEP_SCALE),
            _ => ((target << STEP_SCALE) - step) >> (STEP_SCALE - ACTMAX_LD2),
        };

        value.clamp(0, i64::from(actuator.ceiling())) as u16
    }

    /// Whether `value` lies inside the bounds for `sensor`
    pub fn in_bounds(&self, sensor: Sensor, value: u16) -> bool {
        let i = sensor.index();
        (self.sensor_min[i]..=self.sensor_max[i]).contains(&value)
    }

    /// State to enter when `sensor` reads `value` out of bounds
    pub fn failure_route(&self, sensor: Sensor, value: u16) -> Status {
        let i = sensor.index();
        if value < self.sensor_min[i] {
            self.on_below[i]
        } else {
            self.on_above[i]
        }
    }

    /// Whether faults on `sensor` are expected in this state
    pub fn is_masked(&self, sensor: Sensor) -> bool {
        self.fault_mask & sensor.bit() != 0
    }
}

/// The full 16-entry sequence, indexed by [`Status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceTable {
    entries: [SequenceEntry; STATUS_COUNT],
}

impl SequenceTable {
    /// Build a table from explicit entries
    pub fn new(entries: [SequenceEntry; STATUS_COUNT]) -> Self {
        Self { entries }
    }

    /// Entry for `status`
    pub fn entry(&self, status: Status) -> &SequenceEntry {
        &self.entries[status.index()]
    }

    /// All entries in status order
    pub fn entries(&self) -> &[SequenceEntry; STATUS_COUNT] {
        &self.entries
    }

    /// Factory sequence for a burner build
    pub fn factory(burner: BurnerProfile) -> Self {
        use Actuator::*;
        use Sensor::*;

        let fan = burner.fan.levels();
        let cc = burner.nozzle.levels();
        let dp = DOSING_LEVELS;

        let off = Entry::new(1_000, Status::Off)
            .max(Pressure, P_NOISE)
            .max(HeatingPower, 0)
            .max(Flame, 0)
            .above(PreheatCurrent, Status::Locked)
            .above(GlowPlugCurrent, Status::Locked)
            .mask(MASK_ALL);

        let start = Entry::new(3_000, Status::Preheat)
            .ramp(CirculationPump, 50, 0)
            .fan(1000, 1000)
            .max(Pressure, P_MAX)
            .max(HeatingPower, 0)
            .max(Flame, 0);

        let preheat = Entry::new(180_000, Status::Glow)
            .hold(NozzleHeater, 100)
            .min(PreheatCurrent, 10)
            .max(NozzleTemp, celsius(80))
            .max(PreheatCurrent, PLUG_MAX)
            .max(Pressure, P_NOISE)
            .max(HeatingPower, 0)
            .max(Flame, 0)
            .above(NozzleTemp, Status::Glow)
            .mask(NozzleTemp.bit());

        let glow = Entry::new(20_000, Status::Ignite)
            .hold(DosingPump, 1)
            .hold(GlowPlug, 100)
            .min(NozzleTemp, celsius(0))
            .min(GlowPlugCurrent, 50)
            .max(GlowPlugCurrent, PLUG_MAX)
            .max(Pressure, P_NOISE)
            .max(HeatingPower, 0)
            .max(Flame, 0);

        let ignite = Entry::new(40_000, Status::Stabilize)
            .ramp(DosingPump, dp.ignite, dp.standby)
            .hold(CirculationPump, 100)
            .ramp(Compressor, cc.ignite, cc.standby)
            .fan(fan.ignite, fan.standby)
            .hold(GlowPlug, 100)
            .min(NozzleTemp, celsius(0))
            .min(GlowPlugCurrent, 50)
            .max(GlowPlugCurrent, PLUG_MAX)
            .max(Pressure, P_IGNITE)
            .faults(2);

        let stabilize = Entry::new(40_000, Status::BurnLow)
            .ramp(DosingPump, dp.standby, dp.part)
            .hold(CirculationPump, 100)
            .ramp(Compressor, cc.standby, cc.part)
            .fan(fan.standby, fan.part)
            .hold(GlowPlug, 100)
            .min(NozzleTemp, celsius(0))
            .min(GlowPlugCurrent, 50)
            .max(GlowPlugCurrent, PLUG_MAX)
            .above(HeatExchangerTemp, Status::Stop)
            .faults(5);

        let ramp_up = Entry::new(20_000, Status::BurnHigh)
            .ramp(DosingPump, dp.part, dp.full)
            .hold(CirculationPump, 100)
            .ramp(Compressor, cc.part, cc.full)
            .fan(fan.part, fan.full)
            .min(Flame, 1)
            .above(HeatExchangerTemp, Status::Stop)
            .faults(20);

        let burn_high = Entry::new(3_600_000, Status::Stop)
            .hold(DosingPump, dp.full)
            .hold(CirculationPump, 100)
            .hold(VehicleFan, 100)
            .hold(Compressor, cc.full)
            .fan(fan.full, fan.full)
            .min(Flame, 1)
            .max(HeatExchangerTemp, celsius(80))
            .above(HeatExchangerTemp, Status::RampDown)
            .faults(10)
            .mask(HeatExchangerTemp.bit());

        let ramp_down = Entry::new(20_000, Status::BurnLow)
            .ramp(DosingPump, dp.full, dp.part)
            .hold(CirculationPump, 100)
            .hold(VehicleFan, 100)
            .ramp(Compressor, cc.full, cc.part)
            .fan(fan.full, fan.part)
            .min(Flame, 1)
            .above(HeatExchangerTemp, Status::Stop)
            .faults(20);

        let burn_low = Entry::new(3_600_000, Status::Stop)
            .hold(DosingPump, dp.part)
            .hold(CirculationPump, 100)
            .hold(VehicleFan, 100)
            .hold(Compressor, cc.part)
            .fan(fan.part, fan.part)
            .min(Flame, 1)
            .min(HeatExchangerTemp, celsius(50))
            .below(HeatExchangerTemp, Status::RampUp)
            .above(HeatExchangerTemp, Status::Stop)
            .faults(10)
            .mask(HeatExchangerTemp.bit());

        let stop = Entry::new(20_000, Status::Cooldown)
            .hold(CirculationPump, 100)
            .hold(Compressor, cc.part)
            .fan(fan.part, fan.part)
            .min(HeatExchangerTemp, celsius(25))
            .below(HeatExchangerTemp, Status::Cooldown)
            .above(HeatExchangerTemp, Status::Cooldown)
            .faults(5)
            .mask(HeatExchangerTemp.bit());

        let cooldown = Entry::new(60_000, Status::End)
            .hold(CirculationPump, 100)
            .ramp(Compressor, cc.part, 0)
            .fan(600, 600)
            .min(HeatExchangerTemp, celsius(40))
            .max(HeatExchangerTemp, celsius(110))
            .below(HeatExchangerTemp, Status::End)
            .faults(5)
            .mask(HeatExchangerTemp.bit());

        let end = Entry::new(3_000, Status::Off)
            .max(Pressure, P_NOISE)
            .max(HeatingPower, 0)
            .max(Flame, 0)
            .faults(5);

        let vent = Entry::new(60_000, Status::Off)
            .hold(VehicleFan, 100)
            .max(Pressure, P_NOISE)
            .max(FanSpeed, 0)
            .max(HeatingPower, 0)
            .max(Flame, 0);

        let test = Entry::new(30_000, Status::Off)
            .max(PreheatCurrent, PLUG_MAX)
            .max(GlowPlugCurrent, PLUG_MAX)
            .max(Pressure, P_MAX)
            .max(HeatingPower, 0)
            .max(Flame, 0);

        let locked = Entry::new(120_000, Status::Locked)
            .max(Pressure, P_NOISE)
            .max(Overheat, 1)
            .max(FanSpeed, 0)
            .max(HeatingPower, 0)
            .max(Flame, 0)
            .route_all(Status::Locked)
            .mask(MASK_ALL);

        Self::new(
            [
                off, start, preheat, glow, ignite, stabilize, ramp_up, burn_high, ramp_down,
                burn_low, stop, cooldown, end, vent, test, locked,
            ]
            .map(Entry::build),
        )
    }
}

/// Pressure sensor noise floor
const P_NOISE: u16 = 8;
/// Highest pressure accepted during ignition
const P_IGNITE: u16 = 200;
/// Full-scale nozzle air pressure
const P_MAX: u16 = 400;
/// Highest plug current accepted while heating
const PLUG_MAX: u16 = 3200;

/// Bounds every state starts from
const BASE_MIN: [u16; SENSOR_COUNT] = [0, 0, 0, 0, 0, 0, 0, 11_000, 0, 0, 0];
const BASE_MAX: [u16; SENSOR_COUNT] = [
    3300,
    celsius(90),
    celsius(140),
    100,
    500,
    500,
    0,
    16_000,
    u16::MAX,
    6000,
    1,
];

/// Builder for one factory entry
struct Entry {
    periods: u32,
    entry: SequenceEntry,
}

impl Entry {
    /// Entry lasting `ms`, with base bounds and every failure routed to off
    fn new(ms: u32, next: Status) -> Self {
        let mut routes = [Status::Off; SENSOR_COUNT];
        routes[Sensor::Overheat.index()] = Status::Locked;

        let periods = ms_to_periods(ms);
        Self {
            periods,
            entry: SequenceEntry {
                duration: periods,
                next,
                target: [0; ACTUATOR_COUNT],
                step: [0; ACTUATOR_COUNT],
                sensor_min: BASE_MIN,
                sensor_max: BASE_MAX,
                on_below: routes,
                on_above: routes,
                max_faults: 0,
                fault_mask: 0,
            },
        }
    }

    fn step(&self, start: u16, end: u16, shift: u32) -> i32 {
        if self.periods == 0 {
            return 0;
        }
        let delta = (i64::from(end) - i64::from(start)) << shift;
        (delta / i64::from(self.periods)) as i32
    }

    /// Ramp `actuator` from `start` to `end` across the state
    fn ramp(mut self, actuator: Actuator, start: u16, end: u16) -> Self {
        let i = actuator.index();
        self.entry.target[i] = end;
        self.entry.step[i] = self.step(start, end, STEP_SCALE);
        self
    }

    fn hold(self, actuator: Actuator, value: u16) -> Self {
        self.ramp(actuator, value, value)
    }

    /// Ramp the combustion fan, in RPM
    fn fan(mut self, start: u16, end: u16) -> Self {
        let i = Actuator::CombustionFan.index();
        self.entry.target[i] = end >> ACTMAX_LD2;
        self.entry.step[i] = self.step(start, end, STEP_SCALE - ACTMAX_LD2);
        self
    }

    fn min(mut self, sensor: Sensor, value: u16) -> Self {
        self.entry.sensor_min[sensor.index()] = value;
        self
    }

    fn max(mut self, sensor: Sensor, value: u16) -> Self {
        self.entry.sensor_max[sensor.index()] = value;
        self
    }

    fn below(mut self, sensor: Sensor, next: Status) -> Self {
        self.entry.on_below[sensor.index()] = next;
        self
    }

    fn above(mut self, sensor: Sensor, next: Status) -> Self {
        self.entry.on_above[sensor.index()] = next;
        self
    }

    fn route_all(mut self, next: Status) -> Self {
        self.entry.on_below = [next; SENSOR_COUNT];
        self.entry.on_above = [next; SENSOR_COUNT];
        self
    }

    fn faults(mut self, max: u8) -> Self {
        self.entry.max_faults = max;
        self
    }

    fn mask(mut self, mask: u16) -> Self {
        self.entry.fault_mask = mask;
        self
    }

    fn build(self) -> SequenceEntry {
        self.entry
    }
}
