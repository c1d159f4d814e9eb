//! First-order heater plant
//!
//! Every quantity relaxes exponentially toward a target set by the
//! actuators. Rates are per second so the model is independent of the step
//! size. Good enough to walk the controller through a full heat cycle,
//! nothing more.

use ember_core::heater::{celsius, Actuator, Outputs, Readings, Sensor, ACTMAX};
use serde::Deserialize;

/// Seebeck voltage in a steady flame, mV
const SEEBECK_HOT_MV: f32 = 3000.0;
/// Fraction of the flame voltage a glowing plug produces on its own
const GLOW_STIMULUS: f32 = 0.15;
/// Plug current right after switch-on and once warm, 10 mA
const PLUG_COLD: f32 = 600.0;
const PLUG_WARM: f32 = 150.0;
/// Nozzle stock temperature with the preheater on, °C
const NOZZLE_HEATED_C: f32 = 140.0;
/// Nozzle stock temperature while the burner runs, °C
const NOZZLE_BURNING_C: f32 = 60.0;
/// Heat exchanger rise per watt of fuel power, °C
const EXCHANGER_C_PER_W: f32 = 1.0 / 40.0;
/// Heating power per dosing unit, W
const WATTS_PER_DOSE: f32 = 44.0;
/// Nozzle pressure and fan speed at full drive
const PRESSURE_GAIN: f32 = 1.25;
const FAN_GAIN_RPM: f32 = 8.0;
/// Fuel keeps the flame alive this long after the last stroke, s
const FUEL_HOLD_S: f32 = 2.0;
/// Smallest atomizing pressure and fan speed that sustain a flame
const MIN_PRESSURE: f32 = 8.0;
const MIN_FAN_RPM: f32 = 100.0;
/// Supply sag while the glow plug draws current, mV
const PLUG_SAG_MV: u16 = 500;

/// Time constants, 1/s
mod rate {
    pub const SEEBECK_RISE: f32 = 0.0137;
    pub const SEEBECK_DECAY: f32 = 0.0078;
    pub const GLOW_PLUG: f32 = 0.078;
    pub const PREHEATER: f32 = 0.039;
    pub const NOZZLE_HEAT: f32 = 0.0078;
    pub const NOZZLE_BURN: f32 = 0.01;
    pub const NOZZLE_COOL: f32 = 0.0039;
    pub const EXCHANGER: f32 = 0.02;
    pub const PRESSURE: f32 = 10.0;
    pub const FAN: f32 = 2.0;
}

/// Environment of the simulated heater
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlantParams {
    /// Ambient and coolant temperature, °C
    pub ambient_c: f32,
    /// Vehicle supply voltage, mV
    pub supply_mv: u16,
    /// Whether fuel reaching a hot plug ignites
    pub ignites: bool,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            ambient_c: 20.0,
            supply_mv: 13_800,
            ignites: true,
        }
    }
}

/// Relax `value` toward `target` at `rate` per second over `dt` seconds
fn relax(value: f32, target: f32, rate: f32, dt: f32) -> f32 {
    value + (target - value) * (1.0 - (-rate * dt).exp())
}

/// Simulated burner, heat exchanger and auxiliaries
#[derive(Debug, Clone)]
pub struct HeaterModel {
    params: PlantParams,
    outputs: Outputs,
    compressor: u16,
    fan: u16,
    time_s: f32,
    last_stroke_s: Option<f32>,
    strokes: u32,
    burning: bool,
    exchanger_c: f32,
    nozzle_c: f32,
    plug_current: f32,
    preheat_current: f32,
    pressure: f32,
    fan_rpm: f32,
    revolutions: f32,
    seebeck_mv: f32,
}

impl HeaterModel {
    /// Plant at ambient temperature with everything off
    pub fn new(params: PlantParams) -> Self {
        Self {
            params,
            outputs: Outputs::OFF,
            compressor: 0,
            fan: 0,
            time_s: 0.0,
            last_stroke_s: None,
            strokes: 0,
            burning: false,
            exchanger_c: params.ambient_c,
            nozzle_c: params.ambient_c,
            plug_current: 0.0,
            preheat_current: 0.0,
            pressure: 0.0,
            fan_rpm: 0.0,
            revolutions: 0.0,
            seebeck_mv: 0.0,
        }
    }

    /// Switched actuators from the engine
    pub fn set_outputs(&mut self, outputs: &Outputs) {
        if outputs[Actuator::GlowPlug] > 0 && self.outputs[Actuator::GlowPlug] == 0 {
            self.plug_current = PLUG_COLD;
        }
        if outputs[Actuator::NozzleHeater] > 0 && self.outputs[Actuator::NozzleHeater] == 0 {
            self.preheat_current = PLUG_COLD;
        }
        self.outputs = *outputs;
    }

    /// Compressor drive from the pressure loop, actuator domain
    pub fn set_compressor(&mut self, drive: u16) {
        self.compressor = drive.min(ACTMAX);
    }

    /// Fan drive from the speed loop, actuator domain
    pub fn set_fan(&mut self, drive: u16) {
        self.fan = drive.min(ACTMAX);
    }

    /// One dosing pump stroke
    pub fn stroke(&mut self) {
        self.strokes += 1;
        self.last_stroke_s = Some(self.time_s);
    }

    /// Pump strokes so far
    pub fn strokes(&self) -> u32 {
        self.strokes
    }

    /// Whether the burner has a flame
    pub fn is_burning(&self) -> bool {
        self.burning
    }

    /// Heat exchanger temperature, °C
    pub fn exchanger_c(&self) -> f32 {
        self.exchanger_c
    }

    /// Nozzle stock temperature, °C
    pub fn nozzle_c(&self) -> f32 {
        self.nozzle_c
    }

    /// Physical fan speed, RPM
    pub fn fan_rpm(&self) -> f32 {
        self.fan_rpm
    }

    /// Nozzle air pressure, actuator domain
    pub fn pressure(&self) -> u16 {
        self.pressure.round() as u16
    }

    /// Supply voltage at the controller, mV
    pub fn supply_mv(&self) -> u16 {
        if self.outputs[Actuator::GlowPlug] > 0 {
            self.params.supply_mv.saturating_sub(PLUG_SAG_MV)
        } else {
            self.params.supply_mv
        }
    }

    fn fuel_flowing(&self) -> bool {
        self.last_stroke_s
            .is_some_and(|t| self.time_s - t < FUEL_HOLD_S)
    }

    /// Advance by `dt` seconds
    ///
    /// Returns the fraction of the step at which the fan completed a
    /// revolution, if it did.
    pub fn step(&mut self, dt: f32) -> Option<f32> {
        self.time_s += dt;
        let ambient = self.params.ambient_c;
        let glow = self.outputs[Actuator::GlowPlug] > 0;
        let preheat = self.outputs[Actuator::NozzleHeater] > 0;

        let fuel = self.fuel_flowing();
        let air = self.pressure > MIN_PRESSURE && self.fan_rpm > MIN_FAN_RPM;
        self.burning = if self.burning {
            fuel && air
        } else {
            fuel && air && glow && self.params.ignites
        };

        self.pressure = relax(
            self.pressure,
            f32::from(self.compressor) * PRESSURE_GAIN,
            rate::PRESSURE,
            dt,
        );
        self.fan_rpm = relax(
            self.fan_rpm,
            f32::from(self.fan) * FAN_GAIN_RPM,
            rate::FAN,
            dt,
        );

        self.plug_current = if glow {
            relax(self.plug_current, PLUG_WARM, rate::GLOW_PLUG, dt)
        } else {
            0.0
        };
        self.preheat_current = if preheat {
            relax(self.preheat_current, PLUG_WARM, rate::PREHEATER, dt)
        } else {
            0.0
        };

        self.nozzle_c = if preheat {
            relax(self.nozzle_c, NOZZLE_HEATED_C, rate::NOZZLE_HEAT, dt)
        } else if self.burning {
            relax(self.nozzle_c, NOZZLE_BURNING_C, rate::NOZZLE_BURN, dt)
        } else {
            relax(self.nozzle_c, ambient, rate::NOZZLE_COOL, dt)
        };

        let exchanger_target = if self.burning {
            let power = f32::from(self.outputs[Actuator::DosingPump]) * WATTS_PER_DOSE;
            ambient + power * EXCHANGER_C_PER_W
        } else {
            ambient
        };
        self.exchanger_c = relax(self.exchanger_c, exchanger_target, rate::EXCHANGER, dt);

        let stimulus = if self.burning {
            1.0
        } else {
            GLOW_STIMULUS * f32::from(self.outputs[Actuator::GlowPlug]) / f32::from(ACTMAX)
        };
        let target = SEEBECK_HOT_MV * stimulus;
        let rate = if target > self.seebeck_mv {
            rate::SEEBECK_RISE
        } else {
            rate::SEEBECK_DECAY
        };
        self.seebeck_mv = relax(self.seebeck_mv, target, rate, dt);

        let before = self.revolutions;
        self.revolutions += self.fan_rpm / 60.0 * dt;
        if self.revolutions >= 1.0 {
            let fraction = (1.0 - before) / (self.revolutions - before);
            self.revolutions -= self.revolutions.floor();
            return Some(fraction.clamp(0.0, 1.0));
        }
        None
    }

    /// Fill the physical sensor channels (fan speed comes from the tachometer)
    pub fn fill(&self, readings: &mut Readings) {
        let temperature = |c: f32| celsius(c.round().clamp(-50.0, 500.0) as i16);

        readings[Sensor::GlowPlugVoltage] = self.seebeck_mv.max(0.0) as u16;
        readings[Sensor::HeatExchangerTemp] = temperature(self.exchanger_c);
        readings[Sensor::NozzleTemp] = temperature(self.nozzle_c);
        readings[Sensor::PreheatCurrent] = self.preheat_current as u16;
        readings[Sensor::GlowPlugCurrent] = self.plug_current as u16;
        readings[Sensor::Pressure] = self.pressure();
        readings[Sensor::Overheat] = u16::from(self.exchanger_c > 130.0);
        readings[Sensor::Supply] = self.supply_mv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(model: &mut HeaterModel, seconds: f32) {
        let dt = 0.01;
        for _ in 0..(seconds / dt) as u32 {
            model.step(dt);
        }
    }

    #[test]
    fn test_cold_and_quiet() {
        let mut model = HeaterModel::new(PlantParams::default());
        run(&mut model, 10.0);
        let mut readings = Readings::default();
        model.fill(&mut readings);
        assert_eq!(readings[Sensor::HeatExchangerTemp], celsius(20));
        assert_eq!(readings[Sensor::GlowPlugVoltage], 0);
        assert_eq!(readings[Sensor::Supply], 13_800);
        assert!(!model.is_burning());
    }

    #[test]
    fn test_preheater_warms_nozzle() {
        let mut model = HeaterModel::new(PlantParams::default());
        let mut outputs = Outputs::OFF;
        outputs[Actuator::NozzleHeater] = ACTMAX;
        model.set_outputs(&outputs);
        run(&mut model, 1.0);
        let mut readings = Readings::default();
        model.fill(&mut readings);
        assert!(readings[Sensor::PreheatCurrent] > 500);
        run(&mut model, 120.0);
        assert!(model.nozzle_c() > 80.0);
    }

    #[test]
    fn test_ignition_needs_fuel_air_and_glow() {
        let mut model = HeaterModel::new(PlantParams::default());
        let mut outputs = Outputs::OFF;
        outputs[Actuator::GlowPlug] = ACTMAX;
        outputs[Actuator::DosingPump] = 40;
        model.set_outputs(&outputs);
        model.set_compressor(40);
        model.set_fan(60);
        run(&mut model, 2.0);
        model.stroke();
        run(&mut model, 0.5);
        assert!(model.is_burning());

        // Without strokes the flame dies
        run(&mut model, 3.0);
        assert!(!model.is_burning());
    }

    #[test]
    fn test_fan_revolutions() {
        let mut model = HeaterModel::new(PlantParams::default());
        model.set_fan(ACTMAX);
        run(&mut model, 5.0);
        let mut edges = 0;
        for _ in 0..100 {
            if model.step(0.01).is_some() {
                edges += 1;
            }
        }
        // ~3200 rpm is ~53 revolutions per second
        assert!((50..=54).contains(&edges), "{edges}");
    }
}
