//! ADC conversions for the heater sensor channels
//!
//! All inputs are 12-bit samples against a 3.3 V reference. Each channel
//! has its own front-end (divider, shunt or transducer), folded into a
//! 16-bit scale factor applied with [`mul_high`].

use ember_core::heater::channels::{ACTMAX_LD2, TEMP_OFFSET};
use ember_core::heater::{Readings, Sensor};

use crate::fixed::mul_high;

/// Full-scale 12-bit sample
pub const ADC_MAX: u16 = 4095;

/// ADC reference voltage, mV
pub const VREF_MV: u16 = 3300;

/// Supply sense divider ratio
const SUPPLY_DIVIDER: u16 = 11;

/// Forward drop of the supply protection diode, mV
const SUPPLY_DIODE_MV: u16 = 300;

/// Nozzle air pressure transducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PressureSensor {
    /// Freescale MPX4250, 0–2.5 bar
    #[default]
    Mpx4250,
    /// Freescale MPX5100, 0–1 bar
    Mpx5100,
}

impl PressureSensor {
    /// Zero-pressure offset, ADC counts
    const OFFSET: u16 = 126;

    /// Scale from offset-corrected counts to the actuator domain
    const fn factor(self) -> u16 {
        match self {
            PressureSensor::Mpx4250 => 5611 << ACTMAX_LD2,
            PressureSensor::Mpx5100 => 2348 << ACTMAX_LD2,
        }
    }

    /// Nozzle air pressure in the actuator domain (ACTMAX = 1 bar)
    pub fn convert(self, raw: u16) -> u16 {
        mul_high(raw.saturating_sub(Self::OFFSET), self.factor())
    }
}

/// Glow plug Seebeck voltage, mV
///
/// The thermocouple amplifier inverts, so a cold plug reads near full
/// scale.
pub fn seebeck_mv(raw: u16) -> u16 {
    mul_high(ADC_MAX - raw.min(ADC_MAX), VREF_MV << 4)
}

/// Linear temperature sensor: `raw · slope / 2^16 − intercept`, encoded
fn linear_temperature(raw: u16, slope: u16, intercept: u16) -> u16 {
    (mul_high(raw, slope) + TEMP_OFFSET).saturating_sub(intercept)
}

/// Heat exchanger temperature (DBW46 sensor), °C + 50
pub fn heat_exchanger_temp(raw: u16) -> u16 {
    linear_temperature(raw, 9623, 278)
}

/// Nozzle stock temperature (KTY81-110), °C + 50
pub fn nozzle_temp(raw: u16) -> u16 {
    linear_temperature(raw, 8854, 246)
}

/// Glow plug or preheat current through a 1 kΩ sense resistor, 10 mA
pub fn plug_current(raw: u16) -> u16 {
    mul_high(raw.min(ADC_MAX) << 4, 9902)
}

/// Supply voltage behind an 11:1 divider and a protection diode, mV
pub fn supply_mv(raw: u16) -> u16 {
    mul_high(raw.min(ADC_MAX) * SUPPLY_DIVIDER, VREF_MV << 4) + SUPPLY_DIODE_MV
}

/// Overheat fuse: 0 while intact
pub fn overheat(blown: bool) -> u16 {
    u16::from(blown)
}

/// One raw sample of every physical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// Seebeck amplifier output
    pub seebeck: u16,
    /// Heat exchanger sensor
    pub heat_exchanger: u16,
    /// Nozzle stock sensor
    pub nozzle: u16,
    /// Preheat current shunt
    pub preheat_current: u16,
    /// Glow plug current shunt
    pub plug_current: u16,
    /// Pressure transducer
    pub pressure: u16,
    /// Supply divider
    pub supply: u16,
    /// Overheat fuse input
    pub fuse_blown: bool,
}

impl RawSample {
    /// Convert every ADC channel into `readings`
    ///
    /// Fan speed and the virtual channels are not touched.
    pub fn convert(&self, sensor: PressureSensor, readings: &mut Readings) {
        readings[Sensor::GlowPlugVoltage] = seebeck_mv(self.seebeck);
        readings[Sensor::HeatExchangerTemp] = heat_exchanger_temp(self.heat_exchanger);
        readings[Sensor::NozzleTemp] = nozzle_temp(self.nozzle);
        readings[Sensor::PreheatCurrent] = plug_current(self.preheat_current);
        readings[Sensor::GlowPlugCurrent] = plug_current(self.plug_current);
        readings[Sensor::Pressure] = sensor.convert(self.pressure);
        readings[Sensor::Overheat] = overheat(self.fuse_blown);
        readings[Sensor::Supply] = supply_mv(self.supply);
    }
}
