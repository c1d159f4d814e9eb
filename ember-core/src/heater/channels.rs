//! Sensor and actuator channels
//!
//! Fixed channel layout shared by the sequence table, the engine and the
//! board glue. Vectors are plain arrays indexed by the channel enums.

use core::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// log2 of the actuator full-scale value relative to percent
pub const ACTMAX_LD2: u32 = 2;

/// Actuator value representing 100% output
pub const ACTMAX: u16 = 100 << ACTMAX_LD2;

/// Number of sensor channels
pub const SENSOR_COUNT: usize = 11;

/// Number of actuator channels
pub const ACTUATOR_COUNT: usize = 9;

/// Offset added to temperatures so sub-zero readings stay unsigned
pub const TEMP_OFFSET: u16 = 50;

/// Encode a temperature in °C as a sensor value
pub const fn celsius(c: i16) -> u16 {
    (c + TEMP_OFFSET as i16) as u16
}

/// Sensor input channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Sensor {
    /// Glow plug Seebeck voltage, mV (flame sensing)
    GlowPlugVoltage = 0,
    /// Heat exchanger temperature, °C + 50
    HeatExchangerTemp = 1,
    /// Nozzle stock temperature, °C + 50
    NozzleTemp = 2,
    /// Nozzle stock preheat current, 10 mA
    PreheatCurrent = 3,
    /// Glow plug current, 10 mA
    GlowPlugCurrent = 4,
    /// Nozzle air pressure, actuator domain (ACTMAX = 1 bar)
    Pressure = 5,
    /// Overheat fuse, 0 when intact
    Overheat = 6,
    /// Supply voltage, mV
    Supply = 7,
    /// Combustion fan speed, RPM
    FanSpeed = 8,
    /// Heating power estimate, W (virtual)
    HeatingPower = 9,
    /// Flame detected flag (virtual)
    Flame = 10,
}

impl Sensor {
    /// All channels in index order
    pub const ALL: [Sensor; SENSOR_COUNT] = [
        Sensor::GlowPlugVoltage,
        Sensor::HeatExchangerTemp,
        Sensor::NozzleTemp,
        Sensor::PreheatCurrent,
        Sensor::GlowPlugCurrent,
        Sensor::Pressure,
        Sensor::Overheat,
        Sensor::Supply,
        Sensor::FanSpeed,
        Sensor::HeatingPower,
        Sensor::Flame,
    ];

    /// Channel index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit for this channel in a fault mask
    pub const fn bit(self) -> u16 {
        1 << self as u16
    }

    /// Channel for an index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Actuator output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Actuator {
    /// Auxiliary solenoid valve, actuator domain
    Aux = 0,
    /// Fuel dosing pump, Hz × 20
    DosingPump = 1,
    /// Coolant circulation pump, actuator domain
    CirculationPump = 2,
    /// Unused channel
    Spare = 3,
    /// Vehicle ventilation fan, actuator domain
    VehicleFan = 4,
    /// Nozzle air compressor, pressure in actuator domain
    Compressor = 5,
    /// Combustion air fan, RPM
    CombustionFan = 6,
    /// Glow plug, actuator domain
    GlowPlug = 7,
    /// Nozzle stock preheater, actuator domain
    NozzleHeater = 8,
}

impl Actuator {
    /// All channels in index order
    pub const ALL: [Actuator; ACTUATOR_COUNT] = [
        Actuator::Aux,
        Actuator::DosingPump,
        Actuator::CirculationPump,
        Actuator::Spare,
        Actuator::VehicleFan,
        Actuator::Compressor,
        Actuator::CombustionFan,
        Actuator::GlowPlug,
        Actuator::NozzleHeater,
    ];

    /// Channel index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Largest value this channel may carry
    ///
    /// The dosing pump and combustion fan are in physical units; every
    /// other channel is a fraction of [`ACTMAX`].
    pub const fn ceiling(self) -> u16 {
        match self {
            Actuator::DosingPump | Actuator::CombustionFan => u16::MAX,
            _ => ACTMAX,
        }
    }
}

/// Sensor input vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Readings(pub [u16; SENSOR_COUNT]);

impl Index<Sensor> for Readings {
    type Output = u16;

    fn index(&self, sensor: Sensor) -> &u16 {
        &self.0[sensor.index()]
    }
}

impl IndexMut<Sensor> for Readings {
    fn index_mut(&mut self, sensor: Sensor) -> &mut u16 {
        &mut self.0[sensor.index()]
    }
}

/// Actuator output vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outputs(pub [u16; ACTUATOR_COUNT]);

impl Outputs {
    /// Every channel off
    pub const OFF: Self = Self([0; ACTUATOR_COUNT]);

    /// Whether any channel is non-zero
    pub fn any_on(&self) -> bool {
        self.0.iter().any(|&v| v != 0)
    }
}

impl Index<Actuator> for Outputs {
    type Output = u16;

    fn index(&self, actuator: Actuator) -> &u16 {
        &self.0[actuator.index()]
    }
}

impl IndexMut<Actuator> for Outputs {
    fn index_mut(&mut self, actuator: Actuator) -> &mut u16 {
        &mut self.0[actuator.index()]
    }
}
