//! Diagnostic error codes
//!
//! Byte values as reported to diagnostic tools. Kept as an open newtype
//! because tools may ask about codes this controller never produces.

use serde::{Deserialize, Serialize};

use crate::heater::Sensor;

/// One-byte diagnostic error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    /// No start after the permitted attempts
    pub const NO_START: Self = Self(0x02);
    /// Flame lost during operation
    pub const FLAME_LOST: Self = Self(0x03);
    /// Overheat fuse tripped
    pub const OVERHEAT: Self = Self(0x06);
    /// Glow plug short circuit
    pub const GLOW_PLUG_SHORT: Self = Self(0x0a);
    /// Supply voltage too low
    pub const SUPPLY_LOW: Self = Self(0x84);
    /// Combustion air fan interruption
    pub const FAN: Self = Self(0x89);
    /// Glow plug or flame monitor interruption
    pub const GLOW_PLUG: Self = Self(0x8a);
    /// Command refresh failure
    pub const REFRESH: Self = Self(0x92);
    /// Temperature sensor interruption
    pub const TEMPERATURE: Self = Self(0x94);
    /// Glow plug or ignition unit interruption
    pub const IGNITION: Self = Self(0x99);
    /// Nozzle stock heating interruption
    pub const NOZZLE_HEATER: Self = Self(0x9f);
    /// Fuel prewarming interruption
    pub const FUEL_PREWARMING: Self = Self(0xa5);
    /// Pressure sensor failure
    pub const PRESSURE: Self = Self(0xac);
    /// Unknown error
    pub const UNKNOWN: Self = Self(0xff);

    /// Code logged when `sensor` leaves its bounds
    pub const fn for_sensor(sensor: Sensor) -> Self {
        match sensor {
            Sensor::GlowPlugVoltage => Self::GLOW_PLUG,
            Sensor::HeatExchangerTemp => Self::TEMPERATURE,
            Sensor::NozzleTemp => Self::NOZZLE_HEATER,
            Sensor::PreheatCurrent => Self::FUEL_PREWARMING,
            Sensor::GlowPlugCurrent => Self::IGNITION,
            Sensor::Pressure => Self::PRESSURE,
            Sensor::Overheat => Self::OVERHEAT,
            Sensor::Supply => Self::SUPPLY_LOW,
            Sensor::FanSpeed => Self::FAN,
            Sensor::HeatingPower => Self::UNKNOWN,
            Sensor::Flame => Self::GLOW_PLUG_SHORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_codes() {
        let codes = Sensor::ALL.map(|s| ErrorCode::for_sensor(s).0);
        assert_eq!(
            codes,
            [0x8a, 0x94, 0x9f, 0xa5, 0x99, 0xac, 0x06, 0x84, 0x89, 0xff, 0x0a]
        );
    }
}
