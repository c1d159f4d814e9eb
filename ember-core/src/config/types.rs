//! Configuration type definitions
//!
//! Tunables that differ between burner builds. The simulator reads them
//! from the `[heater]` table of a scenario file; the firmware uses the
//! defaults.

use serde::{Deserialize, Serialize};

/// Load levels of one actuator across the burn phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadLevels {
    /// Full load
    pub full: u16,
    /// Part load
    pub part: u16,
    /// Stand-by, right after ignition
    pub standby: u16,
    /// Ignition
    pub ignite: u16,
}

/// Dosing pump levels, Hz × 20
pub const DOSING_LEVELS: LoadLevels = LoadLevels {
    full: 86,
    part: 50,
    standby: 40,
    ignite: 43,
};

/// Combustion air fan model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum FanModel {
    /// Brushless DBW46 blower
    #[default]
    Dbw46,
    /// Small brushed test blower
    ToyBlower,
}

impl FanModel {
    /// Fan speed per phase, RPM
    pub const fn levels(self) -> LoadLevels {
        match self {
            FanModel::Dbw46 => LoadLevels {
                full: 2300,
                part: 1400,
                standby: 300,
                ignite: 300,
            },
            FanModel::ToyBlower => LoadLevels {
                full: 6900,
                part: 4800,
                standby: 3000,
                ignite: 750,
            },
        }
    }

    /// Factory speed loop gains for this fan
    pub const fn gains(self) -> LoopGains {
        let p = match self {
            FanModel::Dbw46 => 2000,
            FanModel::ToyBlower => 1200,
        };
        LoopGains {
            p,
            i: 800,
            d: 400,
            floor: 140,
            closed_loop: true,
        }
    }
}

/// Atomizing nozzle model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum NozzleModel {
    /// Hago nozzle
    #[default]
    Hago,
    /// Delavan nozzle
    Delavan,
}

impl NozzleModel {
    /// Nozzle air pressure per phase, percent of full scale
    pub const fn levels(self) -> LoadLevels {
        match self {
            NozzleModel::Hago => LoadLevels {
                full: 55,
                part: 22,
                standby: 8,
                ignite: 4,
            },
            NozzleModel::Delavan => LoadLevels {
                full: 50,
                part: 20,
                standby: 3,
                ignite: 3,
            },
        }
    }
}

/// Burner build: which fan drives which nozzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct BurnerProfile {
    /// Combustion air fan
    pub fan: FanModel,
    /// Atomizing nozzle
    pub nozzle: NozzleModel,
}

/// PID gains and operating floor of one regulation loop
///
/// Gains are Q16 multipliers: the loop output is the weighted sum shifted
/// right by 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopGains {
    /// Proportional gain
    pub p: i32,
    /// Integral gain
    pub i: i32,
    /// Derivative gain
    pub d: i32,
    /// Setpoints at or below this value switch the loop off
    pub floor: u16,
    /// Regulate on the measured value; otherwise drive open loop
    pub closed_loop: bool,
}

impl LoopGains {
    /// Factory gains of the nozzle air pressure loop
    pub const PRESSURE: LoopGains = LoopGains {
        p: 15000,
        i: 15000,
        d: 1000,
        floor: 1,
        closed_loop: true,
    };
}

/// Heater controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct HeaterConfig {
    /// Jiffy clock frequency, Hz
    pub jiffy_hz: u32,
    /// Burner build
    pub burner: BurnerProfile,
    /// Nozzle air pressure loop
    pub pressure_loop: LoopGains,
    /// Combustion fan speed loop
    pub fan_loop: LoopGains,
    /// Regulation tick, jiffies (12/128 s by default)
    pub regulation_period: u32,
}

impl HeaterConfig {
    /// Configuration for a burner build with its factory loop gains
    pub const fn for_burner(jiffy_hz: u32, burner: BurnerProfile) -> Self {
        Self {
            jiffy_hz,
            burner,
            pressure_loop: LoopGains::PRESSURE,
            fan_loop: burner.fan.gains(),
            regulation_period: jiffy_hz * 3 / 32,
        }
    }

    /// Jiffies per control iteration (16 iterations per second)
    pub const fn heater_period(&self) -> u32 {
        self.jiffy_hz / crate::heater::PERIODS_PER_SECOND
    }

    /// Convert milliseconds to jiffies
    pub const fn ms(&self, ms: u32) -> u32 {
        ember_hal::clock::ms_to_jiffies(ms, self.jiffy_hz)
    }
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self::for_burner(4096, BurnerProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeaterConfig::default();
        assert_eq!(config.jiffy_hz, 4096);
        assert_eq!(config.heater_period(), 256);
        assert_eq!(config.regulation_period, 384);
        assert_eq!(config.fan_loop.p, 2000);
        assert_eq!(config.pressure_loop, LoopGains::PRESSURE);
    }

    #[test]
    fn test_toy_blower_gains() {
        let burner = BurnerProfile {
            fan: FanModel::ToyBlower,
            nozzle: NozzleModel::Delavan,
        };
        let config = HeaterConfig::for_burner(1000, burner);
        assert_eq!(config.fan_loop.p, 1200);
        assert_eq!(config.fan_loop.floor, 140);
        assert_eq!(config.ms(100), 100);
    }

    #[test]
    fn test_config_postcard_round_trip() {
        let config = HeaterConfig::default();
        let mut buf = [0u8; 64];
        let used = postcard::to_slice(&config, &mut buf).unwrap();
        let back: HeaterConfig = postcard::from_bytes(used).unwrap();
        assert_eq!(back, config);
    }
}
