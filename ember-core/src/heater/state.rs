//! Heater state
//!
//! Everything the engine, the tasks and the command contract share. The
//! persistent part survives power cycles; the rest is rebuilt at boot.

use serde::{Deserialize, Serialize};

use super::channels::{Outputs, Readings, SENSOR_COUNT};
use super::status::Status;

/// Default CO2 calibration (unity gain)
pub const CO2_UNITY: u8 = 0x80;

/// Accumulated run time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunTime {
    /// Whole hours
    pub hours: u16,
    /// Minutes, 0..60
    pub minutes: u8,
    /// Seconds, 0..60
    pub seconds: u8,
}

impl RunTime {
    /// Add one second; returns `true` when a minute rolled over
    pub fn add_second(&mut self) -> bool {
        self.seconds += 1;
        if self.seconds < 60 {
            return false;
        }
        self.seconds = 0;
        self.minutes += 1;
        if self.minutes >= 60 {
            self.minutes = 0;
            self.hours = self.hours.saturating_add(1);
        }
        true
    }
}

/// Counters and calibration kept in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistentData {
    /// Time spent in any state but off
    pub working: RunTime,
    /// Time powered
    pub operating: RunTime,
    /// Number of start attempts
    pub start_counter: u16,
    /// Combustion fan gain, 0x80 = 1.0
    pub co2_cal: u8,
}

impl Default for PersistentData {
    fn default() -> Self {
        Self {
            working: RunTime::default(),
            operating: RunTime::default(),
            start_counter: 0,
            co2_cal: CO2_UNITY,
        }
    }
}

/// Complete controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaterState {
    /// Current operating status
    pub status: Status,
    /// Override requested by the command side, applied at the next tick
    pub pending: Option<Status>,
    /// Periods left in the current status
    pub remaining: u32,
    /// Requested run time budget, periods
    pub request_time: u32,
    /// Last committed actuator values
    pub outputs: Outputs,
    /// Latest sensor sample
    pub readings: Readings,
    /// Consecutive out-of-bounds samples per sensor
    pub faults: [u8; SENSOR_COUNT],
    /// Periods until the active command must be refreshed
    pub refresh_countdown: u32,
    /// Command code being kept alive
    pub refresh_command: Option<u8>,
    /// A complete sensor sample is waiting for supervision
    pub sensors_fresh: bool,
    /// Counters and calibration
    pub persistent: PersistentData,
}

impl HeaterState {
    /// Boot state: off, outputs idle
    pub fn new(persistent: PersistentData) -> Self {
        Self {
            status: Status::Off,
            pending: None,
            remaining: 0,
            request_time: 0,
            outputs: Outputs::OFF,
            readings: Readings::default(),
            faults: [0; SENSOR_COUNT],
            refresh_countdown: 0,
            refresh_command: None,
            sensors_fresh: false,
            persistent,
        }
    }

    /// Request a transition at the next engine tick
    ///
    /// Overwrites any earlier request not yet consumed.
    pub fn request(&mut self, status: Status) {
        self.pending = Some(status);
    }

    /// Whether a command is currently being kept alive
    pub fn is_refreshing(&self) -> bool {
        self.refresh_command.is_some()
    }
}

impl Default for HeaterState {
    fn default() -> Self {
        Self::new(PersistentData::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_time_rollover() {
        let mut time = RunTime {
            hours: 2,
            minutes: 59,
            seconds: 58,
        };
        assert!(!time.add_second());
        assert!(time.add_second());
        assert_eq!(
            time,
            RunTime {
                hours: 3,
                minutes: 0,
                seconds: 0
            }
        );
    }

    #[test]
    fn test_hours_saturate() {
        let mut time = RunTime {
            hours: u16::MAX,
            minutes: 59,
            seconds: 59,
        };
        assert!(time.add_second());
        assert_eq!(time.hours, u16::MAX);
    }

    #[test]
    fn test_boot_state() {
        let state = HeaterState::default();
        assert_eq!(state.status, Status::Off);
        assert_eq!(state.persistent.co2_cal, CO2_UNITY);
        assert!(!state.outputs.any_on());
        assert!(!state.is_refreshing());
    }

    #[test]
    fn test_request_overwrites() {
        let mut state = HeaterState::default();
        state.request(Status::Start);
        state.request(Status::Vent);
        assert_eq!(state.pending, Some(Status::Vent));
    }
}
