//! Heater operating status
//!
//! The 16 states of the combustion sequence. Each status indexes one entry
//! of the sequence table.

use serde::{Deserialize, Serialize};

/// Number of statuses (and sequence table entries)
pub const STATUS_COUNT: usize = 16;

/// Operating status of the heater
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Idle, everything off
    #[default]
    Off = 0,
    /// Pre-start purge
    Start = 1,
    /// Nozzle stock preheating
    Preheat = 2,
    /// Glow plug heating
    Glow = 3,
    /// Ignition
    Ignite = 4,
    /// Flame stabilization
    Stabilize = 5,
    /// Ramp from part to full load
    RampUp = 6,
    /// Full load burn
    BurnHigh = 7,
    /// Ramp from full to part load
    RampDown = 8,
    /// Part load burn
    BurnLow = 9,
    /// Burn out
    Stop = 10,
    /// Cool down with fan running
    Cooldown = 11,
    /// Final purge before off
    End = 12,
    /// Ventilation only
    Vent = 13,
    /// Direct actuator test
    Test = 14,
    /// Locked out after a serious fault
    Locked = 15,
}

impl Status {
    /// All statuses in index order
    pub const ALL: [Status; STATUS_COUNT] = [
        Status::Off,
        Status::Start,
        Status::Preheat,
        Status::Glow,
        Status::Ignite,
        Status::Stabilize,
        Status::RampUp,
        Status::BurnHigh,
        Status::RampDown,
        Status::BurnLow,
        Status::Stop,
        Status::Cooldown,
        Status::End,
        Status::Vent,
        Status::Test,
        Status::Locked,
    ];

    /// Table index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Status for a table index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// States in which an active command must be refreshed periodically
    pub const fn requires_refresh(self) -> bool {
        !matches!(
            self,
            Status::Off
                | Status::Test
                | Status::Locked
                | Status::Stop
                | Status::Cooldown
                | Status::End
        )
    }

    /// States with an established flame
    pub const fn past_ignition(self) -> bool {
        matches!(
            self,
            Status::Stabilize
                | Status::RampUp
                | Status::BurnHigh
                | Status::RampDown
                | Status::BurnLow
        )
    }

    /// States whose duration comes from the requested heating time
    pub const fn uses_request_time(self) -> bool {
        matches!(self, Status::BurnHigh | Status::BurnLow | Status::Vent)
    }

    /// States in which the flame and heating power are estimated
    pub const fn is_combustion(self) -> bool {
        !matches!(
            self,
            Status::Off
                | Status::Locked
                | Status::Start
                | Status::Glow
                | Status::Test
                | Status::Preheat
                | Status::Vent
                | Status::End
        )
    }

    /// States the sensor task samples only slowly when idle
    pub const fn is_dormant(self) -> bool {
        matches!(self, Status::Off | Status::Locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for (i, status) in Status::ALL.iter().enumerate() {
            assert_eq!(status.index(), i);
            assert_eq!(Status::from_index(i), Some(*status));
        }
        assert_eq!(Status::from_index(STATUS_COUNT), None);
    }

    #[test]
    fn test_refresh_states() {
        assert!(Status::Ignite.requires_refresh());
        assert!(Status::BurnLow.requires_refresh());
        assert!(Status::Vent.requires_refresh());
        assert!(!Status::Off.requires_refresh());
        assert!(!Status::Cooldown.requires_refresh());
        assert!(!Status::Test.requires_refresh());
    }

    #[test]
    fn test_ignition_boundary() {
        assert!(!Status::Glow.past_ignition());
        assert!(!Status::Ignite.past_ignition());
        assert!(Status::Stabilize.past_ignition());
        assert!(!Status::Stop.past_ignition());
    }
}
