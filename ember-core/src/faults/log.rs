//! Error log
//!
//! Up to [`MAX_ERRORS`] records, one per distinct code. A repeated code
//! bumps the existing record's counter and refreshes its snapshot; a new
//! code evicts the oldest record once the log is full.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::codes::ErrorCode;
use crate::heater::{HeaterState, Sensor, Status};

/// Capacity of the error log
pub const MAX_ERRORS: usize = 11;

/// Flags stored with every record
const RECORD_FLAGS: u8 = 3;

/// Snapshot taken when an error is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorRecord {
    /// Error code
    pub code: ErrorCode,
    /// Record flags
    pub flags: u8,
    /// Occurrences, saturating
    pub counter: u8,
    /// Status the error was raised in
    pub status: Status,
    /// Sensor index that tripped (0 when not sensor related)
    pub sensor: u8,
    /// Heat exchanger temperature, °C + 50
    pub temperature: u16,
    /// Supply voltage, mV
    pub supply_mv: u16,
    /// Working hours at the time
    pub hours: u16,
    /// Working minutes at the time
    pub minutes: u8,
}

/// Bounded log of distinct error codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    records: Vec<ErrorRecord, MAX_ERRORS>,
    #[serde(skip)]
    dirty: bool,
}

impl ErrorLog {
    /// Create an empty log
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            dirty: false,
        }
    }

    /// Log `code` raised by `sensor` with a snapshot of `state`
    pub fn record(&mut self, state: &HeaterState, code: ErrorCode, sensor: u8) -> &ErrorRecord {
        let existing = self.records.iter().position(|r| r.code == code);
        let index = match existing {
            Some(index) => index,
            None => {
                if self.records.is_full() {
                    self.records.remove(0);
                }
                let fresh = ErrorRecord {
                    code,
                    flags: RECORD_FLAGS,
                    counter: 0,
                    status: state.status,
                    sensor,
                    temperature: 0,
                    supply_mv: 0,
                    hours: 0,
                    minutes: 0,
                };
                // Cannot fail: a slot was freed above
                let _ = self.records.push(fresh);
                self.records.len() - 1
            }
        };

        let record = &mut self.records[index];
        record.counter = record.counter.saturating_add(1);
        record.status = state.status;
        record.sensor = sensor;
        record.temperature = state.readings[Sensor::HeatExchangerTemp];
        record.supply_mv = state.readings[Sensor::Supply];
        record.hours = state.persistent.working.hours;
        record.minutes = state.persistent.working.minutes;
        self.dirty = true;

        &self.records[index]
    }

    /// Record for `code`, if logged
    pub fn find(&self, code: ErrorCode) -> Option<&ErrorRecord> {
        self.records.iter().find(|r| r.code == code)
    }

    /// Records, oldest first
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
        self.dirty = true;
    }

    /// Whether the log changed since the last [`take_dirty`](Self::take_dirty)
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read and reset the change flag
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heater::celsius;

    fn state_in(status: Status) -> HeaterState {
        let mut state = HeaterState::default();
        state.status = status;
        state.readings[Sensor::HeatExchangerTemp] = celsius(60);
        state.readings[Sensor::Supply] = 12_400;
        state.persistent.working.hours = 7;
        state.persistent.working.minutes = 12;
        state
    }

    #[test]
    fn test_record_snapshot() {
        let mut log = ErrorLog::new();
        let record = *log.record(&state_in(Status::Ignite), ErrorCode::REFRESH, 0);

        assert_eq!(record.code, ErrorCode::REFRESH);
        assert_eq!(record.flags, 3);
        assert_eq!(record.counter, 1);
        assert_eq!(record.status, Status::Ignite);
        assert_eq!(record.temperature, celsius(60));
        assert_eq!(record.supply_mv, 12_400);
        assert_eq!((record.hours, record.minutes), (7, 12));
        assert!(log.take_dirty());
        assert!(!log.is_dirty());
    }

    #[test]
    fn test_repeat_updates_in_place() {
        let mut log = ErrorLog::new();
        log.record(&state_in(Status::Glow), ErrorCode::IGNITION, 4);
        log.record(&state_in(Status::Off), ErrorCode::SUPPLY_LOW, 7);
        log.record(&state_in(Status::Ignite), ErrorCode::IGNITION, 4);

        assert_eq!(log.len(), 2);
        let record = log.find(ErrorCode::IGNITION).unwrap();
        assert_eq!(record.counter, 2);
        assert_eq!(record.status, Status::Ignite);
        assert_eq!(log.records()[0].code, ErrorCode::IGNITION);
    }

    #[test]
    fn test_full_log_evicts_oldest() {
        let mut log = ErrorLog::new();
        let state = state_in(Status::Off);
        for code in 0..MAX_ERRORS as u8 {
            log.record(&state, ErrorCode(code), 0);
        }
        log.record(&state, ErrorCode(0x40), 0);

        assert_eq!(log.len(), MAX_ERRORS);
        assert!(log.find(ErrorCode(0)).is_none());
        assert!(log.find(ErrorCode(1)).is_some());
        assert_eq!(log.records()[MAX_ERRORS - 1].code, ErrorCode(0x40));
    }

    #[test]
    fn test_counter_saturates() {
        let mut log = ErrorLog::new();
        let state = state_in(Status::Off);
        for _ in 0..300 {
            log.record(&state, ErrorCode::FAN, 8);
        }
        assert_eq!(log.find(ErrorCode::FAN).unwrap().counter, u8::MAX);
    }

    #[test]
    fn test_clear_marks_dirty() {
        let mut log = ErrorLog::new();
        log.record(&state_in(Status::Off), ErrorCode::FAN, 8);
        log.take_dirty();
        log.clear();
        assert!(log.is_empty());
        assert!(log.take_dirty());
    }
}
