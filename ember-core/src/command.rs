//! Request handling
//!
//! Decoded diagnostic/remote-control requests and their effect on the
//! heater state. The byte-level transport stays outside this crate; it
//! decodes frames into a [`Command`] and encodes the [`Response`].
//!
//! Requests never switch status directly. They leave an override in
//! [`HeaterState::pending`] that the engine applies at its next tick.

use heapless::Vec;

use crate::faults::{ErrorCode, ErrorLog, ErrorRecord, MAX_ERRORS};
use crate::heater::{
    Actuator, HeaterState, Outputs, PersistentData, Readings, SequenceEntry, SequenceTable,
    Status, ACTMAX, PERIODS_PER_SECOND, STATUS_COUNT,
};

/// Window for refreshing an active command, periods (20 s)
pub const REFRESH_PERIODS: u32 = 20 * PERIODS_PER_SECOND;

/// Dosing pump rate while priming the fuel line, Hz × 20
pub const FUEL_PRIME_RATE: u16 = 40;

/// Heating mode of an on command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeatMode {
    /// Plain on
    Generic,
    /// Parking heating
    Parking,
    /// Ventilation only
    Vent,
    /// Supplemental heating
    Supplemental,
}

impl HeatMode {
    /// Command code a refresh must quote to keep this mode alive
    pub const fn code(self) -> u8 {
        match self {
            HeatMode::Generic => 0x20,
            HeatMode::Parking => 0x21,
            HeatMode::Vent => 0x22,
            HeatMode::Supplemental => 0x23,
        }
    }
}

/// Component driven by a test command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestComponent {
    /// End the test
    None,
    /// Combustion air fan, RPM
    CombustionFan,
    /// Dosing pump, Hz × 20
    DosingPump,
    /// Glow plug, percent
    GlowPlug,
    /// Circulation pump, percent
    CirculationPump,
    /// Vehicle fan relay
    VehicleFan,
    /// Solenoid valve
    SolenoidValve,
    /// Nozzle stock heating
    NozzleHeater,
    /// Nozzle air compressor, percent
    Compressor,
    /// Fuel prewarming, percent
    FuelPrewarming,
}

impl TestComponent {
    /// Component for a subsystem id
    pub const fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => TestComponent::None,
            1 => TestComponent::CombustionFan,
            2 => TestComponent::DosingPump,
            3 => TestComponent::GlowPlug,
            4 => TestComponent::CirculationPump,
            5 => TestComponent::VehicleFan,
            9 => TestComponent::SolenoidValve,
            13 => TestComponent::NozzleHeater,
            14 => TestComponent::Compressor,
            15 => TestComponent::FuelPrewarming,
            _ => return None,
        })
    }

    /// Actuator channel and the value to write for `value`
    fn drive(self, value: u16) -> Option<(Actuator, u16)> {
        let double = |v: u16| v.saturating_mul(2);
        Some(match self {
            TestComponent::None => return None,
            TestComponent::CombustionFan => (Actuator::CombustionFan, value),
            TestComponent::DosingPump => (Actuator::DosingPump, value),
            TestComponent::GlowPlug => (Actuator::GlowPlug, double(value)),
            TestComponent::CirculationPump => (Actuator::CirculationPump, double(value)),
            TestComponent::Compressor => (Actuator::Compressor, double(value)),
            TestComponent::VehicleFan => (Actuator::VehicleFan, ACTMAX),
            TestComponent::SolenoidValve => (Actuator::Aux, ACTMAX),
            TestComponent::NozzleHeater => (Actuator::NozzleHeater, ACTMAX),
            TestComponent::FuelPrewarming => (Actuator::NozzleHeater, value.saturating_mul(4)),
        })
    }
}

/// A decoded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Shut down
    Off,
    /// Start heating (or venting) for `minutes`
    On { mode: HeatMode, minutes: u8 },
    /// Keep the command `code` alive
    Check { code: u8 },
    /// Run the dosing pump to prime the fuel line
    FuelPrime { seconds: u16 },
    /// Drive one component directly
    Test {
        component: TestComponent,
        seconds: u8,
        value: u16,
    },
    /// Read the CO2 calibration
    ReadCalibration,
    /// Write the CO2 calibration
    WriteCalibration(u8),
    /// List logged error codes and counters
    ListErrors,
    /// Read one error record
    ReadError(ErrorCode),
    /// Clear the error log
    ClearErrors,
    /// Number of sequence table entries
    DatasetCount,
    /// Read one sequence table entry
    DatasetRead(Status),
    /// Operating snapshot
    Query,
}

/// Operating snapshot returned by [`Command::Query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    /// Current status
    pub status: Status,
    /// Periods left in the current status
    pub remaining: u32,
    /// Requested run time budget, periods
    pub request_time: u32,
    /// Actuator values
    pub outputs: Outputs,
    /// Sensor values
    pub readings: Readings,
    /// Counters and calibration
    pub persistent: PersistentData,
}

/// Reply to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Accepted
    Ack,
    /// Refresh outcome: `true` if the quoted command was the active one
    Refreshed(bool),
    /// CO2 calibration value
    Calibration(u8),
    /// Logged codes with their occurrence counters, oldest first
    Errors(Vec<(ErrorCode, u8), MAX_ERRORS>),
    /// One error record
    Error(ErrorRecord),
    /// Number of sequence table entries
    DatasetCount(u8),
    /// One sequence table entry
    Dataset(SequenceEntry),
    /// Operating snapshot
    Status(Snapshot),
}

/// Request refusals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Not possible in the current status
    NotAllowed,
    /// No record for the requested error code
    UnknownError,
}

/// Apply `command` to the heater state
pub fn process_command(
    command: &Command,
    state: &mut HeaterState,
    log: &mut ErrorLog,
    table: &SequenceTable,
) -> Result<Response, CommandError> {
    match *command {
        Command::Off => {
            if !matches!(state.status, Status::Off | Status::Cooldown | Status::Stop) {
                state.refresh_countdown = 0;
                state.refresh_command = None;
                let target = if state.status == Status::Vent {
                    Status::Off
                } else {
                    Status::Stop
                };
                state.request(target);
            }
            Ok(Response::Ack)
        }
        Command::On { mode, minutes } => {
            require_off(state)?;
            let target = if mode == HeatMode::Vent {
                Status::Vent
            } else {
                Status::Start
            };
            state.request(target);
            state.request_time = u32::from(minutes) * 60 * PERIODS_PER_SECOND;
            state.refresh_countdown = REFRESH_PERIODS;
            state.refresh_command = Some(mode.code());
            Ok(Response::Ack)
        }
        Command::Check { code } => {
            let matches = state.refresh_command == Some(code);
            if matches {
                state.refresh_countdown = REFRESH_PERIODS;
            }
            Ok(Response::Refreshed(matches))
        }
        Command::FuelPrime { seconds } => {
            require_off(state)?;
            state.outputs[Actuator::DosingPump] = FUEL_PRIME_RATE;
            state.request(Status::Test);
            state.request_time = u32::from(seconds) * PERIODS_PER_SECOND;
            Ok(Response::Ack)
        }
        Command::Test {
            component,
            seconds,
            value,
        } => {
            if state.status == Status::Test && component == TestComponent::None {
                state.request(Status::Off);
                return Ok(Response::Ack);
            }
            require_off(state)?;
            state.request(Status::Test);
            state.request_time = u32::from(seconds) * PERIODS_PER_SECOND;
            if let Some((actuator, level)) = component.drive(value) {
                state.outputs[actuator] = level;
            }
            Ok(Response::Ack)
        }
        Command::ReadCalibration => Ok(Response::Calibration(state.persistent.co2_cal)),
        Command::WriteCalibration(value) => {
            state.persistent.co2_cal = value;
            Ok(Response::Calibration(value))
        }
        Command::ListErrors => {
            let list = log.records().iter().map(|r| (r.code, r.counter)).collect();
            Ok(Response::Errors(list))
        }
        Command::ReadError(code) => log
            .find(code)
            .map(|r| Response::Error(*r))
            .ok_or(CommandError::UnknownError),
        Command::ClearErrors => {
            log.clear();
            Ok(Response::Ack)
        }
        Command::DatasetCount => Ok(Response::DatasetCount(STATUS_COUNT as u8)),
        Command::DatasetRead(status) => Ok(Response::Dataset(*table.entry(status))),
        Command::Query => Ok(Response::Status(Snapshot {
            status: state.status,
            remaining: state.remaining,
            request_time: state.request_time,
            outputs: state.outputs,
            readings: state.readings,
            persistent: state.persistent,
        })),
    }
}

fn require_off(state: &HeaterState) -> Result<(), CommandError> {
    if state.status == Status::Off {
        Ok(())
    } else {
        Err(CommandError::NotAllowed)
    }
}
