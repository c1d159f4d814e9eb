//! Scenario files
//!
//! A scenario is a TOML document describing the heater build, the
//! environment and a timeline of requests:
//!
//! ```toml
//! duration_s = 600
//!
//! [plant]
//! ambient_c = 5.0
//!
//! [[request]]
//! at_s = 1.0
//! command = "on"
//! mode = "parking"
//! minutes = 10
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ember_core::command::{Command, HeatMode, TestComponent};
use ember_core::config::HeaterConfig;
use ember_core::faults::ErrorCode;
use ember_core::heater::Status;
use serde::Deserialize;

use crate::model::PlantParams;

/// Simulated time when neither the scenario nor the command line sets one, s
pub const DEFAULT_DURATION_S: u32 = 900;

/// Interval between keep-alive refreshes of an active command, s
pub const DEFAULT_KEEPALIVE_S: u32 = 15;

/// Heating mode as written in scenario files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Generic,
    Parking,
    Vent,
    Supplemental,
}

impl From<Mode> for HeatMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Generic => HeatMode::Generic,
            Mode::Parking => HeatMode::Parking,
            Mode::Vent => HeatMode::Vent,
            Mode::Supplemental => HeatMode::Supplemental,
        }
    }
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Action {
    Off,
    On {
        mode: Mode,
        minutes: u8,
    },
    Check {
        code: u8,
    },
    FuelPrime {
        seconds: u16,
    },
    Test {
        component: u8,
        seconds: u8,
        #[serde(default)]
        value: u16,
    },
    ReadCalibration,
    WriteCalibration {
        value: u8,
    },
    ListErrors,
    ReadError {
        code: u8,
    },
    ClearErrors,
    DatasetCount,
    DatasetRead {
        status: Status,
    },
    Query,
    /// Press or release the front-panel switch
    Button {
        pressed: bool,
    },
}

impl Action {
    /// The request this action sends, or `None` for the front-panel switch
    pub fn command(&self) -> Result<Option<Command>> {
        let command = match *self {
            Action::Off => Command::Off,
            Action::On { mode, minutes } => Command::On {
                mode: mode.into(),
                minutes,
            },
            Action::Check { code } => Command::Check { code },
            Action::FuelPrime { seconds } => Command::FuelPrime { seconds },
            Action::Test {
                component,
                seconds,
                value,
            } => {
                let Some(component) = TestComponent::from_id(component) else {
                    bail!("unknown test component {component}");
                };
                Command::Test {
                    component,
                    seconds,
                    value,
                }
            }
            Action::ReadCalibration => Command::ReadCalibration,
            Action::WriteCalibration { value } => Command::WriteCalibration(value),
            Action::ListErrors => Command::ListErrors,
            Action::ReadError { code } => Command::ReadError(ErrorCode(code)),
            Action::ClearErrors => Command::ClearErrors,
            Action::DatasetCount => Command::DatasetCount,
            Action::DatasetRead { status } => Command::DatasetRead(status),
            Action::Query => Command::Query,
            Action::Button { .. } => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// A timed action
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    /// Simulated time the action happens at, s
    pub at_s: f32,
    #[serde(flatten)]
    pub action: Action,
}

/// A complete simulation setup
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Simulated time, s
    #[serde(default)]
    pub duration_s: Option<u32>,
    /// Keep-alive interval for active commands, s
    #[serde(default = "default_keepalive")]
    pub keepalive_s: u32,
    /// Controller configuration
    #[serde(default)]
    pub heater: HeaterConfig,
    /// Environment
    #[serde(default)]
    pub plant: PlantParams,
    /// Timeline, in any order
    #[serde(default, rename = "request")]
    pub requests: Vec<Request>,
}

fn default_keepalive() -> u32 {
    DEFAULT_KEEPALIVE_S
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            duration_s: None,
            keepalive_s: DEFAULT_KEEPALIVE_S,
            heater: HeaterConfig::default(),
            plant: PlantParams::default(),
            requests: Vec::new(),
        }
    }
}

impl Scenario {
    /// Parse and check a scenario document
    pub fn parse(text: &str) -> Result<Self> {
        let mut scenario: Scenario = toml::from_str(text).context("invalid scenario")?;
        scenario.validate()?;
        scenario
            .requests
            .sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
        Ok(scenario)
    }

    /// Read a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("loading {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.heater.jiffy_hz < crate::MIN_JIFFY_HZ {
            bail!(
                "jiffy_hz must be at least {} (got {})",
                crate::MIN_JIFFY_HZ,
                self.heater.jiffy_hz
            );
        }
        if self.heater.regulation_period == 0 {
            bail!("regulation_period must not be zero");
        }
        for request in &self.requests {
            if !request.at_s.is_finite() || request.at_s < 0.0 {
                bail!("request time {} is not a valid time", request.at_s);
            }
            request.action.command()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::config::FanModel;

    #[test]
    fn test_parse_timeline() {
        let scenario = Scenario::parse(
            r#"
            duration_s = 300

            [heater.burner]
            fan = "toy_blower"

            [plant]
            ambient_c = -10.0

            [[request]]
            at_s = 200
            command = "off"

            [[request]]
            at_s = 1.5
            command = "on"
            mode = "parking"
            minutes = 20
            "#,
        )
        .unwrap();

        assert_eq!(scenario.duration_s, Some(300));
        assert_eq!(scenario.keepalive_s, DEFAULT_KEEPALIVE_S);
        assert_eq!(scenario.heater.burner.fan, FanModel::ToyBlower);
        assert_eq!(scenario.heater.jiffy_hz, 4096);
        assert_eq!(scenario.plant.ambient_c, -10.0);
        assert_eq!(scenario.plant.supply_mv, 13_800);

        // Sorted by time
        assert_eq!(scenario.requests[0].at_s, 1.5);
        assert_eq!(
            scenario.requests[0].action.command().unwrap(),
            Some(Command::On {
                mode: HeatMode::Parking,
                minutes: 20
            })
        );
        assert_eq!(scenario.requests[1].action, Action::Off);
    }

    #[test]
    fn test_button_is_not_a_command() {
        let scenario = Scenario::parse(
            r#"
            [[request]]
            at_s = 3
            command = "button"
            pressed = true
            "#,
        )
        .unwrap();
        assert_eq!(scenario.requests[0].action.command().unwrap(), None);
    }

    #[test]
    fn test_rejects_unknown_component() {
        let err = Scenario::parse(
            r#"
            [[request]]
            at_s = 1
            command = "test"
            component = 7
            seconds = 10
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("unknown test component"));
    }

    #[test]
    fn test_rejects_slow_clock() {
        assert!(Scenario::parse("[heater]\njiffy_hz = 100\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_command() {
        assert!(Scenario::parse("[[request]]\nat_s = 1\ncommand = \"explode\"\n").is_err());
    }
}
