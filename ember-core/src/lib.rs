//! Board-agnostic core logic for the Ember heater controller
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Cooperative task kernel (scheduler, sleep/suspend/wakeup)
//! - Combustion sequence table and the table-driven control engine
//! - Request handling and the error log
//! - Configuration types and persistent record codec
//! - Plant abstraction traits (sensors, actuators)
//! - The controller tasks tying them together

#![no_std]
#![deny(unsafe_code)]

pub mod command;
pub mod config;
pub mod controller;
pub mod faults;
pub mod heater;
pub mod kernel;
pub mod traits;

pub use controller::Controller;
