//! Ember Hardware Abstraction Layer
//!
//! This crate defines the hardware services the heater controller core
//! consumes. Board crates (RP2040 firmware, host simulator) implement them,
//! so the same kernel and control engine run unchanged on either.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ember-core (kernel, control engine)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  ember-hal (this crate - traits)        │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ ember-firmware│       │   ember-sim   │
//! │   (RP2040)    │       │    (host)     │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`clock::Clock`] - Monotonic jiffy counter and idle power-down
//! - [`timer::TimerService`] - Periodic timers with wakeup requests
//! - [`flash::FlashStorage`] - Persistent key/value storage

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod flash;
pub mod timer;

// Re-export key traits at crate root for convenience
pub use clock::{Clock, Jiffies};
pub use flash::{FlashError, FlashStorage, RamStorage, StorageKey};
pub use timer::{SoftTimers, TimerHandle, TimerService};
