//! Controller tasks
//!
//! [`Controller`] owns the heater state, the engine, the error log, the
//! plant and the flash store, and provides the task bodies the scheduler
//! runs:
//!
//! - [`control_task`](Controller::control_task): one engine iteration per
//!   control period, the front-panel switch, persistence. Parks while the
//!   heater is off and nobody is talking to it.
//! - [`sensor_task`](Controller::sensor_task): samples the plant, derives
//!   the virtual channels and flags fresh samples for supervision.
//!
//! Requests enter through [`handle`](Controller::handle).
//!
//! Only one task runs at a time and no borrow is held across an `.await`,
//! so plain `RefCell`s are enough.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;

use ember_hal::clock::elapsed;
use ember_hal::{Clock, FlashStorage, Jiffies, StorageKey};
use serde::Serialize;

use crate::command::{process_command, Command, CommandError, Response, Snapshot};
use crate::config::{self, HeaterConfig, PersistError};
use crate::faults::ErrorLog;
use crate::heater::{
    heating_power, Engine, FlameObserver, HeaterState, Iteration, PersistentData, Sensor,
    SequenceTable, Status, PERIODS_PER_SECOND,
};
use crate::kernel::{Kernel, WakeTarget};
use crate::traits::{ActuatorOutput, SensorInput};

/// Run time granted by a front-panel press, periods (60 min)
pub const BUTTON_BUDGET: u32 = 60 * 60 * PERIODS_PER_SECOND;

/// Refresh window kept while the front-panel switch is held, periods
pub const BUTTON_REFRESH: u32 = 1000;

/// Sensor sampling period while running, ms
const SAMPLE_MS: u32 = 100;

/// Sensor sampling period while off or locked, ms
const DORMANT_SAMPLE_MS: u32 = 10_000;

/// How long a request keeps the controller awake, ms
const ACTIVITY_GRACE_MS: u32 = 10_000;

/// Heater controller shared by the tasks
pub struct Controller<'a, P, S, C, const N: usize> {
    kernel: &'a Kernel<N>,
    clock: &'a C,
    config: HeaterConfig,
    engine: RefCell<Engine>,
    state: RefCell<HeaterState>,
    log: RefCell<ErrorLog>,
    plant: RefCell<P>,
    storage: RefCell<S>,
    flame: Cell<FlameObserver>,
    active_since: Cell<Option<Jiffies>>,
    button: Cell<bool>,
    persist_failures: Cell<u32>,
    last: Cell<Iteration>,
}

impl<'a, P, S, C, const N: usize> Controller<'a, P, S, C, N>
where
    P: SensorInput + ActuatorOutput,
    S: FlashStorage,
    C: Clock,
{
    /// Create a controller, restoring persistent records from `storage`
    ///
    /// Missing or unreadable records fall back to factory defaults; a
    /// stored sequence table replaces the factory one for the burner.
    pub fn new(
        kernel: &'a Kernel<N>,
        clock: &'a C,
        config: HeaterConfig,
        plant: P,
        mut storage: S,
    ) -> Self {
        let persistent: PersistentData =
            config::load(&mut storage, StorageKey::Counters).unwrap_or_default();
        let log: ErrorLog = config::load(&mut storage, StorageKey::ErrorLog).unwrap_or_default();
        let table = config::load(&mut storage, StorageKey::SequenceTable)
            .unwrap_or_else(|_| SequenceTable::factory(config.burner));

        Self {
            kernel,
            clock,
            config,
            engine: RefCell::new(Engine::new(table)),
            state: RefCell::new(HeaterState::new(persistent)),
            log: RefCell::new(log),
            plant: RefCell::new(plant),
            storage: RefCell::new(storage),
            flame: Cell::new(FlameObserver::new()),
            active_since: Cell::new(Some(clock.now())),
            button: Cell::new(false),
            persist_failures: Cell::new(0),
            last: Cell::new(Iteration::default()),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &HeaterConfig {
        &self.config
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.state.borrow().status
    }

    /// Copy of the error log
    pub fn errors(&self) -> ErrorLog {
        self.log.borrow().clone()
    }

    /// Operating snapshot
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.borrow();
        Snapshot {
            status: state.status,
            remaining: state.remaining,
            request_time: state.request_time,
            outputs: state.outputs,
            readings: state.readings,
            persistent: state.persistent,
        }
    }

    /// Outcome of the most recent engine iteration
    pub fn last_iteration(&self) -> Iteration {
        self.last.get()
    }

    /// Number of records that failed to persist
    pub fn persist_failures(&self) -> u32 {
        self.persist_failures.get()
    }

    /// Run `f` on the plant
    pub fn with_plant<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.plant.borrow_mut())
    }

    /// Run `f` on the flash store
    pub fn with_storage<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.storage.borrow_mut())
    }

    /// Whether a request arrived within the activity grace window
    pub fn is_active(&self) -> bool {
        self.active_since.get().is_some()
    }

    /// Process one request
    ///
    /// Marks the controller active and wakes every task when the request
    /// left an override for the engine.
    pub fn handle(&self, command: &Command) -> Result<Response, CommandError> {
        let (result, wake) = {
            let mut state = self.state.borrow_mut();
            let mut log = self.log.borrow_mut();
            let engine = self.engine.borrow();

            let calibration = state.persistent.co2_cal;
            let result = process_command(command, &mut state, &mut log, engine.table());

            if state.persistent.co2_cal != calibration {
                self.persist(StorageKey::Counters, &state.persistent);
            }
            if log.take_dirty() {
                self.persist(StorageKey::ErrorLog, &*log);
            }
            (result, state.pending.is_some())
        };

        self.active_since.set(Some(self.clock.now()));
        if wake {
            self.kernel.wakeup(WakeTarget::All);
        }
        result
    }

    /// Engine task: iterate every control period
    pub async fn control_task(&self) -> Infallible {
        let period = self.config.heater_period();
        loop {
            let idle = self.control_step();
            if idle {
                self.kernel.park().await;
            } else {
                self.kernel.delay(period).await;
            }
        }
    }

    /// Sensor task: sample, derive virtual channels, flag fresh cycles
    pub async fn sensor_task(&self) -> Infallible {
        loop {
            let period = self.sensor_step();
            self.kernel.delay(period).await;
        }
    }

    /// One control period; returns whether the task should park
    fn control_step(&self) -> bool {
        let mut plant = self.plant.borrow_mut();
        let mut state = self.state.borrow_mut();
        let mut log = self.log.borrow_mut();

        let pressed = plant.button();
        self.front_panel(&mut state, pressed);

        let iteration = self
            .engine
            .borrow_mut()
            .iterate(&mut state, &mut log, &mut *plant);
        self.last.set(iteration);

        if iteration.counters_dirty {
            self.persist(StorageKey::Counters, &state.persistent);
        }
        if log.take_dirty() {
            self.persist(StorageKey::ErrorLog, &*log);
        }

        let idle = state.status == Status::Off && !self.is_active();
        plant.set_power(!idle);
        idle
    }

    /// Front-panel switch: press starts, hold keeps alive, release stops
    fn front_panel(&self, state: &mut HeaterState, pressed: bool) {
        let was_pressed = self.button.replace(pressed);

        if pressed {
            state.refresh_countdown = BUTTON_REFRESH;
            if !was_pressed {
                state.request_time = BUTTON_BUDGET;
                state.request(Status::Start);
            }
        } else if was_pressed
            && !matches!(
                state.status,
                Status::Locked | Status::Stop | Status::Cooldown | Status::End
            )
        {
            state.refresh_countdown = 0;
            state.request(Status::Stop);
        }
    }

    /// One sensor sample; returns the delay until the next one
    fn sensor_step(&self) -> Jiffies {
        let mut plant = self.plant.borrow_mut();
        let mut state = self.state.borrow_mut();

        let fresh = plant.is_fresh();
        let mut readings = state.readings;
        plant.read(&mut readings);

        if state.status.is_combustion() {
            let mut flame = self.flame.get();
            let seen = flame.update(readings[Sensor::GlowPlugVoltage]);
            self.flame.set(flame);
            readings[Sensor::Flame] = u16::from(seen);
            readings[Sensor::HeatingPower] = heating_power(&state.outputs);
        } else {
            readings[Sensor::Flame] = 0;
            readings[Sensor::HeatingPower] = 0;
        }
        state.readings = readings;

        if fresh {
            state.sensors_fresh = true;
        }

        let now = self.clock.now();
        if let Some(since) = self.active_since.get() {
            if elapsed(now, since) > self.config.ms(ACTIVITY_GRACE_MS) {
                self.active_since.set(None);
            }
        }

        if state.status.is_dormant() && !self.is_active() {
            self.config.ms(DORMANT_SAMPLE_MS)
        } else {
            self.config.ms(SAMPLE_MS)
        }
    }

    fn persist<T: Serialize>(&self, key: StorageKey, value: &T) {
        let result: Result<(), PersistError> =
            config::save(&mut *self.storage.borrow_mut(), key, value);
        if let Err(_e) = result {
            #[cfg(feature = "defmt")]
            defmt::warn!("persisting {} failed: {}", key, _e);
            self.persist_failures.set(self.persist_failures.get() + 1);
        }
    }
}
