//! Host simulator for the Ember heater controller
//!
//! Runs the unmodified kernel and controller from `ember-core` against a
//! first-order model of the burner. The simulated board drives the same
//! regulation loops and pump driver the firmware uses, from a software
//! timer wheel that advances whenever the scheduler idles.
//!
//! ```text
//! Scenario ──► script task ──► Controller ◄── control / sensor tasks
//!                                  │
//!                               SimPlant
//!                                  │
//!              Board (clock, timers, loops, pump) ──► HeaterModel
//! ```

pub mod board;
pub mod model;
pub mod scenario;
pub mod script;

use core::pin::pin;

use anyhow::{anyhow, Result};
use ember_core::config::RECORD_MAX;
use ember_core::faults::{ErrorCode, ErrorLog};
use ember_core::heater::{Cause, PersistentData, Sensor, Status};
use ember_core::kernel::{Kernel, Scheduler};
use ember_core::Controller;
use ember_hal::clock::{elapsed, Clock};
use ember_hal::RamStorage;
use tracing::{debug, info, warn};

pub use board::{Board, SimPlant};
pub use model::{HeaterModel, PlantParams};
pub use scenario::{Scenario, DEFAULT_DURATION_S};
pub use script::Script;

/// Scheduler tasks: control, sensors, script
pub const TASKS: usize = 3;

/// Slowest jiffy clock the controller periods divide cleanly into
pub const MIN_JIFFY_HZ: u32 = 1024;

/// How often the run logs a plant snapshot, s
const SNAPSHOT_S: f32 = 10.0;

/// The controller as wired up by the simulator
pub type SimController<'a> = Controller<'a, SimPlant<'a>, RamStorage<RECORD_MAX>, Board, TASKS>;

/// One status change seen during a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Simulated time, s
    pub at_s: f32,
    /// Status before
    pub from: Status,
    /// Status after
    pub to: Status,
    /// What triggered it
    pub cause: Option<Cause>,
    /// Error logged with it
    pub error: Option<ErrorCode>,
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct Summary {
    /// Status when the run ended
    pub status: Status,
    /// Every status change, in order
    pub events: Vec<Event>,
    /// Error log at the end
    pub errors: ErrorLog,
    /// Counters at the end
    pub persistent: PersistentData,
    /// Records that failed to persist
    pub persist_failures: u32,
    /// Dosing pump strokes delivered
    pub strokes: u32,
    /// Hottest heat exchanger temperature seen, °C
    pub peak_exchanger_c: f32,
}

impl Summary {
    /// Statuses visited, in order, starting with the boot status
    pub fn path(&self) -> Vec<Status> {
        let mut path = vec![self.events.first().map_or(self.status, |e| e.from)];
        path.extend(self.events.iter().map(|e| e.to));
        path
    }

    /// Whether the run passed through `status`
    pub fn visited(&self, status: Status) -> bool {
        self.path().contains(&status)
    }
}

/// Run `scenario` for `duration_s` seconds of simulated time
pub fn run(scenario: &Scenario, duration_s: u32) -> Result<Summary> {
    let kernel = Kernel::<TASKS>::new();
    let board = Board::new(&scenario.heater, scenario.plant);
    let script = Script::new(scenario, &board);
    let controller: SimController<'_> = Controller::new(
        &kernel,
        &board,
        scenario.heater,
        board.plant(),
        RamStorage::new(),
    );

    let control = pin!(controller.control_task());
    let sensors = pin!(controller.sensor_task());
    let requests = pin!(script::run(&kernel, &board, &controller, &script));

    let mut scheduler = Scheduler::new(&kernel, &board);
    let registered = scheduler
        .register(control)
        .and_then(|_| scheduler.register(sensors))
        .and_then(|_| scheduler.register(requests));
    registered.map_err(|e| anyhow!("registering tasks: {e:?}"))?;

    info!(
        requests = script.len(),
        duration_s,
        ambient_c = scenario.plant.ambient_c,
        "simulation starting"
    );

    let end = board.seconds(duration_s as f32);
    let start = board.now();
    let mut status = controller.status();
    let mut events = Vec::new();
    let mut peak_exchanger_c = board.model().exchanger_c();
    let mut next_snapshot = 0.0;

    while elapsed(board.now(), start) < end {
        scheduler.step();

        let current = controller.status();
        if current != status {
            let iteration = controller.last_iteration();
            let event = Event {
                at_s: board.time_s(),
                from: status,
                to: current,
                cause: iteration.transition.map(|t| t.cause),
                error: iteration.error,
            };
            match event.error {
                Some(code) => warn!(
                    at_s = event.at_s,
                    from = ?event.from,
                    to = ?event.to,
                    cause = ?event.cause,
                    error = ?code,
                    "status change with error"
                ),
                None => info!(
                    at_s = event.at_s,
                    from = ?event.from,
                    to = ?event.to,
                    cause = ?event.cause,
                    "status change"
                ),
            }
            events.push(event);
            status = current;
        }

        let model = board.model();
        peak_exchanger_c = peak_exchanger_c.max(model.exchanger_c());
        if board.time_s() >= next_snapshot {
            next_snapshot += SNAPSHOT_S;
            let readings = controller.snapshot().readings;
            debug!(
                at_s = board.time_s(),
                ?status,
                exchanger_c = model.exchanger_c(),
                nozzle_c = model.nozzle_c(),
                fan_rpm = board.fan_rpm(),
                pressure = model.pressure(),
                burning = model.is_burning(),
                seebeck_mv = readings[Sensor::GlowPlugVoltage],
                flame = readings[Sensor::Flame],
                "plant"
            );
        }
    }

    let summary = Summary {
        status: controller.status(),
        events,
        errors: controller.errors(),
        persistent: controller.snapshot().persistent,
        persist_failures: controller.persist_failures(),
        strokes: board.model().strokes(),
        peak_exchanger_c,
    };

    info!(
        status = ?summary.status,
        transitions = summary.events.len(),
        errors = summary.errors.len(),
        strokes = summary.strokes,
        starts = summary.persistent.start_counter,
        "simulation finished"
    );

    Ok(summary)
}
