//! Scripted requests
//!
//! A third scheduler task plays the scenario timeline into the controller
//! the way a remote or diagnostic tool would, and keeps an active command
//! alive with periodic refreshes.

use std::convert::Infallible;

use ember_core::command::{Command, Response};
use ember_core::kernel::{Kernel, WakeTarget};
use ember_hal::clock::{deadline_reached, Clock, Jiffies};
use tracing::{debug, info, warn};

use crate::board::Board;
use crate::scenario::{Action, Scenario};
use crate::{SimController, TASKS};

/// A timeline entry resolved to jiffies
#[derive(Debug, Clone)]
struct Step {
    at: Jiffies,
    action: Action,
}

/// The scenario timeline in board time
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<Step>,
    keepalive: Jiffies,
}

impl Script {
    /// Resolve a scenario's requests against the board clock
    pub fn new(scenario: &Scenario, board: &Board) -> Self {
        let steps = scenario
            .requests
            .iter()
            .map(|request| Step {
                at: board.seconds(request.at_s),
                action: request.action.clone(),
            })
            .collect();

        Self {
            steps,
            keepalive: board.seconds(scenario.keepalive_s as f32).max(1),
        }
    }

    /// Number of timeline entries
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the timeline is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Command being kept alive and when to refresh it next
#[derive(Debug, Clone, Copy)]
struct KeepAlive {
    code: u8,
    due: Jiffies,
}

/// Task body playing `script`
pub async fn run(
    kernel: &Kernel<TASKS>,
    board: &Board,
    controller: &SimController<'_>,
    script: &Script,
) -> Infallible {
    let mut next = 0;
    let mut keepalive: Option<KeepAlive> = None;

    loop {
        let now = board.now();

        while let Some(step) = script.steps.get(next) {
            if !deadline_reached(now, step.at) {
                break;
            }
            next += 1;
            let due = now.wrapping_add(script.keepalive);
            keepalive = apply(kernel, board, controller, &step.action, keepalive, due);
        }

        if let Some(alive) = keepalive {
            if deadline_reached(now, alive.due) {
                keepalive = match controller.handle(&Command::Check { code: alive.code }) {
                    Ok(Response::Refreshed(true)) => Some(KeepAlive {
                        code: alive.code,
                        due: now.wrapping_add(script.keepalive),
                    }),
                    _ => {
                        debug!(code = alive.code, "command no longer active");
                        None
                    }
                };
            }
        }

        let wait = script
            .steps
            .get(next)
            .map(|step| step.at)
            .into_iter()
            .chain(keepalive.map(|alive| alive.due))
            .map(|at| at.wrapping_sub(now))
            .min();

        match wait {
            Some(jiffies) => kernel.delay(jiffies.max(1)).await,
            None => kernel.park().await,
        }
    }
}

/// Perform one action; returns the keep-alive state after it
fn apply(
    kernel: &Kernel<TASKS>,
    board: &Board,
    controller: &SimController<'_>,
    action: &Action,
    keepalive: Option<KeepAlive>,
    due: Jiffies,
) -> Option<KeepAlive> {
    let at_s = board.time_s();

    if let Action::Button { pressed } = *action {
        info!(at_s, pressed, "front-panel switch");
        board.set_button(pressed);
        // The switch input interrupt
        kernel.wakeup(WakeTarget::All);
        return keepalive;
    }

    // Actions are checked when the scenario loads
    let Ok(Some(command)) = action.command() else {
        return keepalive;
    };

    match controller.handle(&command) {
        Ok(response) => {
            info!(at_s, ?command, ?response, "request");
            match command {
                Command::On { mode, .. } => Some(KeepAlive {
                    code: mode.code(),
                    due,
                }),
                Command::Off => None,
                _ => keepalive,
            }
        }
        Err(e) => {
            warn!(at_s, ?command, ?e, "request refused");
            keepalive
        }
    }
}
