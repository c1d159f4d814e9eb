//! Round-robin cooperative scheduler
//!
//! Each task is a pinned future that never completes. The scheduler polls
//! one task at a time; a task gives the CPU back only at an `.await` on
//! [`Kernel::yield_now`], so its whole call stack is preserved in the
//! future's state between dispatches.
//!
//! Decision rule: charge the jiffies elapsed since the previous decision
//! against every sleep counter, then scan forward from the task after the
//! last one run. The first task that is neither sleeping nor suspended is
//! dispatched. If none is, the device idles for the shortest remaining
//! sleep (or until a wakeup when everything is suspended).

use core::convert::Infallible;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use ember_hal::clock::{elapsed, IDLE_FOREVER};
use ember_hal::{Clock, Jiffies};
use heapless::Vec;

use super::task::{Kernel, TaskId, TaskState};

/// A registered task body
pub type TaskFuture<'a> = Pin<&'a mut dyn Future<Output = Infallible>>;

/// Registration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    /// The task table is full
    TooManyTasks,
}

/// Outcome of one scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decision {
    /// Dispatch this task
    Run(TaskId),
    /// Nothing eligible; power down for at most this many jiffies
    Idle(Jiffies),
}

/// Cooperative scheduler for up to `N` tasks
pub struct Scheduler<'a, C: Clock, const N: usize> {
    kernel: &'a Kernel<N>,
    clock: &'a C,
    tasks: Vec<TaskFuture<'a>, N>,
    /// Last task dispatched; `None` until the first dispatch
    last: Option<usize>,
    previous: Jiffies,
}

impl<'a, C: Clock, const N: usize> Scheduler<'a, C, N> {
    /// Create a scheduler over `kernel`'s task table
    pub fn new(kernel: &'a Kernel<N>, clock: &'a C) -> Self {
        Self {
            kernel,
            clock,
            tasks: Vec::new(),
            last: None,
            previous: clock.now(),
        }
    }

    /// Add a task; only possible before [`run`](Self::run)
    pub fn register(&mut self, task: TaskFuture<'a>) -> Result<TaskId, RegisterError> {
        let id = TaskId(self.tasks.len() as u8);
        self.tasks
            .push(task)
            .map_err(|_| RegisterError::TooManyTasks)?;
        Ok(id)
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Pick the next task to run
    pub fn decide(&mut self) -> Decision {
        let now = self.clock.now();
        self.kernel.charge(elapsed(now, self.previous));
        self.previous = now;

        let count = self.tasks.len();
        let mut shortest = IDLE_FOREVER;

        // Scan starts just after the last task run, or at task 0
        let first = self.last.map_or(0, |last| last + 1);
        for offset in 0..count {
            let index = (first + offset) % count;
            match self.kernel.poll_state(index) {
                TaskState::Running => return Decision::Run(TaskId(index as u8)),
                TaskState::Sleeping(left) => shortest = shortest.min(left),
                TaskState::Suspended => {}
            }
        }

        Decision::Idle(shortest)
    }

    /// Poll `task` until its next yield
    pub fn dispatch(&mut self, task: TaskId) {
        let Some(future) = self.tasks.get_mut(task.index()) else {
            return;
        };

        self.last = Some(task.index());
        self.kernel.set_current(task);

        let mut cx = Context::from_waker(Waker::noop());
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(never) => match never {},
            Poll::Pending => {}
        }
    }

    /// Make one decision and act on it
    pub fn step(&mut self) -> Decision {
        let decision = self.decide();
        match decision {
            Decision::Run(task) => self.dispatch(task),
            Decision::Idle(window) => self.clock.idle(window),
        }
        decision
    }

    /// Dispatch forever
    pub fn run(mut self) -> ! {
        loop {
            self.step();
        }
    }
}
