//! Task control block table
//!
//! The [`Kernel`] holds the per-task scheduling flags. Tasks reach it by
//! shared reference and mark themselves sleeping or suspended; interrupt
//! handlers use it to wake tasks. The marks only take effect once the
//! task yields back to the scheduler.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use ember_hal::Jiffies;
use portable_atomic::{AtomicU32, AtomicU8, Ordering};

/// Task waits for an explicit wakeup
const FLAG_SUSPEND: u8 = 1 << 0;
/// Task waits for its sleep counter to reach zero
const FLAG_SLEEP: u8 = 1 << 1;

/// Small-integer task identity, assigned in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Registration index of this task
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Target of a [`Kernel::wakeup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeTarget {
    /// A single task
    Task(TaskId),
    /// Every registered task
    All,
}

/// Observable scheduling state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Eligible to run at the next decision
    Running,
    /// Sleeping with the given number of jiffies left
    Sleeping(Jiffies),
    /// Waiting for an explicit wakeup
    Suspended,
}

/// Shared task table for up to `N` tasks
///
/// Lives outside the [`Scheduler`](super::Scheduler) so tasks and interrupt
/// handlers can borrow it while the scheduler owns the task futures.
pub struct Kernel<const N: usize> {
    flags: [AtomicU8; N],
    sleep: [AtomicU32; N],
    current: AtomicU8,
}

impl<const N: usize> Kernel<N> {
    /// Create a table with every task running
    pub const fn new() -> Self {
        Self {
            flags: [const { AtomicU8::new(0) }; N],
            sleep: [const { AtomicU32::new(0) }; N],
            current: AtomicU8::new(0),
        }
    }

    /// Task currently being polled
    pub fn current(&self) -> TaskId {
        TaskId(self.current.load(Ordering::Relaxed))
    }

    /// Mark the calling task asleep for `jiffies`
    ///
    /// Takes effect at the next [`yield_now`](Self::yield_now).
    pub fn sleep(&self, jiffies: Jiffies) {
        let task = self.current().index();
        self.sleep[task].store(jiffies, Ordering::Relaxed);
        self.flags[task].fetch_or(FLAG_SLEEP, Ordering::Release);
    }

    /// Mark the calling task suspended until woken
    ///
    /// Takes effect at the next [`yield_now`](Self::yield_now).
    pub fn suspend(&self) {
        let task = self.current().index();
        self.flags[task].fetch_or(FLAG_SUSPEND, Ordering::Release);
    }

    /// Hand control back to the scheduler
    ///
    /// The returned future is pending exactly once; the task resumes right
    /// after the `.await` the next time the scheduler selects it.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow { yielded: false }
    }

    /// Sleep for `jiffies` and yield
    pub async fn delay(&self, jiffies: Jiffies) {
        self.sleep(jiffies);
        self.yield_now().await;
    }

    /// Suspend and yield
    pub async fn park(&self) {
        self.suspend();
        self.yield_now().await;
    }

    /// Clear sleep and suspend marks
    ///
    /// Only affects eligibility at the next scheduling decision; safe to
    /// call from interrupt context.
    pub fn wakeup(&self, target: WakeTarget) {
        match target {
            WakeTarget::Task(task) => {
                if let Some(flags) = self.flags.get(task.index()) {
                    flags.store(0, Ordering::Release);
                }
            }
            WakeTarget::All => {
                for flags in &self.flags {
                    flags.store(0, Ordering::Release);
                }
            }
        }
    }

    /// Scheduling state of `task`
    pub fn state(&self, task: TaskId) -> TaskState {
        let flags = self.flags[task.index()].load(Ordering::Acquire);
        if flags & FLAG_SUSPEND != 0 {
            TaskState::Suspended
        } else if flags & FLAG_SLEEP != 0 {
            TaskState::Sleeping(self.sleep[task.index()].load(Ordering::Relaxed))
        } else {
            TaskState::Running
        }
    }

    pub(crate) fn set_current(&self, task: TaskId) {
        self.current.store(task.0, Ordering::Relaxed);
    }

    /// Charge `elapsed` jiffies against every sleep counter, saturating at 0
    pub(crate) fn charge(&self, elapsed: Jiffies) {
        if elapsed == 0 {
            return;
        }
        for counter in &self.sleep {
            let left = counter.load(Ordering::Relaxed).saturating_sub(elapsed);
            counter.store(left, Ordering::Relaxed);
        }
    }

    /// Eligibility check used by the scheduler's scan
    ///
    /// A sleeper whose counter has run out loses its sleep mark here.
    pub(crate) fn poll_state(&self, index: usize) -> TaskState {
        let flags = self.flags[index].load(Ordering::Acquire);
        if flags & FLAG_SLEEP != 0 {
            let left = self.sleep[index].load(Ordering::Relaxed);
            if left > 0 {
                return TaskState::Sleeping(left);
            }
            self.flags[index].fetch_and(!FLAG_SLEEP, Ordering::AcqRel);
        }
        if flags & FLAG_SUSPEND != 0 {
            TaskState::Suspended
        } else {
            TaskState::Running
        }
    }
}

impl<const N: usize> Default for Kernel<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Kernel::yield_now`]
#[must_use = "a yield does nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}
