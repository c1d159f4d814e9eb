//! Cooperative task kernel
//!
//! Single-threaded multitasking for the controller: a fixed table of
//! never-ending tasks, each blocking only through sleep/suspend followed by
//! a yield. Interrupt handlers never enter the scheduler; they only clear
//! task flags through [`Kernel::wakeup`].
//!
//! ```text
//!   task ──sleep(j)/suspend()──► Kernel flags ◄──wakeup()── ISR
//!     │                              │
//!     └──yield_now().await──► Scheduler::decide ──► Clock::idle
//! ```

mod scheduler;
mod task;

pub use scheduler::{Decision, RegisterError, Scheduler, TaskFuture};
pub use task::{Kernel, TaskId, TaskState, WakeTarget, YieldNow};
