//! SysTick jiffy clock
//!
//! SysTick interrupts at [`JIFFY_HZ`]; the handler in `main` counts
//! jiffies, advances the board's timer wheel and raises [`request_wake`]
//! when a timer callback asks for the scheduler.

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;
use ember_hal::clock::{elapsed, Clock, Jiffies, IDLE_FOREVER};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Jiffy clock frequency, Hz
pub const JIFFY_HZ: u32 = 4096;

static JIFFIES: AtomicU32 = AtomicU32::new(0);
static WAKE: AtomicBool = AtomicBool::new(false);

/// Start SysTick at [`JIFFY_HZ`] from the core clock
pub fn start(mut syst: SYST, sys_hz: u32) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(sys_hz / JIFFY_HZ - 1);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}

/// Count one jiffy; returns the new time
pub fn tick() -> Jiffies {
    JIFFIES.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// End the current idle period early
pub fn request_wake() {
    WAKE.store(true, Ordering::Release);
}

/// The board's jiffy clock
pub struct JiffyClock;

impl Clock for JiffyClock {
    fn now(&self) -> Jiffies {
        JIFFIES.load(Ordering::Relaxed)
    }

    fn idle(&self, max: Jiffies) {
        let start = self.now();
        loop {
            if WAKE.swap(false, Ordering::AcqRel) {
                return;
            }
            if max != IDLE_FOREVER && elapsed(self.now(), start) >= max {
                return;
            }
            // A wake raised after the check is seen on the next jiffy
            cortex_m::asm::wfi();
        }
    }
}
