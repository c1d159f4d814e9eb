//! Periodic timers
//!
//! Timers fire a callback from interrupt context every `interval` jiffies.
//! A callback returns `true` to request a scheduler wakeup, which cuts the
//! current idle window short.
//!
//! Instead of raw callback pointers, [`SoftTimers::advance`] hands each
//! expired [`TimerHandle`] to a dispatch closure; the owner routes the
//! handle to whatever the timer drives (regulation loop, pump pulse).

use crate::clock::Jiffies;

/// Identifies an allocated timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerHandle(u8);

impl TimerHandle {
    /// Slot index of this timer
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Timer registration service
pub trait TimerService {
    /// Allocate a periodic timer
    ///
    /// Returns `None` when every slot is in use.
    fn create(&mut self, interval: Jiffies) -> Option<TimerHandle>;

    /// Release a timer; its slot may be handed out again
    fn destroy(&mut self, handle: TimerHandle);

    /// Restart a timer with a new interval, counting from now
    fn reset(&mut self, handle: TimerHandle, interval: Jiffies);
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    interval: Jiffies,
    remaining: Jiffies,
}

/// Fixed-capacity software timer wheel
///
/// Driven by whoever owns the tick source: a SysTick handler on target,
/// the simulated clock on the host.
#[derive(Debug)]
pub struct SoftTimers<const N: usize> {
    slots: [Option<Slot>; N],
}

impl<const N: usize> SoftTimers<N> {
    /// Create an empty timer wheel
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    /// Number of timers currently allocated
    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Jiffies until the earliest timer expires
    pub fn next_deadline(&self) -> Option<Jiffies> {
        self.slots.iter().flatten().map(|s| s.remaining).min()
    }

    /// Advance all timers by `elapsed` jiffies
    ///
    /// `dispatch` runs once per expiry (several times for one timer if
    /// `elapsed` spans multiple intervals). Returns `true` if any callback
    /// requested a wakeup.
    pub fn advance(&mut self, elapsed: Jiffies, mut dispatch: impl FnMut(TimerHandle) -> bool) -> bool {
        let mut wake = false;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot.as_mut() else {
                continue;
            };

            let mut left = elapsed;
            while left >= slot.remaining {
                left -= slot.remaining;
                slot.remaining = slot.interval;
                wake |= dispatch(TimerHandle(index as u8));
            }
            slot.remaining -= left;
        }

        wake
    }
}

impl<const N: usize> Default for SoftTimers<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TimerService for SoftTimers<N> {
    fn create(&mut self, interval: Jiffies) -> Option<TimerHandle> {
        let interval = interval.max(1);
        let index = self.slots.iter().position(|s| s.is_none())?;
        self.slots[index] = Some(Slot {
            interval,
            remaining: interval,
        });
        Some(TimerHandle(index as u8))
    }

    fn destroy(&mut self, handle: TimerHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            *slot = None;
        }
    }

    fn reset(&mut self, handle: TimerHandle, interval: Jiffies) {
        let interval = interval.max(1);
        if let Some(Some(slot)) = self.slots.get_mut(handle.index()) {
            slot.interval = interval;
            slot.remaining = interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_until_full() {
        let mut timers = SoftTimers::<2>::new();
        assert!(timers.create(10).is_some());
        assert!(timers.create(10).is_some());
        assert!(timers.create(10).is_none());
        assert_eq!(timers.active(), 2);
    }

    #[test]
    fn test_destroy_frees_slot() {
        let mut timers = SoftTimers::<1>::new();
        let handle = timers.create(10).unwrap();
        timers.destroy(handle);
        assert_eq!(timers.active(), 0);
        assert_eq!(timers.create(5), Some(handle));
    }

    #[test]
    fn test_periodic_expiry() {
        let mut timers = SoftTimers::<2>::new();
        let handle = timers.create(12).unwrap();

        let mut fired = 0;
        assert!(!timers.advance(11, |_| {
            fired += 1;
            true
        }));
        assert_eq!(fired, 0);

        assert!(timers.advance(1, |h| {
            assert_eq!(h, handle);
            fired += 1;
            true
        }));
        assert_eq!(fired, 1);

        // Spanning two and a half intervals fires twice
        timers.advance(30, |_| {
            fired += 1;
            false
        });
        assert_eq!(fired, 3);
        assert_eq!(timers.next_deadline(), Some(6));
    }

    #[test]
    fn test_wakeup_only_when_requested() {
        let mut timers = SoftTimers::<2>::new();
        timers.create(4).unwrap();
        assert!(!timers.advance(4, |_| false));
    }

    #[test]
    fn test_reset_restarts_countdown() {
        let mut timers = SoftTimers::<1>::new();
        let handle = timers.create(100).unwrap();
        timers.advance(90, |_| false);
        timers.reset(handle, 20);
        assert_eq!(timers.next_deadline(), Some(20));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut timers = SoftTimers::<1>::new();
        timers.create(0).unwrap();
        let mut fired = 0;
        timers.advance(3, |_| {
            fired += 1;
            false
        });
        assert_eq!(fired, 3);
    }
}
