//! Jiffy clock
//!
//! All controller timing is expressed in jiffies: ticks of a free-running
//! monotonic counter. The counter wraps at `u32::MAX`, so instants must be
//! compared through [`elapsed`] and [`deadline_reached`] rather than by
//! ordering raw values.

/// One tick of the monotonic hardware clock
pub type Jiffies = u32;

/// Idle window meaning "until the next device wakeup"
pub const IDLE_FOREVER: Jiffies = Jiffies::MAX;

/// Monotonic tick source with a low-power wait
pub trait Clock {
    /// Current tick count (wraps)
    fn now(&self) -> Jiffies;

    /// Power down for at most `max` jiffies
    ///
    /// Returns early if a device wakeup occurs (an interrupt handler or a
    /// timer callback requesting a wakeup). [`IDLE_FOREVER`] waits for the
    /// next wakeup without a time bound.
    fn idle(&self, max: Jiffies);
}

/// Jiffies elapsed from `earlier` to `now`, tolerant of one wraparound
#[inline]
pub const fn elapsed(now: Jiffies, earlier: Jiffies) -> Jiffies {
    now.wrapping_sub(earlier)
}

/// Whether `deadline` has been reached at `now`
///
/// Valid while the deadline lies less than half the counter range away.
#[inline]
pub const fn deadline_reached(now: Jiffies, deadline: Jiffies) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Convert milliseconds to jiffies for a clock running at `hz`
#[inline]
pub const fn ms_to_jiffies(ms: u32, hz: u32) -> Jiffies {
    ((ms as u64 * hz as u64) / 1000) as Jiffies
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_elapsed_across_wrap() {
        assert_eq!(elapsed(5, u32::MAX - 4), 10);
        assert_eq!(elapsed(100, 100), 0);
    }

    #[test]
    fn test_deadline_across_wrap() {
        let deadline = 3u32;
        assert!(!deadline_reached(u32::MAX, deadline));
        assert!(deadline_reached(3, deadline));
        assert!(deadline_reached(10, deadline));
    }

    #[test]
    fn test_ms_to_jiffies() {
        assert_eq!(ms_to_jiffies(1000, 4096), 4096);
        assert_eq!(ms_to_jiffies(100, 4096), 409);
        assert_eq!(ms_to_jiffies(0, 4096), 0);
    }

    proptest! {
        #[test]
        fn elapsed_matches_forward_distance(start: u32, delta in 0u32..0x7fff_ffff) {
            let now = start.wrapping_add(delta);
            prop_assert_eq!(elapsed(now, start), delta);
            prop_assert!(deadline_reached(now, start));
        }
    }
}
