//! Combustion fan tachometer
//!
//! An edge interrupt records the period between revolutions; the
//! regulation tick counts how long ago the last edge was. If the fan stops
//! there are no edges to update the period, so after a window derived from
//! the fan's lowest regulated speed the period is forced to [`STALLED`].

use ember_hal::clock::{elapsed, Jiffies};

/// Period reported for a fan that has not turned within the window
pub const STALLED: u16 = u16::MAX;

/// Tick count that marks a freshly enabled tachometer as stalled
const RESTART_TICKS: u16 = 100;

/// Revolution period tracker
#[derive(Debug, Clone)]
pub struct Tachometer {
    jiffy_hz: u32,
    /// Regulation ticks without an edge before the fan counts as stalled
    window: u16,
    period: u16,
    last_edge: Option<Jiffies>,
    ticks_since_edge: u16,
}

impl Tachometer {
    /// Create a tachometer
    ///
    /// `tick_period` is the regulation tick in jiffies and `floor_rpm` the
    /// lowest speed the fan loop regulates; below it a missing edge means
    /// the fan is stopped.
    pub fn new(jiffy_hz: u32, tick_period: Jiffies, floor_rpm: u16) -> Self {
        let per_revolution = u64::from(tick_period) * u64::from(floor_rpm);
        let window = match per_revolution {
            0 => u16::MAX,
            n => (60 * u64::from(jiffy_hz) / n).min(u64::from(u16::MAX)) as u16,
        };

        Self {
            jiffy_hz,
            window,
            period: STALLED,
            last_edge: None,
            ticks_since_edge: RESTART_TICKS,
        }
    }

    /// Stall window in regulation ticks
    pub fn window(&self) -> u16 {
        self.window
    }

    /// Record a revolution edge seen at `now`
    pub fn edge(&mut self, now: Jiffies) {
        if let Some(last) = self.last_edge {
            let period = elapsed(now, last).clamp(1, u32::from(STALLED));
            self.period = period as u16;
        }
        self.last_edge = Some(now);
        self.ticks_since_edge = 0;
    }

    /// Advance by one regulation tick
    pub fn tick(&mut self) {
        if self.ticks_since_edge > self.window {
            self.period = STALLED;
        } else {
            self.ticks_since_edge = self.ticks_since_edge.saturating_add(1);
        }
    }

    /// Forget the speed history; the fan reads as stalled until two edges
    pub fn reset(&mut self) {
        self.period = STALLED;
        self.last_edge = None;
        self.ticks_since_edge = RESTART_TICKS;
    }

    /// Last revolution period in jiffies
    pub fn period(&self) -> u16 {
        self.period
    }

    /// Fan speed, RPM; a stalled fan reads 0
    pub fn rpm(&self) -> u16 {
        if self.period == STALLED {
            return 0;
        }
        let rpm = self.jiffy_hz.saturating_mul(60) / u32::from(self.period.max(1));
        rpm.min(u32::from(u16::MAX)) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tacho() -> Tachometer {
        // 4096 Hz jiffies, 384 jiffy regulation tick, 140 rpm floor
        Tachometer::new(4096, 384, 140)
    }

    #[test]
    fn test_window() {
        assert_eq!(tacho().window(), 4);
        assert_eq!(Tachometer::new(4096, 0, 140).window(), u16::MAX);
    }

    #[test]
    fn test_rpm_from_period() {
        let mut t = tacho();
        t.edge(1000);
        t.edge(1000 + 4096 / 40);
        // 102 jiffies per revolution ≈ 2409 rpm
        assert_eq!(t.period(), 102);
        assert_eq!(t.rpm(), 2409);
    }

    #[test]
    fn test_edges_across_wrap() {
        let mut t = tacho();
        t.edge(u32::MAX - 49);
        t.edge(50);
        assert_eq!(t.period(), 100);
    }

    #[test]
    fn test_stall_after_window() {
        let mut t = tacho();
        t.edge(0);
        t.edge(100);
        for _ in 0..=t.window() {
            t.tick();
            assert_eq!(t.period(), 100);
        }
        t.tick();
        assert_eq!(t.period(), STALLED);
        assert_eq!(t.rpm(), 0);
    }

    #[test]
    fn test_reset_reads_stalled() {
        let mut t = tacho();
        t.edge(0);
        t.edge(100);
        t.reset();
        assert_eq!(t.period(), STALLED);
        t.tick();
        assert_eq!(t.period(), STALLED);
        // The first edge after a reset has nothing to measure against
        t.edge(5000);
        assert_eq!(t.rpm(), 0);
        t.edge(5100);
        assert_eq!(t.period(), 100);
    }
}
