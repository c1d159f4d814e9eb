//! Dosing pump pulse generator
//!
//! The fuel dosing pump is a solenoid: every energizing pulse delivers one
//! fixed dose. Its actuator channel carries the stroke rate in Hz × 20;
//! the generator turns that into a pulse train of fixed on-time and
//! variable off-time, driven by a periodic timer.
//!
//! A rate of exactly 1 holds the solenoid energized to warm the pump
//! before a cold start.

use embedded_hal::digital::OutputPin;

use ember_hal::clock::Jiffies;
use ember_hal::timer::{TimerHandle, TimerService};

/// Stroke rate that keeps the solenoid energized
pub const PREWARM_RATE: u16 = 1;

/// Pulse length and timing base, in 1/128 s
const PULSE_TICKS: u32 = 4;
const TICK_HZ: u32 = 128;

/// Errors from the pump driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PumpError<E> {
    /// No free timer slot for the pulse train
    NoTimer,
    /// Driving the solenoid pin failed
    Pin(E),
}

/// Solenoid dosing pump on a GPIO pin
pub struct DosingPump<P> {
    pin: P,
    jiffy_hz: u32,
    rate: u16,
    off_time: Jiffies,
    timer: Option<TimerHandle>,
    energized: bool,
}

impl<P: OutputPin> DosingPump<P> {
    /// Create a stopped pump
    pub fn new(pin: P, jiffy_hz: u32) -> Self {
        Self {
            pin,
            jiffy_hz,
            rate: 0,
            off_time: 0,
            timer: None,
            energized: false,
        }
    }

    /// Commanded stroke rate, Hz × 20
    pub fn rate(&self) -> u16 {
        self.rate
    }

    /// Timer driving the pulse train, if running
    pub fn timer(&self) -> Option<TimerHandle> {
        self.timer
    }

    /// Whether the solenoid is currently energized
    pub fn is_energized(&self) -> bool {
        self.energized
    }

    /// Energizing pulse length, jiffies
    pub fn pulse_time(&self) -> Jiffies {
        (PULSE_TICKS * self.jiffy_hz / TICK_HZ).max(1)
    }

    /// Off-time between pulses for a stroke rate, jiffies
    ///
    /// One stroke every `20/rate` seconds, less the pulse itself.
    pub fn off_time_for(&self, rate: u16) -> Jiffies {
        let ticks = (TICK_HZ * 20 / u32::from(rate.max(1))).saturating_sub(PULSE_TICKS);
        (ticks * self.jiffy_hz / TICK_HZ).max(1)
    }

    /// Apply a new stroke rate
    pub fn set_rate<T: TimerService>(
        &mut self,
        rate: u16,
        timers: &mut T,
    ) -> Result<(), PumpError<P::Error>> {
        self.rate = rate;
        match rate {
            0 => {
                self.stop_timer(timers);
                self.drive(false)
            }
            PREWARM_RATE => {
                self.stop_timer(timers);
                self.drive(true)
            }
            _ => {
                self.off_time = self.off_time_for(rate);
                if self.timer.is_none() {
                    self.timer = Some(timers.create(self.off_time).ok_or(PumpError::NoTimer)?);
                }
                Ok(())
            }
        }
    }

    /// Pulse timer expiry: toggle the solenoid and rearm for the next phase
    ///
    /// Returns `true` so the scheduler stays awake while fuel is flowing.
    pub fn on_timer<T: TimerService>(&mut self, timers: &mut T) -> Result<bool, PumpError<P::Error>> {
        let Some(handle) = self.timer else {
            return Ok(false);
        };

        if self.energized {
            self.drive(false)?;
            timers.reset(handle, self.off_time);
        } else {
            self.drive(true)?;
            timers.reset(handle, self.pulse_time());
        }
        Ok(true)
    }

    fn stop_timer<T: TimerService>(&mut self, timers: &mut T) {
        if let Some(handle) = self.timer.take() {
            timers.destroy(handle);
        }
    }

    fn drive(&mut self, on: bool) -> Result<(), PumpError<P::Error>> {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(PumpError::Pin)?;
        self.energized = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use ember_hal::timer::SoftTimers;
    use embedded_hal::digital::ErrorType;

    #[derive(Default)]
    struct MockPin {
        high: bool,
        edges: u32,
    }

    impl ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            if !self.high {
                self.edges += 1;
            }
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn test_timing() {
        let pump = DosingPump::new(MockPin::default(), 4096);
        assert_eq!(pump.pulse_time(), 128);
        // 86 → 4.3 Hz: 29 ticks period, 25 ticks off
        assert_eq!(pump.off_time_for(86), 800);
        assert_eq!(pump.off_time_for(20), (128 - 4) * 32);
    }

    #[test]
    fn test_pulse_train() {
        let mut timers = SoftTimers::<2>::new();
        let mut pump = DosingPump::new(MockPin::default(), 4096);
        pump.set_rate(40, &mut timers).unwrap();
        assert_eq!(timers.active(), 1);

        // Two strokes per second at rate 40: count rising edges over 10 s
        let mut elapsed = 0;
        while elapsed < 40960 {
            let mut fired = 0;
            timers.advance(64, |handle| {
                assert_eq!(Some(handle), pump.timer());
                fired += 1;
                true
            });
            for _ in 0..fired {
                assert_eq!(pump.on_timer(&mut timers), Ok(true));
            }
            elapsed += 64;
        }
        assert_eq!(pump.pin.edges, 20);
    }

    #[test]
    fn test_stop_releases_timer() {
        let mut timers = SoftTimers::<2>::new();
        let mut pump = DosingPump::new(MockPin::default(), 4096);
        pump.set_rate(50, &mut timers).unwrap();
        pump.set_rate(0, &mut timers).unwrap();
        assert_eq!(timers.active(), 0);
        assert!(!pump.is_energized());
        assert_eq!(pump.on_timer(&mut timers), Ok(false));
    }

    #[test]
    fn test_prewarm_holds_solenoid() {
        let mut timers = SoftTimers::<2>::new();
        let mut pump = DosingPump::new(MockPin::default(), 4096);
        pump.set_rate(PREWARM_RATE, &mut timers).unwrap();
        assert_eq!(timers.active(), 0);
        assert!(pump.is_energized());
        assert!(pump.pin.high);
    }

    #[test]
    fn test_no_timer_slot() {
        let mut timers = SoftTimers::<1>::new();
        timers.create(10);
        let mut pump = DosingPump::new(MockPin::default(), 4096);
        assert_eq!(pump.set_rate(50, &mut timers), Err(PumpError::NoTimer));
    }
}
