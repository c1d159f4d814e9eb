//! Fixed-point PID loop
//!
//! One discrete-time controller per regulated actuator. The error and its
//! integral are 16-bit quantities; the integral saturates instead of
//! wrapping so a long stall cannot flip the sign of the correction.

use ember_core::config::LoopGains;
use ember_core::heater::ACTMAX;

use crate::fixed::{mac3, Q16};

/// Supply voltage the open-loop fallback is calibrated at, mV
pub const NOMINAL_SUPPLY_MV: u16 = 12500;

/// PID controller with Q16 gains and an output in [0, ACTMAX]
#[derive(Debug, Clone)]
pub struct PidLoop {
    gains: LoopGains,
    /// Error of the previous iteration
    previous: i16,
    integral: i16,
    output: u16,
    disabled: bool,
}

impl PidLoop {
    /// Create a loop with the given gains
    pub const fn new(gains: LoopGains) -> Self {
        Self {
            gains,
            previous: 0,
            integral: 0,
            output: 0,
            disabled: false,
        }
    }

    /// Current gains
    pub fn gains(&self) -> &LoopGains {
        &self.gains
    }

    /// Replace the gains
    ///
    /// Resets the loop state so the old integral does not carry over.
    pub fn set_gains(&mut self, gains: LoopGains) {
        self.gains = gains;
        self.reset();
    }

    /// Clear the derivative memory and the integral accumulator
    pub fn reset(&mut self) {
        self.previous = 0;
        self.integral = 0;
        self.output = 0;
    }

    /// Force the output to zero regardless of the setpoint
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
        if disabled {
            self.reset();
        }
    }

    /// Whether the loop is forced off
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Output of the last iteration
    pub fn output(&self) -> u16 {
        self.output
    }

    /// Integral accumulator
    pub fn integral(&self) -> i16 {
        self.integral
    }

    /// Run one iteration
    ///
    /// `measured` is in the setpoint's domain; `supply_mv` is only used when
    /// the loop runs open loop. A setpoint at or below the floor turns the
    /// actuator off and resets the loop.
    pub fn update(&mut self, setpoint: u16, measured: u16, supply_mv: u16) -> u16 {
        if self.disabled || setpoint <= self.gains.floor {
            self.reset();
            return 0;
        }

        let output = if self.gains.closed_loop {
            self.regulate(setpoint, measured)
        } else {
            open_loop(setpoint, supply_mv)
        };

        self.output = output;
        output
    }

    fn regulate(&mut self, setpoint: u16, measured: u16) -> u16 {
        let error = (i32::from(setpoint) - i32::from(measured))
            .clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;

        self.integral = self.integral.saturating_add(error);
        let delta = i32::from(error) - i32::from(self.previous);
        self.previous = error;

        let out = mac3([
            (i32::from(error), Q16(self.gains.p)),
            (delta, Q16(self.gains.d)),
            (i32::from(self.integral), Q16(self.gains.i)),
        ]);

        out.clamp(0, i32::from(ACTMAX)) as u16
    }
}

/// Supply-compensated open-loop drive
///
/// Scales the setpoint so the actuator sees the same mean voltage as at
/// [`NOMINAL_SUPPLY_MV`]. A zero supply reading passes the setpoint through.
pub fn open_loop(setpoint: u16, supply_mv: u16) -> u16 {
    if supply_mv == 0 {
        return setpoint.min(ACTMAX);
    }
    let out = u32::from(setpoint) * u32::from(NOMINAL_SUPPLY_MV) / u32::from(supply_mv);
    out.min(u32::from(ACTMAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FAN: LoopGains = LoopGains {
        p: 2000,
        i: 800,
        d: 400,
        floor: 140,
        closed_loop: true,
    };

    #[test]
    fn test_pressure_step_response() {
        let mut pid = PidLoop::new(LoopGains::PRESSURE);
        // error 200: (200·15000 + 200·1000 + 200·15000) >> 16
        assert_eq!(pid.update(200, 0, 12500), 94);
        assert_eq!(pid.integral(), 200);
        // Same error again: no derivative, integral doubles
        assert_eq!(pid.update(200, 0, 12500), 137);
    }

    #[test]
    fn test_output_clamped() {
        let mut pid = PidLoop::new(LoopGains::PRESSURE);
        for _ in 0..20 {
            pid.update(400, 0, 12500);
        }
        assert_eq!(pid.output(), ACTMAX);

        // Measured far above setpoint drives the output to zero, not negative
        let mut pid = PidLoop::new(LoopGains::PRESSURE);
        assert_eq!(pid.update(100, 400, 12500), 0);
    }

    #[test]
    fn test_floor_resets_state() {
        let mut pid = PidLoop::new(FAN);
        pid.update(2300, 0, 12500);
        assert_ne!(pid.integral(), 0);

        assert_eq!(pid.update(140, 0, 12500), 0);
        assert_eq!(pid.integral(), 0);
        assert_eq!(pid.output(), 0);
    }

    #[test]
    fn test_disabled_loop_is_off() {
        let mut pid = PidLoop::new(LoopGains::PRESSURE);
        pid.update(200, 0, 12500);
        pid.set_disabled(true);
        assert!(pid.is_disabled());
        assert_eq!(pid.integral(), 0);
        assert_eq!(pid.update(200, 0, 12500), 0);

        pid.set_disabled(false);
        assert!(pid.update(200, 0, 12500) > 0);
    }

    #[test]
    fn test_open_loop_compensates_supply() {
        assert_eq!(open_loop(200, 12500), 200);
        assert_eq!(open_loop(200, 25000), 100);
        assert_eq!(open_loop(300, 6250), ACTMAX);
        assert_eq!(open_loop(50, 0), 50);

        let gains = LoopGains {
            closed_loop: false,
            ..LoopGains::PRESSURE
        };
        let mut pid = PidLoop::new(gains);
        assert_eq!(pid.update(100, 999, 10000), 125);
    }

    #[test]
    fn test_set_gains_resets() {
        let mut pid = PidLoop::new(LoopGains::PRESSURE);
        pid.update(200, 0, 12500);
        pid.set_gains(FAN);
        assert_eq!(pid.integral(), 0);
        assert_eq!(pid.gains().p, 2000);
    }

    proptest! {
        #[test]
        fn integral_saturates_instead_of_wrapping(
            errors in proptest::collection::vec(any::<u16>(), 1..400)
        ) {
            let mut pid = PidLoop::new(LoopGains::PRESSURE);
            let mut expected: i32 = 0;
            for setpoint in errors {
                let setpoint = setpoint.max(2);
                pid.update(setpoint, 0, 12500);
                let error = i32::from(setpoint).min(i32::from(i16::MAX));
                expected = (expected + error).min(i32::from(i16::MAX));
                prop_assert_eq!(i32::from(pid.integral()), expected);
                prop_assert!(pid.output() <= ACTMAX);
            }
        }
    }
}
