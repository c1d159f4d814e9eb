//! Virtual sensor channels
//!
//! Values the plant does not measure directly, derived from the other
//! channels once per sensor sample.

use super::channels::{Actuator, Outputs};

/// Heating power per dosing pump unit, W
///
/// Diesel at 10 kWh/L, 35 µL per pump stroke, outputs in Hz × 20 and an
/// assumed 70 % efficiency.
pub const WATTS_PER_DOSING_UNIT: u16 = 44;

/// Filtered-derivative threshold on the glow plug Seebeck voltage
const GAIN_LEVEL: i32 = 5;
const GAIN_SLOPE: i32 = 350;
const THRESHOLD: i32 = 3200;
const THRESHOLD_FALLING: i32 = 3000;
const THRESHOLD_RISING: i32 = 3400;
const SLOPE_BAND: i32 = 10;

/// Flame detector working on the glow plug Seebeck voltage
///
/// A 3/4 IIR filter smooths the voltage; the observer adds the level and
/// its slope, and compares against a threshold that leans with the slope
/// so a rising flame is not declared early and a dying one is not held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlameObserver {
    filtered: i32,
    previous: i32,
}

impl FlameObserver {
    /// Observer with an empty filter
    pub const fn new() -> Self {
        Self {
            filtered: 0,
            previous: 0,
        }
    }

    /// Feed one voltage sample (mV); returns `true` while a flame is seen
    pub fn update(&mut self, voltage: u16) -> bool {
        self.filtered = (self.filtered * 3 + i32::from(voltage)) >> 2;
        let slope = self.filtered - self.previous;
        self.previous = self.filtered;

        let threshold = if slope < -SLOPE_BAND {
            THRESHOLD_FALLING
        } else if slope > SLOPE_BAND {
            THRESHOLD_RISING
        } else {
            THRESHOLD
        };

        self.filtered * GAIN_LEVEL + slope * GAIN_SLOPE > threshold
    }

    /// Forget the filter history
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Heating power estimate from the dosing pump rate, W
pub fn heating_power(outputs: &Outputs) -> u16 {
    outputs[Actuator::DosingPump].saturating_mul(WATTS_PER_DOSING_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_plug_is_dark() {
        let mut observer = FlameObserver::new();
        // The initial step is a steep rise; let the filter settle first
        for _ in 0..30 {
            observer.update(200);
        }
        for _ in 0..50 {
            assert!(!observer.update(200));
        }
    }

    #[test]
    fn test_steady_flame_detected() {
        let mut observer = FlameObserver::new();
        let mut seen = false;
        for _ in 0..50 {
            seen = observer.update(1500);
        }
        assert!(seen);
    }

    #[test]
    fn test_falling_voltage_drops_flame() {
        let mut observer = FlameObserver::new();
        for _ in 0..50 {
            observer.update(1500);
        }
        // Level still above 640 mV but the slope pulls the observer under
        let mut voltage: u16 = 1500;
        let mut lost = false;
        for _ in 0..20 {
            voltage = voltage.saturating_sub(150);
            if !observer.update(voltage) {
                lost = true;
                break;
            }
        }
        assert!(lost);
    }

    #[test]
    fn test_heating_power() {
        let mut outputs = Outputs::OFF;
        outputs[Actuator::DosingPump] = 86;
        assert_eq!(heating_power(&outputs), 3784);
        outputs[Actuator::DosingPump] = u16::MAX;
        assert_eq!(heating_power(&outputs), u16::MAX);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut observer = FlameObserver::new();
        observer.update(3000);
        observer.reset();
        assert_eq!(observer, FlameObserver::new());
    }
}
