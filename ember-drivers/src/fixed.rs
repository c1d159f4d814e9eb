//! Fixed-point helpers for the regulation loops and ADC scaling
//!
//! The controller runs on cores without an FPU. Gains are Q16 multipliers
//! ([`Q16`]) and sensor scale factors are 16-bit fractions applied with
//! [`mul_high`].

/// Q16 multiplier: a signed factor scaled by 2^16
///
/// `Q16(15000)` multiplies by 15000/65536 ≈ 0.229.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Q16(pub i32);

impl Q16 {
    /// Fractional bits
    pub const FRAC_BITS: u32 = 16;
}

/// High half of an unsigned 16×16 product: `(a·b) >> 16`
#[inline]
pub const fn mul_high(a: u16, b: u16) -> u16 {
    ((a as u32 * b as u32) >> 16) as u16
}

/// Multiply-accumulate of three signed terms, shifted right by 16
///
/// The sum is formed in 64 bits (saturating) and clamped into `i32`.
#[inline]
pub fn mac3(terms: [(i32, Q16); 3]) -> i32 {
    let sum = terms
        .iter()
        .fold(0i64, |acc, &(x, k)| acc.saturating_add(x as i64 * k.0 as i64));
    (sum >> Q16::FRAC_BITS).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_high() {
        assert_eq!(mul_high(0xffff, 0xffff), 0xfffe);
        assert_eq!(mul_high(4095, 3300 << 4), 3299);
        assert_eq!(mul_high(0, 1234), 0);
    }

    #[test]
    fn test_mac3() {
        let out = mac3([(100, Q16(15000)), (10, Q16(1000)), (200, Q16(15000))]);
        // (1_500_000 + 10_000 + 3_000_000) >> 16
        assert_eq!(out, 68);
        assert_eq!(mac3([(i32::MAX, Q16(i32::MAX)); 3]), i32::MAX);
    }

    #[test]
    fn test_mac3_floors_negative_sums() {
        // Arithmetic shift rounds toward negative infinity
        assert_eq!(mac3([(-100, Q16(15000)), (0, Q16(0)), (0, Q16(0))]), -23);
        assert_eq!(mac3([(i32::MIN, Q16(i32::MAX)); 3]), i32::MIN);
    }
}
