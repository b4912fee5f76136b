//! Numeric helpers shared by the plugins

/// Decimal places used when comparing accumulated floating point values
pub const COMPARISON_DECIMALS: i32 = 5;

/// Round a value to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Round a value to [`COMPARISON_DECIMALS`] places so sums built in different
/// orders compare equal
pub fn fix_float(value: f64) -> f64 {
    round_to(value, COMPARISON_DECIMALS)
}

/// Convert a percentage in [0, 100] into a fraction in [0, 1]
pub fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

/// Convert a fraction into a percentage
pub fn fraction_to_percent(fraction: f64) -> f64 {
    fraction * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_float_removes_accumulated_error() {
        let sum = 0.1 + 0.2;
        assert_ne!(sum, 0.3);
        assert_eq!(fix_float(sum), fix_float(0.3));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456789, 2), 1.23);
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn test_percent_conversions() {
        assert_eq!(percent_to_fraction(75.0), 0.75);
        assert_eq!(fraction_to_percent(0.5), 50.0);
    }
}
