//! Significant-digit rounding for emitted floats

/// Significant digits kept in every emitted float
pub const OUTPUT_SIGNIFICANT_DIGITS: i32 = 3;

/// Round to `digits` significant digits
///
/// Zero and non-finite values are returned unchanged. Negative exponents
/// divide instead of multiplying by a fractional power of ten so large
/// values round without picking up representation noise.
pub fn round_sig(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() || digits <= 0 {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let exponent = digits - 1 - magnitude;
    if exponent >= 0 {
        let factor = 10f64.powi(exponent);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-exponent);
        (value / factor).round() * factor
    }
}

/// [`round_sig`] with the output precision
pub fn round3(value: f64) -> f64 {
    round_sig(value, OUTPUT_SIGNIFICANT_DIGITS)
}
