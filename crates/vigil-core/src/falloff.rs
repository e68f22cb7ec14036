//! Scalar helpers for the sight falloff curve.

/// Gain and visibility values at or below this are treated as zero.
pub const GAIN_EPSILON: f32 = 1e-4;

/// Alert changes smaller than this do not trigger a publication.
pub const CHANGE_TOLERANCE: f32 = 1e-6;

/// Linear interpolation between `a` and `b`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (b - a).mul_add(t, a)
}

/// Clamp `value` to `[0, 1]`.
pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Map `value` from `[in_start, in_end]` to `[0, 1]`, clamped.
///
/// A degenerate input range maps everything at or beyond `in_end` to 1.
pub fn map_range_clamped(value: f32, in_start: f32, in_end: f32) -> f32 {
    let span = in_end - in_start;
    if span.abs() <= f32::EPSILON {
        return if value >= in_end { 1.0 } else { 0.0 };
    }
    clamp01((value - in_start) / span)
}

/// Whether two values are within [`CHANGE_TOLERANCE`] of each other.
pub fn nearly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= CHANGE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_endpoints() {
        assert!((lerp(5.0, 20.0, 0.0) - 5.0).abs() < 1e-6);
        assert!((lerp(5.0, 20.0, 1.0) - 20.0).abs() < 1e-6);
        assert!((lerp(500.0, 2000.0, 0.5) - 1250.0).abs() < 1e-3);
    }

    #[test]
    fn map_range_clamps() {
        assert!(map_range_clamped(100.0, 500.0, 2000.0).abs() < 1e-6);
        assert!((map_range_clamped(1250.0, 500.0, 2000.0) - 0.5).abs() < 1e-6);
        assert!((map_range_clamped(9000.0, 500.0, 2000.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_width_range() {
        assert!(map_range_clamped(499.0, 500.0, 500.0).abs() < 1e-6);
        assert!((map_range_clamped(500.0, 500.0, 500.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tolerance() {
        assert!(nearly_equal(1.0, 1.0 + 1e-7));
        assert!(!nearly_equal(1.0, 1.001));
    }
}
