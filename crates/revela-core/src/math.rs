//! Shared numeric helpers: percentiles and channel-wise reductions over
//! interleaved RGB buffers.

/// Percentile of `values` with linear interpolation between closest ranks.
///
/// Reorders `values` in place (selection, not a full sort). Returns `None`
/// for an empty slice. `pct` is clamped to `[0, 100]`.
pub fn percentile_in_place(values: &mut [f32], pct: f64) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let rank = pct.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;

    let (_, lo_val, upper) = values.select_nth_unstable_by(lo, f32::total_cmp);
    let lo_val = f64::from(*lo_val);
    if frac <= 0.0 || upper.is_empty() {
        return Some(lo_val);
    }
    let hi_val = upper.iter().copied().fold(f32::INFINITY, f32::min);
    Some(lo_val + (f64::from(hi_val) - lo_val) * frac)
}

/// Percentile over a copy of `values`, leaving the input untouched.
pub fn percentile(values: &[f32], pct: f64) -> Option<f64> {
    let mut scratch = values.to_vec();
    percentile_in_place(&mut scratch, pct)
}

/// Copy one channel out of an interleaved RGB buffer.
pub fn channel(data: &[f32], c: usize) -> Vec<f32> {
    data.iter().skip(c).step_by(3).copied().collect()
}

/// Per-channel percentile of an interleaved RGB buffer.
pub fn channel_percentiles(data: &[f32], pct: f64) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let mut values = channel(data, c);
        *slot = percentile_in_place(&mut values, pct).unwrap_or(0.0);
    }
    out
}

/// Largest finite value in a buffer, or 0 if there is none.
pub fn max_value(data: &[f32]) -> f32 {
    data.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f32, f32::max)
}

/// Arithmetic mean of a 3-vector.
pub fn mean3(v: &[f64; 3]) -> f64 {
    (v[0] + v[1] + v[2]) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_endpoints() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        // rank = 0.5 * 3 = 1.5 -> halfway between 2 and 3
        let v = [1.0, 2.0, 3.0, 4.0];
        let p = percentile(&v, 50.0).unwrap();
        assert!((p - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_channel_percentiles_interleaved() {
        let data = [0.1, 1.0, 5.0, 0.3, 2.0, 6.0, 0.2, 3.0, 7.0];
        let p = channel_percentiles(&data, 100.0);
        assert!((p[0] - 0.3).abs() < 1e-6);
        assert!((p[1] - 3.0).abs() < 1e-6);
        assert!((p[2] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_max_value_ignores_non_finite() {
        assert_eq!(max_value(&[1.0, f32::NAN, 3.0, f32::INFINITY]), 3.0);
        assert_eq!(max_value(&[]), 0.0);
    }
}
