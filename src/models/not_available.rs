// Not-available sentinel arithmetic.
// Agents report -1 when a metric cannot be captured (e.g. thread CPU time unsupported).
// NA is never a computed value: any operand NA makes the result NA.

/// Reserved "no data" value, distinct from zero.
pub const NA: i64 = -1;

/// Floating-point form of [`NA`].
pub const NA_F64: f64 = -1.0;

pub fn is_na(value: i64) -> bool {
    value == NA
}

pub fn is_na_f64(value: f64) -> bool {
    value == NA_F64
}

/// Adds two integer metrics, propagating NA. Saturates instead of wrapping.
pub fn add(x: i64, y: i64) -> i64 {
    if is_na(x) || is_na(y) {
        return NA;
    }
    x.saturating_add(y)
}

pub fn add_f64(x: f64, y: f64) -> f64 {
    if is_na_f64(x) || is_na_f64(y) {
        return NA_F64;
    }
    x + y
}

/// NA becomes `None` (e.g. for JSON output).
pub fn or_none(value: i64) -> Option<i64> {
    if is_na(value) { None } else { Some(value) }
}

pub fn or_none_f64(value: f64) -> Option<f64> {
    if is_na_f64(value) { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_propagates_na_from_either_side() {
        assert_eq!(add(NA, 5), NA);
        assert_eq!(add(5, NA), NA);
        assert_eq!(add(NA, NA), NA);
        assert_eq!(add(2, 3), 5);
    }

    #[test]
    fn add_f64_propagates_na() {
        assert_eq!(add_f64(NA_F64, 5.0), NA_F64);
        assert_eq!(add_f64(5.0, NA_F64), NA_F64);
        assert_eq!(add_f64(NA_F64, NA_F64), NA_F64);
        assert_eq!(add_f64(1.5, 2.5), 4.0);
    }

    #[test]
    fn add_saturates_at_max() {
        assert_eq!(add(i64::MAX, 10), i64::MAX);
    }

    #[test]
    fn zero_is_not_na() {
        assert_eq!(add(0, 0), 0);
        assert_eq!(or_none(0), Some(0));
        assert_eq!(or_none(NA), None);
        assert_eq!(or_none_f64(NA_F64), None);
    }
}
