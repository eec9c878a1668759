//! Pure input validators, run before any mutation reaches the store.
//!
//! Public so that boundary layers (HTTP routes, CLIs) can apply the same
//! checks before invoking the engine.

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Result, TidemarkError};

/// Require a non-empty, non-whitespace string value.
///
/// Returns the accepted value so callers can validate and bind in one step.
pub fn required_str<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(TidemarkError::MissingField(field.to_string())),
    }
}

/// Reject a business-time range whose start is after its end.
///
/// Absent bounds pass: the check only applies when both ends are known.
pub fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>, axis: &str) -> Result<()> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(TidemarkError::RangeInvalid(axis.to_string()));
        }
    }
    Ok(())
}

/// Reject a processing-time range whose start is after its end.
pub fn datetime_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    axis: &str,
) -> Result<()> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(TidemarkError::RangeInvalid(axis.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INFINITY_DATE;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn required_str_accepts_real_values() {
        assert_eq!(required_str(Some("alice"), "name").unwrap(), "alice");
    }

    #[test]
    fn required_str_rejects_absent_and_blank() {
        for value in [None, Some(""), Some("   "), Some("\t\n")] {
            let err = required_str(value, "name").unwrap_err();
            assert!(matches!(err, TidemarkError::MissingField(f) if f == "name"));
        }
    }

    #[test]
    fn date_range_rejects_reversed_bounds() {
        let err = date_range(Some(d("2024-06-01")), Some(d("2024-01-01")), "business");
        assert!(matches!(err, Err(TidemarkError::RangeInvalid(a)) if a == "business"));
    }

    #[test]
    fn date_range_accepts_ordered_equal_and_absent_bounds() {
        date_range(Some(d("2024-01-01")), Some(d("2024-06-01")), "business").unwrap();
        date_range(Some(d("2024-01-01")), Some(d("2024-01-01")), "business").unwrap();
        date_range(Some(d("2024-01-01")), Some(INFINITY_DATE), "business").unwrap();
        date_range(None, Some(d("2024-01-01")), "business").unwrap();
        date_range(Some(d("2024-01-01")), None, "business").unwrap();
        date_range(None, None, "business").unwrap();
    }

    #[test]
    fn datetime_range_rejects_reversed_bounds() {
        let t0: DateTime<Utc> = "2024-01-01T12:00:00Z".parse().unwrap();
        let t1: DateTime<Utc> = "2024-01-01T12:00:01Z".parse().unwrap();
        datetime_range(Some(t0), Some(t1), "processing").unwrap();
        datetime_range(Some(t0), Some(t0), "processing").unwrap();
        let err = datetime_range(Some(t1), Some(t0), "processing");
        assert!(matches!(err, Err(TidemarkError::RangeInvalid(a)) if a == "processing"));
    }
}
