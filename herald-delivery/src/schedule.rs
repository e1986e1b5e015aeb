//! Resolution of a requested send time into a delay.
//!
//! A send can be pinned to an absolute instant or pushed back by a relative
//! number of milliseconds. Anything that cannot be understood means "send
//! now"; scheduling never fails a run.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use tracing::warn;

/// Naive date-time layouts accepted for the absolute target, read as local
/// time.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Milliseconds to wait before the first send attempt.
///
/// A non-empty `absolute` wins over `relative_ms`. The absolute target is
/// either epoch milliseconds (all digits) or a date-time; the relative value
/// is a number of milliseconds, fractions truncated. Unparseable input,
/// non-positive values and targets in the past all resolve to `0`.
#[must_use]
pub fn resolve_planned_delay(
    now: DateTime<Utc>,
    absolute: Option<&str>,
    relative_ms: Option<&str>,
) -> u64 {
    if let Some(absolute) = absolute.map(str::trim).filter(|s| !s.is_empty()) {
        let Some(target) = parse_target(absolute) else {
            warn!(send_at = absolute, "Unrecognised send time, sending immediately");
            return 0;
        };

        return millis_until(now, target);
    }

    relative_ms
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or(0, parse_relative)
}

/// When a send delayed by `delay_ms` from `now` would happen.
#[must_use]
pub fn planned_send_time(now: DateTime<Utc>, delay_ms: u64) -> DateTime<Utc> {
    i64::try_from(delay_ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn parse_target(value: &str) -> Option<DateTime<Utc>> {
    if value.bytes().all(|b| b.is_ascii_digit()) {
        let millis = value.parse::<i64>().ok()?;
        return DateTime::from_timestamp_millis(millis);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn millis_until(now: DateTime<Utc>, target: DateTime<Utc>) -> u64 {
    u64::try_from((target - now).num_milliseconds()).unwrap_or(0)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "the value is finite and positive, and `as` saturates at u64::MAX"
)]
fn parse_relative(value: &str) -> u64 {
    match value.parse::<f64>() {
        Ok(ms) if ms.is_finite() && ms > 0.0 => ms.trunc() as u64,
        _ => {
            warn!(delay_ms = value, "Ignoring invalid send delay, sending immediately");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_nothing_requested() {
        assert_eq!(resolve_planned_delay(now(), None, None), 0);
        assert_eq!(resolve_planned_delay(now(), Some(""), Some("  ")), 0);
    }

    #[test]
    fn test_relative_delay() {
        assert_eq!(resolve_planned_delay(now(), None, Some("1000")), 1000);
        assert_eq!(resolve_planned_delay(now(), None, Some("1500.9")), 1500);
        assert_eq!(resolve_planned_delay(now(), None, Some("0")), 0);
        assert_eq!(resolve_planned_delay(now(), None, Some("-20")), 0);
        assert_eq!(resolve_planned_delay(now(), None, Some("soon")), 0);
        assert_eq!(resolve_planned_delay(now(), None, Some("inf")), 0);
        assert_eq!(resolve_planned_delay(now(), None, Some("NaN")), 0);
    }

    #[test]
    fn test_epoch_millis() {
        let target = now().timestamp_millis() + 2_500;
        assert_eq!(
            resolve_planned_delay(now(), Some(&target.to_string()), None),
            2_500
        );
    }

    #[test]
    fn test_past_target_is_immediate() {
        assert_eq!(resolve_planned_delay(now(), Some("5000"), None), 0);
        assert_eq!(
            resolve_planned_delay(now(), Some("2020-01-01T00:00:00Z"), None),
            0
        );
    }

    #[test]
    fn test_absolute_beats_relative() {
        assert_eq!(
            resolve_planned_delay(now(), Some("2024-06-01T12:00:01Z"), Some("60000")),
            1_000
        );
        assert_eq!(
            resolve_planned_delay(now(), Some("not a date"), Some("60000")),
            0
        );
    }

    #[test]
    fn test_zoned_formats() {
        assert_eq!(
            resolve_planned_delay(now(), Some("2024-06-01T14:00:00+02:00"), None),
            0
        );
        assert_eq!(
            resolve_planned_delay(now(), Some("2024-06-01T12:00:00.250Z"), None),
            250
        );
        assert_eq!(
            resolve_planned_delay(now(), Some("Sat, 01 Jun 2024 12:01:00 +0000"), None),
            60_000
        );
    }

    #[test]
    fn test_date_only_is_utc_midnight() {
        assert_eq!(
            resolve_planned_delay(now(), Some("2024-06-02"), None),
            12 * 60 * 60 * 1000
        );
    }

    #[test]
    fn test_naive_is_local_time() {
        let naive = NaiveDate::from_ymd_opt(2024, 6, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        let expected = u64::try_from((expected - now()).num_milliseconds()).unwrap();

        assert_eq!(
            resolve_planned_delay(now(), Some("2024-06-02T09:30:00"), None),
            expected
        );
        assert_eq!(
            resolve_planned_delay(now(), Some("2024-06-02 09:30"), None),
            expected
        );
    }

    #[test]
    fn test_planned_send_time() {
        let planned = planned_send_time(now(), 90_000);
        assert_eq!(planned.to_rfc3339(), "2024-06-01T12:01:30+00:00");
        assert_eq!(planned_send_time(now(), u64::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
