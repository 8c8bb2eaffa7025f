//! Wall-clock timestamps and due-window boundaries.
//!
//! Oplog timestamps are RFC 3339 UTC with millisecond precision and a `Z`
//! suffix. The format is fixed-width, so lexicographic order on the stored
//! strings equals chronological order - replay and last-writer-wins compare
//! them directly as text.
//!
//! Due dates are a separate, naive representation: `YYYY-MM-DDTHH:MM:SS` in
//! the user's local time. That format is also lexicographically ordered,
//! which is what the due-window filters lean on.

use chrono::{DateTime, Days, Local, NaiveDateTime, SecondsFormat, Utc};

/// Format for due dates and local window boundaries.
pub const DUE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current instant as an oplog timestamp, e.g. `2026-08-01T09:30:12.345Z`.
pub fn now_ms() -> String {
    format_utc_ms(Utc::now())
}

/// Render any UTC instant as an oplog timestamp.
pub fn format_utc_ms(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Oplog timestamp for a unix-epoch millisecond value. Test helper mostly,
/// but also used to normalize caller-supplied times.
pub fn from_unix_ms(ms: i64) -> String {
    let t = DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default();
    format_utc_ms(t)
}

/// Validate a due date string, returning it unchanged on success.
pub fn check_due(s: &str) -> Option<&str> {
    NaiveDateTime::parse_from_str(s, DUE_FORMAT).ok().map(|_| s)
}

/// Current local time in due-date format.
pub fn local_now() -> String {
    Local::now().format(DUE_FORMAT).to_string()
}

/// Midnight today, local time, in due-date format.
pub fn local_day_start(days_from_today: u64) -> String {
    let day = Local::now()
        .date_naive()
        .checked_add_days(Days::new(days_from_today))
        .unwrap_or_else(|| Local::now().date_naive());
    format!("{}T00:00:00", day.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_format_is_millis_z() {
        let s = from_unix_ms(1_700_000_000_123);
        assert_eq!(s, "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn utc_format_orders_lexicographically() {
        let early = from_unix_ms(1_000);
        let late = from_unix_ms(2_000);
        assert!(early < late);

        // Across second/minute boundaries too.
        let a = from_unix_ms(59_999);
        let b = from_unix_ms(60_000);
        assert!(a < b);
    }

    #[test]
    fn due_validation() {
        assert!(check_due("2026-08-01T09:00:00").is_some());
        assert!(check_due("2026-08-01").is_none());
        assert!(check_due("tomorrow").is_none());
    }

    #[test]
    fn day_start_boundaries_are_ordered() {
        let today = local_day_start(0);
        let next_week = local_day_start(7);
        assert!(today < next_week);
        assert!(today <= local_now());
    }
}
