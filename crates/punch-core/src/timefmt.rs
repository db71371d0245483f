//! Display helpers for stored attendance timestamps. All of these fail
//! soft: a string that does not parse comes back as-is or as "N/A"
//! rather than propagating an error into the presentation path.

use chrono::{DateTime, Local, NaiveDateTime};

use crate::toggle::TIMESTAMP_FMT;

/// Format a stored timestamp as a 12-hour clock time ("09:41 AM").
/// Returns the input unchanged if it does not parse.
pub fn format_clock(timestamp: &str) -> String {
    match NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FMT) {
        Ok(dt) => dt.format("%I:%M %p").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// Human-readable elapsed time since a stored timestamp ("5 minutes
/// ago"). Returns "N/A" if the string does not parse.
pub fn time_ago(timestamp: &str, now: DateTime<Local>) -> String {
    let Ok(dt) = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FMT) else {
        return "N/A".to_string();
    };

    let seconds = (now.naive_local() - dt).num_seconds().max(0);
    if seconds < 60 {
        format!("{seconds} seconds ago")
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else {
        format!("{} hours ago", seconds / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ts: &str) -> DateTime<Local> {
        let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FMT).unwrap();
        Local.from_local_datetime(&naive).unwrap()
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock("2026-03-02 14:05:00"), "02:05 PM");
        assert_eq!(format_clock("2026-03-02 09:41:30"), "09:41 AM");
    }

    #[test]
    fn clock_format_passes_through_garbage() {
        assert_eq!(format_clock("yesterday-ish"), "yesterday-ish");
    }

    #[test]
    fn time_ago_units() {
        let now = at("2026-03-02 10:00:00");
        assert_eq!(time_ago("2026-03-02 09:59:45", now), "15 seconds ago");
        assert_eq!(time_ago("2026-03-02 09:55:00", now), "5 minutes ago");
        assert_eq!(time_ago("2026-03-02 07:00:00", now), "3 hours ago");
    }

    #[test]
    fn time_ago_is_na_for_garbage() {
        let now = at("2026-03-02 10:00:00");
        assert_eq!(time_ago("???", now), "N/A");
    }
}
