//! Toggle planning: strict punch-in/punch-out alternation with a
//! minimum-interval rate limit.
//!
//! Pure functions of the last recorded event and the current time; the
//! caller owns the attendance log and performs the actual append.

use chrono::{DateTime, Duration, Local, NaiveDateTime};

use crate::types::Action;

/// Storage format for attendance timestamps (local time).
pub const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// The most recent attendance event for an employee, as read back from
/// the store.
#[derive(Debug, Clone)]
pub struct LastEvent {
    pub action: Action,
    pub timestamp: String,
}

/// Outcome of a toggle attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Record this action now.
    Proceed(Action),
    /// The last event is too recent; retry after `wait_secs`.
    TooSoon { wait_secs: u64 },
}

/// The action that strict alternation dictates next: punch-in when there
/// is no history or the last action was punch-out, otherwise punch-out.
pub fn next_action(last: Option<&LastEvent>) -> Action {
    match last {
        Some(e) if e.action == Action::PunchIn => Action::PunchOut,
        _ => Action::PunchIn,
    }
}

/// Decide whether a toggle may proceed at `now`.
///
/// A last event younger than `min_interval` is rejected with the seconds
/// remaining. A stored timestamp that fails to parse is treated as no
/// rate-limit history (fail soft) — the alternation still follows the
/// recorded action.
pub fn plan_toggle(
    last: Option<&LastEvent>,
    now: DateTime<Local>,
    min_interval: Duration,
) -> ToggleOutcome {
    let action = next_action(last);

    if let Some(event) = last {
        if let Ok(last_dt) = NaiveDateTime::parse_from_str(&event.timestamp, TIMESTAMP_FMT) {
            let elapsed = now.naive_local() - last_dt;
            if elapsed < min_interval {
                let wait = (min_interval - elapsed)
                    .num_seconds()
                    .clamp(0, min_interval.num_seconds());
                return ToggleOutcome::TooSoon {
                    wait_secs: wait as u64,
                };
            }
        } else {
            tracing::warn!(
                timestamp = %event.timestamp,
                "unparseable attendance timestamp; skipping rate limit"
            );
        }
    }

    ToggleOutcome::Proceed(action)
}

/// Current local time in storage format.
pub fn now_string() -> String {
    Local::now().format(TIMESTAMP_FMT).to_string()
}
