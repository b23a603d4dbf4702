use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Fixed UTC trading session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Asian,
    London,
    NewYork,
    #[serde(rename = "none")]
    None,
}

impl Session {
    /// Trading sessions with their `[start, end)` UTC hours
    pub const WINDOWS: [(Session, u32, u32); 3] = [
        (Session::Asian, 1, 7),
        (Session::London, 8, 12),
        (Session::NewYork, 13, 19),
    ];
}

/// Session-specific box-height limits, falling back to a generic limit.
pub trait SessionLimits {
    fn session_range_pct(&self, session: Session) -> Option<f64>;
    fn max_range_pct(&self) -> Option<f64>;
}

/// Session for a UTC instant. Weekend halts are reported separately by [`is_weekend_halt`].
pub fn resolve_session(now: DateTime<Utc>) -> Session {
    session_for_hour(now.hour())
}

/// Session for a unix-seconds candle timestamp
pub fn session_at(ts: i64) -> Session {
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(dt) => resolve_session(dt),
        None => Session::None,
    }
}

fn session_for_hour(hour: u32) -> Session {
    Session::WINDOWS
        .iter()
        .find(|(_, start, end)| (*start..*end).contains(&hour))
        .map(|(session, _, _)| *session)
        .unwrap_or(Session::None)
}

/// Friday 23:00 UTC through Monday 01:00 UTC, both ends inclusive.
pub fn is_weekend_halt(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Fri => now.hour() >= 23,
        Weekday::Sat | Weekday::Sun => true,
        Weekday::Mon => {
            now.hour() == 0 || (now.hour() == 1 && now.minute() == 0 && now.second() == 0)
        }
        _ => false,
    }
}

/// Box-height limit for `session`, or the generic `max_range_pct` when no override is set.
pub fn effective_limit<P: SessionLimits>(session: Session, params: &P) -> Option<f64> {
    params
        .session_range_pct(session)
        .or_else(|| params.max_range_pct())
}
