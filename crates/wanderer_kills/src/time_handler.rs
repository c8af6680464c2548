//! Kill timestamp parsing and the age cutoff.
//!
//! Feeds send ISO-8601 times with or without an offset. Times without one are
//! taken as UTC. Anything older than the cutoff is classified
//! [`KillAge::Older`] and dropped before adaptation or enrichment.

use crate::error::TimeError;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::Value;

/// Default age beyond which kills are discarded.
pub const DEFAULT_KILL_CUTOFF: Duration = Duration::hours(1);

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillAge {
    Recent(DateTime<Utc>),
    Older(DateTime<Utc>),
}

/// Parses a kill time, normalizing to UTC.
pub fn parse_kill_time(raw: &str) -> Result<DateTime<Utc>, TimeError> {
    let raw = raw.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TimeError::Invalid(raw.to_string()))
}

/// Reads `kill_time` (or the feed's `killmail_time`) from a raw payload.
pub fn extract_kill_time(payload: &Value) -> Result<DateTime<Utc>, TimeError> {
    let raw = payload
        .get("kill_time")
        .or_else(|| payload.get("killmail_time"))
        .ok_or(TimeError::Missing)?;
    match raw {
        Value::String(s) => parse_kill_time(s),
        Value::Null => Err(TimeError::Missing),
        other => Err(TimeError::Invalid(other.to_string())),
    }
}

/// Classifies kill times against a fixed cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeHandler {
    cutoff: Duration,
}

impl Default for TimeHandler {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_CUTOFF)
    }
}

impl TimeHandler {
    pub fn new(cutoff: Duration) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> Duration {
        self.cutoff
    }

    pub fn classify(&self, kill_time: DateTime<Utc>, now: DateTime<Utc>) -> KillAge {
        if now - kill_time > self.cutoff {
            KillAge::Older(kill_time)
        } else {
            KillAge::Recent(kill_time)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parses_offsets_and_naive_times() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_kill_time("2026-03-01T12:00:00Z").unwrap(), expected);
        assert_eq!(parse_kill_time("2026-03-01T14:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_kill_time("2026-03-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_kill_time("2026-03-01 12:00:00.000").unwrap(), expected);
        assert!(matches!(parse_kill_time("yesterday"), Err(TimeError::Invalid(_))));
    }

    #[test]
    fn extracts_either_field_name() {
        assert!(extract_kill_time(&json!({"killmail_time": "2026-03-01T12:00:00Z"})).is_ok());
        assert_eq!(extract_kill_time(&json!({"killmail_id": 1})), Err(TimeError::Missing));
        assert!(matches!(
            extract_kill_time(&json!({"kill_time": 17})),
            Err(TimeError::Invalid(_))
        ));
    }

    #[test]
    fn cutoff_classification() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let handler = TimeHandler::default();

        let two_hours_ago = now - Duration::hours(2);
        assert_eq!(handler.classify(two_hours_ago, now), KillAge::Older(two_hours_ago));
        let recent = now - Duration::minutes(59);
        assert_eq!(handler.classify(recent, now), KillAge::Recent(recent));
    }
}
