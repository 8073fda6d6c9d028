//! Trailing time windows
//!
//! A window is the right-open interval `[now - duration, now)`. Durations
//! are written as `<n><unit>` (`30d`, `24h`, `15m`, `90s`, `1w`) or in the
//! long form Postgres intervals use (`24 hours`, `7 days`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExporterError, Result};

/// A named trailing window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window name, used as the `window` label
    pub name: String,
    /// Window length
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl TimeWindow {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }

    /// Parse a window from its textual duration
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let duration = parse_duration(text)
            .map_err(|e| ExporterError::Config(format!("{} window: {}", name, e)))?;
        Ok(Self { name, duration })
    }

    /// Length in seconds, as bound into window predicates
    pub fn as_secs_f64(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Parse `30d`, `24h`, `24 hours`, `90s`...
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in {:?}", text))?;
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid amount in {:?}", text))?;

    let unit_secs = match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        other => return Err(format!("unknown unit {:?}", other)),
    };

    if amount == 0 {
        return Err(format!("window must be positive, got {:?}", text));
    }

    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration overflow in {:?}", text))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
