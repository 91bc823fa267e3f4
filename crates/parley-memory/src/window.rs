//! Time-bounded candidate selection.

use crate::error::MemoryError;
use crate::retrieval::DatetimeField;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use parley_protocol::Message;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Inclusive `[start, end]` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window of `minutes` on either side of `center`, clamped to the
    /// representable date range.
    pub fn around(center: DateTime<Utc>, minutes: i64) -> Self {
        let span = minutes
            .checked_abs()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::MAX);
        Self {
            start: center
                .checked_sub_signed(span)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: center
                .checked_add_signed(span)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether `instant` falls inside the window, bounds included.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Messages whose selected timestamp falls inside the window, order preserved.
    pub fn select<'a, I>(&self, messages: I, field: DatetimeField) -> Vec<Message>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages
            .into_iter()
            .filter(|message| self.contains(field.of(message)))
            .cloned()
            .collect()
    }
}

/// Parse an RFC 3339 or naive (UTC) timestamp.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, MemoryError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MemoryError::InvalidDatetime(value.to_string()))
}
