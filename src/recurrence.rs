//! RFC-5545 recurrence rule parsing and windowed expansion.
//!
//! Rules are accepted in three forms: a bare property value
//! (`FREQ=DAILY;COUNT=3`), the same with an `RRULE:` prefix, or a full
//! fragment carrying its own `DTSTART` line. Rules without a `DTSTART` are
//! anchored at the instant supplied by the caller (the schedule's
//! `created_at`), so expansion stays deterministic across ticks.

use crate::errors::{ChimeError, Result};
use chrono::{DateTime, Duration, Timelike, Utc};
use rrule::{RRule, RRuleSet, Tz, Unvalidated};

/// Upper bound on occurrences produced by a single windowed expansion.
const EXPANSION_LIMIT: u16 = u16::MAX;

/// Parse a recurrence rule, anchoring `DTSTART`-less rules at `anchor`.
pub fn parse(rule: &str, anchor: DateTime<Utc>) -> Result<RRuleSet> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(ChimeError::InvalidRule("rule is empty".to_string()));
    }

    if trimmed.to_ascii_uppercase().contains("DTSTART") {
        return trimmed
            .parse::<RRuleSet>()
            .map_err(|err| ChimeError::InvalidRule(err.to_string()));
    }

    let body = trimmed.strip_prefix("RRULE:").unwrap_or(trimmed);
    let unvalidated = body
        .parse::<RRule<Unvalidated>>()
        .map_err(|err| ChimeError::InvalidRule(err.to_string()))?;
    unvalidated
        .build(truncate_seconds(anchor).with_timezone(&Tz::UTC))
        .map_err(|err| ChimeError::InvalidRule(err.to_string()))
}

/// Check that a rule parses without expanding it.
pub fn validate(rule: &str) -> Result<()> {
    parse(rule, Utc::now()).map(|_| ())
}

/// All occurrences strictly between `start` and `end`, truncated to whole
/// seconds and in ascending order. Both boundaries are exclusive.
pub fn between(set: RRuleSet, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    if end <= start {
        return Vec::new();
    }

    // Smallest whole second strictly after `start`, largest strictly before
    // `end`; `all` treats both limits as inclusive.
    let after = truncate_seconds(start) + Duration::seconds(1);
    let before = truncate_seconds(end - Duration::nanoseconds(1));
    if before < after {
        return Vec::new();
    }

    let result = set
        .after(after.with_timezone(&Tz::UTC))
        .before(before.with_timezone(&Tz::UTC))
        .all(EXPANSION_LIMIT);
    if result.limited {
        tracing::warn!(
            limit = EXPANSION_LIMIT,
            "recurrence expansion hit the occurrence limit; window truncated"
        );
    }

    result
        .dates
        .into_iter()
        .map(|occurrence| truncate_seconds(occurrence.with_timezone(&Utc)))
        .collect()
}

fn truncate_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_nanosecond(0).unwrap_or(instant)
}
