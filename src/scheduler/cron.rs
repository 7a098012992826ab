//! Cron expression handling
//!
//! Standard 5-field syntax: `minute hour day month weekday`. Parsing and
//! occurrence search are delegated to `croner`; the field count is checked
//! up front so 6- and 7-field patterns are rejected.

use chrono::{DateTime, Utc};
use croner::Cron;

/// Why a cron expression was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("{0}")]
    Parse(String),

    #[error("no upcoming occurrence")]
    NoOccurrence,
}

/// A validated 5-field cron expression
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    /// Validate and parse an expression
    ///
    /// # Errors
    ///
    /// `CronError::FieldCount` unless there are exactly five fields,
    /// `CronError::Parse` for anything `croner` rejects.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(CronError::FieldCount(fields));
        }

        let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        let cron = Cron::new(&normalized)
            .parse()
            .map_err(|e| CronError::Parse(e.to_string()))?;

        Ok(Self {
            expression: normalized,
            cron,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`
    ///
    /// # Errors
    ///
    /// `CronError::NoOccurrence` if the pattern never fires again.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
        self.cron
            .find_next_occurrence(after, false)
            .map_err(|_| CronError::NoOccurrence)
    }
}

/// Shorthand for validating without keeping the parsed form
///
/// # Errors
///
/// See [`CronSchedule::parse`].
pub fn validate(expression: &str) -> Result<(), CronError> {
    CronSchedule::parse(expression).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn every_five_minutes() {
        let cron = CronSchedule::parse("*/5 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 2, 30).unwrap();
        let next = cron.next_after(&start).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 5, 0));
        assert_eq!(
            cron.next_after(&next).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 10, 0).unwrap()
        );
    }

    #[test]
    fn every_six_hours_skips_the_current_slot() {
        let cron = CronSchedule::parse("0 */6 * * *").unwrap();
        let on_slot = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(&on_slot).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_wrong_field_counts_and_garbage() {
        assert_eq!(
            CronSchedule::parse("* * * *").unwrap_err(),
            CronError::FieldCount(4)
        );
        assert_eq!(
            CronSchedule::parse("0 * * * * *").unwrap_err(),
            CronError::FieldCount(6)
        );
        assert!(matches!(
            CronSchedule::parse("61 * * * *"),
            Err(CronError::Parse(_))
        ));
        assert!(validate("not a cron at all").is_err());
    }

    #[test]
    fn whitespace_is_normalized() {
        let cron = CronSchedule::parse("  0   9 * *  1-5 ").unwrap();
        assert_eq!(cron.expression(), "0 9 * * 1-5");
    }
}
