use chrono::{Duration, NaiveDate};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Invalid date format '{value}' for {flag}. Use YYYY-MM-DD.")]
    InvalidDate { flag: &'static str, value: String },

    #[error("--date cannot be combined with --from/--to.")]
    DateWithRange,

    #[error("--from and --to must be used together.")]
    IncompleteRange,

    #[error("--from date ({from}) must be <= --to date ({to}).")]
    Reversed { from: NaiveDate, to: NaiveDate },
}

/// Inclusive `[from, to]` date range under evaluation.
///
/// A single date is the degenerate window where `from == to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, WindowError> {
        if from > to {
            return Err(WindowError::Reversed { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    /// Build a window from the raw `--date` / `--from` / `--to` flags.
    /// With none of them set the window is `today`.
    pub fn from_args(
        date: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, WindowError> {
        if date.is_some() && (from.is_some() || to.is_some()) {
            return Err(WindowError::DateWithRange);
        }
        match (date, from, to) {
            (_, Some(from), Some(to)) => {
                Self::new(parse_flag(from, "--from")?, parse_flag(to, "--to")?)
            }
            (_, Some(_), None) | (_, None, Some(_)) => Err(WindowError::IncompleteRange),
            (Some(date), None, None) => Ok(Self::single(parse_flag(date, "--date")?)),
            (None, None, None) => Ok(Self::single(today)),
        }
    }

    pub fn is_range(&self) -> bool {
        self.from != self.to
    }

    /// Window widened by one day on each side, used for history scans so
    /// timezone skew never drops a boundary commit. Results must be re-filtered
    /// with [`DateWindow::contains_timestamp`].
    pub fn with_slack(&self) -> (NaiveDate, NaiveDate) {
        (self.from - Duration::days(1), self.to + Duration::days(1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// True when the ISO-8601 timestamp's date part lies inside the window.
    /// Unparseable or empty timestamps are never inside.
    pub fn contains_timestamp(&self, timestamp: &str) -> bool {
        timestamp_date(timestamp).is_some_and(|d| self.contains(d))
    }

    /// Search qualifier value: `F..T`, or just `D` for a single date.
    pub fn search_range(&self) -> String {
        if self.is_range() {
            format!("{}..{}", self.from, self.to)
        } else {
            self.from.to_string()
        }
    }

    /// Whole days from `date` to the window end, floored at zero.
    pub fn days_until_end(&self, date: NaiveDate) -> i64 {
        (self.to - date).num_days().max(0)
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_range() {
            write!(f, "{} .. {}", self.from, self.to)
        } else {
            write!(f, "{}", self.from)
        }
    }
}

/// Truncate an ISO-8601 timestamp (`2026-02-09T23:10:00+01:00`) to its date.
pub fn timestamp_date(timestamp: &str) -> Option<NaiveDate> {
    let prefix = timestamp.get(..10)?;
    NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

fn parse_flag(value: &str, flag: &'static str) -> Result<NaiveDate, WindowError> {
    parse_date(value).ok_or_else(|| WindowError::InvalidDate {
        flag,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_default_window_is_today() {
        let w = DateWindow::from_args(None, None, None, d("2026-02-09")).unwrap();
        assert_eq!(w, DateWindow::single(d("2026-02-09")));
        assert!(!w.is_range());
    }

    #[test]
    fn test_single_date_equals_degenerate_range() {
        let today = d("2026-03-01");
        let single = DateWindow::from_args(Some("2026-02-09"), None, None, today).unwrap();
        let range =
            DateWindow::from_args(None, Some("2026-02-09"), Some("2026-02-09"), today).unwrap();
        assert_eq!(single, range);
        assert_eq!(single.search_range(), range.search_range());
        assert_eq!(single.to_string(), range.to_string());
    }

    #[test]
    fn test_flag_validation() {
        let today = d("2026-03-01");
        assert!(matches!(
            DateWindow::from_args(Some("2026-02-01"), Some("2026-02-01"), Some("2026-02-07"), today),
            Err(WindowError::DateWithRange)
        ));
        assert!(matches!(
            DateWindow::from_args(None, Some("2026-02-06"), None, today),
            Err(WindowError::IncompleteRange)
        ));
        assert!(matches!(
            DateWindow::from_args(None, None, Some("2026-02-09"), today),
            Err(WindowError::IncompleteRange)
        ));
        assert!(matches!(
            DateWindow::from_args(None, Some("bad-date"), Some("2026-02-07"), today),
            Err(WindowError::InvalidDate { flag: "--from", .. })
        ));
        assert!(matches!(
            DateWindow::from_args(None, Some("2026-02-07"), Some("2026-02-01"), today),
            Err(WindowError::Reversed { .. })
        ));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let w = DateWindow::new(d("2026-02-08"), d("2026-02-10")).unwrap();
        assert!(w.contains_timestamp("2026-02-08T00:00:01Z"));
        assert!(w.contains_timestamp("2026-02-10T23:59:59+02:00"));
        assert!(!w.contains_timestamp("2026-02-07T23:59:59Z"));
        assert!(!w.contains_timestamp("2026-02-11T00:00:00Z"));
        assert!(!w.contains_timestamp(""));
        assert!(!w.contains_timestamp("garbage"));
    }

    #[test]
    fn test_slack_widens_by_one_day() {
        let w = DateWindow::single(d("2026-02-09"));
        assert_eq!(w.with_slack(), (d("2026-02-08"), d("2026-02-10")));
    }

    #[test]
    fn test_search_range_and_display() {
        let w = DateWindow::new(d("2026-02-03"), d("2026-02-09")).unwrap();
        assert_eq!(w.search_range(), "2026-02-03..2026-02-09");
        assert_eq!(w.to_string(), "2026-02-03 .. 2026-02-09");
        assert_eq!(DateWindow::single(d("2026-02-09")).search_range(), "2026-02-09");
    }

    #[test]
    fn test_days_until_end_floors_at_zero() {
        let w = DateWindow::single(d("2026-02-09"));
        assert_eq!(w.days_until_end(d("2026-02-01")), 8);
        assert_eq!(w.days_until_end(d("2026-02-12")), 0);
    }
}
