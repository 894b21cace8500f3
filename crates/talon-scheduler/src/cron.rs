//! Five-field cron expressions.
//!
//! `minute hour day-of-month month day-of-week`, with `*`, lists, ranges,
//! steps, `JAN..DEC` and `SUN..SAT` names, and both `0` and `7` meaning
//! Sunday. When day-of-month and day-of-week are both restricted, a time
//! matches if either does (classic cron).
//!
//! Fields are validated here; evaluation is delegated to the `cron` crate
//! after rewriting into its seconds-first dialect.

use chrono::{DateTime, Duration, TimeZone, Timelike};
use cron::Schedule;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use talon_core::StoreError;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const DAY_LONG: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];
const MONTH_LONG: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
        }
    }

    /// Inclusive bounds accepted in the expression.
    fn bounds(self) -> (u32, u32) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 7),
        }
    }

    fn value(self, token: &str) -> Result<u32, String> {
        let upper = token.to_ascii_uppercase();
        let named = match self {
            Self::Month => MONTH_NAMES.iter().position(|n| *n == upper).map(|i| i as u32 + 1),
            Self::DayOfWeek => DAY_NAMES.iter().position(|n| *n == upper).map(|i| i as u32),
            _ => None,
        };
        if let Some(v) = named {
            return Ok(v);
        }
        let v: u32 = token
            .parse()
            .map_err(|_| format!("'{token}' is not a valid {} value", self.label()))?;
        let (lo, hi) = self.bounds();
        if v < lo || v > hi {
            return Err(format!("{} value {v} is outside {lo}-{hi}", self.label()));
        }
        Ok(v)
    }
}

/// One parsed field: the expanded value set plus the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    text: String,
    values: BTreeSet<u32>,
}

impl Field {
    fn parse(text: &str, kind: FieldKind) -> Result<Self, String> {
        let (lo, hi) = kind.bounds();
        let mut values = BTreeSet::new();

        for item in text.split(',') {
            if item.is_empty() {
                return Err(format!("empty item in {} field '{text}'", kind.label()));
            }

            let (range, step) = match item.split_once('/') {
                Some((r, s)) => {
                    let step: u32 = s
                        .parse()
                        .map_err(|_| format!("invalid step '{s}' in {} field", kind.label()))?;
                    if step == 0 {
                        return Err(format!("step of 0 in {} field", kind.label()));
                    }
                    (r, step)
                }
                None => (item, 1),
            };

            let (start, end) = if range == "*" {
                (lo, hi)
            } else if let Some((a, b)) = range.split_once('-') {
                let (a, b) = (kind.value(a)?, kind.value(b)?);
                if a > b {
                    return Err(format!("range {a}-{b} is backwards in {} field", kind.label()));
                }
                (a, b)
            } else {
                let a = kind.value(range)?;
                // `5/15` means "from 5 to the end, every 15"
                if item.contains('/') { (a, hi) } else { (a, a) }
            };

            values.extend((start..=end).step_by(step as usize));
        }

        if matches!(kind, FieldKind::DayOfWeek) && values.remove(&7) {
            values.insert(0);
        }

        Ok(Self {
            text: text.to_string(),
            values,
        })
    }

    /// A field starting with `*` does not restrict matching.
    fn is_wildcard(&self) -> bool {
        self.text.starts_with('*')
    }

    fn single(&self) -> Option<u32> {
        (self.values.len() == 1).then(|| self.values.iter().next().copied()).flatten()
    }

    fn step(&self) -> Option<u32> {
        self.text.strip_prefix("*/").and_then(|s| s.parse().ok())
    }

    fn to_cron_list(&self, full: usize) -> String {
        if self.values.len() == full {
            return "*".into();
        }
        join(self.values.iter())
    }
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

/// A validated five-field cron expression.
#[derive(Clone)]
pub struct CronExpr {
    source: String,
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
    schedules: Vec<Schedule>,
}

impl fmt::Debug for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronExpr").field(&self.source).finish()
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl FromStr for CronExpr {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl CronExpr {
    /// Parse and validate. Exactly five whitespace-separated fields.
    pub fn parse(expr: &str) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::InvalidCron {
            expr: expr.to_string(),
            reason,
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }

        let minute = Field::parse(fields[0], FieldKind::Minute).map_err(invalid)?;
        let hour = Field::parse(fields[1], FieldKind::Hour).map_err(invalid)?;
        let dom = Field::parse(fields[2], FieldKind::DayOfMonth).map_err(invalid)?;
        let month = Field::parse(fields[3], FieldKind::Month).map_err(invalid)?;
        let dow = Field::parse(fields[4], FieldKind::DayOfWeek).map_err(invalid)?;

        let mut expr_out = Self {
            source: fields.join(" "),
            minute,
            hour,
            dom,
            month,
            dow,
            schedules: Vec::new(),
        };
        expr_out.schedules = expr_out
            .normalized()
            .iter()
            .map(|s| Schedule::from_str(s).map_err(|e| invalid(e.to_string())))
            .collect::<Result<_, _>>()?;
        Ok(expr_out)
    }

    /// Check an expression without keeping it.
    pub fn validate(expr: &str) -> Result<(), StoreError> {
        Self::parse(expr).map(|_| ())
    }

    /// The expression with whitespace normalised.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The expression rewritten for the `cron` crate. Two schedules when the
    /// day-of-month/day-of-week OR rule applies, otherwise one.
    pub fn normalized(&self) -> Vec<String> {
        let minute = self.minute.to_cron_list(60);
        let hour = self.hour.to_cron_list(24);
        let month = self.month.to_cron_list(12);
        let dom = self.dom.to_cron_list(31);
        let dow = if self.dow.values.len() == 7 {
            "*".to_string()
        } else {
            join(self.dow.values.iter().map(|d| DAY_NAMES[*d as usize]))
        };

        let line = |dom: &str, dow: &str| format!("0 {minute} {hour} {dom} {month} {dow}");

        match (self.dom.is_wildcard(), self.dow.is_wildcard()) {
            (false, false) => vec![line(&dom, "*"), line("*", &dow)],
            (true, false) => vec![line("*", &dow)],
            (false, true) => vec![line(&dom, "*")],
            (true, true) => vec![line("*", "*")],
        }
    }

    /// Does the wall-clock minute containing `at` match?
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let Some(minute_start) = at.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
            return false;
        };
        let probe = minute_start.clone() - Duration::seconds(1);
        self.schedules
            .iter()
            .any(|s| s.after(&probe).next().is_some_and(|next| next == minute_start))
    }

    /// First matching minute strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(after).next())
            .min()
    }

    /// A human-readable rendering, e.g. "every day at 08:00".
    pub fn describe(&self) -> String {
        let time = self.describe_time();
        match self.describe_days() {
            None if time.starts_with("at ") => format!("every day {time}"),
            None => time,
            Some(days) => format!("{time} {days}"),
        }
    }

    fn describe_time(&self) -> String {
        let all_hours = self.hour.values.len() == 24;
        match (self.minute.single(), self.hour.single()) {
            (Some(m), Some(h)) => format!("at {h:02}:{m:02}"),
            (Some(m), None) if all_hours => format!("every hour at minute {m}"),
            (Some(m), None) => match self.hour.step() {
                Some(n) => format!("every {n} hours at minute {m}"),
                None => format!("at minute {m} past hours {}", join(self.hour.values.iter())),
            },
            _ if self.minute.values.len() == 60 && all_hours => "every minute".into(),
            _ if all_hours && self.minute.step().is_some() => {
                format!("every {} minutes", self.minute.step().unwrap_or(1))
            }
            _ if all_hours => format!("at minutes {} of every hour", join(self.minute.values.iter())),
            _ => format!(
                "at minutes {} past hours {}",
                join(self.minute.values.iter()),
                join(self.hour.values.iter())
            ),
        }
    }

    fn describe_days(&self) -> Option<String> {
        let days = match (self.dom.is_wildcard(), self.dow.is_wildcard()) {
            (true, true) => None,
            (false, true) => Some(self.describe_dom()),
            (true, false) => Some(self.describe_dow()),
            (false, false) => Some(format!("{} or {}", self.describe_dom(), self.describe_dow())),
        };
        let months = (self.month.values.len() != 12).then(|| {
            let names: Vec<&str> = self
                .month
                .values
                .iter()
                .map(|m| MONTH_LONG[*m as usize - 1])
                .collect();
            format!("in {}", names.join(", "))
        });

        match (days, months) {
            (None, None) => None,
            (Some(d), None) => Some(d),
            (None, Some(m)) => Some(m),
            (Some(d), Some(m)) => Some(format!("{d} {m}")),
        }
    }

    fn describe_dom(&self) -> String {
        if self.dom.values.len() == 1 {
            format!("on day {} of the month", join(self.dom.values.iter()))
        } else {
            format!("on days {} of the month", join(self.dom.values.iter()))
        }
    }

    fn describe_dow(&self) -> String {
        let days: Vec<u32> = self.dow.values.iter().copied().collect();
        match days.as_slice() {
            [1, 2, 3, 4, 5] => "on weekdays".into(),
            [0, 6] => "on weekends".into(),
            _ => {
                let names: Vec<&str> = days.iter().map(|d| DAY_LONG[*d as usize]).collect();
                format!("on {}", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Utc};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn accepts_valid_expressions() {
        for expr in [
            "* * * * *",
            "0 8 * * *",
            "*/15 9-17 * * MON-FRI",
            "0 0 1,15 * *",
            "30 6 * JAN,JUL 0",
            "5/10 * * * 7",
            "0 12 * * sun",
        ] {
            assert!(CronExpr::parse(expr).is_ok(), "{expr} should parse");
        }
    }

    #[test]
    fn rejects_invalid_expressions() {
        for expr in [
            "",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "a b c d e",
            "1,,2 * * * *",
        ] {
            let err = CronExpr::parse(expr).unwrap_err();
            assert!(matches!(err, StoreError::InvalidCron { .. }), "{expr} should fail");
        }
    }

    #[test]
    fn whitespace_is_normalised() {
        let expr = CronExpr::parse("  0   8 * *   * ").unwrap();
        assert_eq!(expr.as_str(), "0 8 * * *");
    }

    #[test]
    fn normalises_to_seconds_first_dialect() {
        let expr = CronExpr::parse("0 8 * * 1-5").unwrap();
        assert_eq!(expr.normalized(), vec!["0 0 8 * * MON,TUE,WED,THU,FRI"]);

        let expr = CronExpr::parse("0 0 1 * 0,7").unwrap();
        assert_eq!(expr.normalized(), vec!["0 0 0 1 * *", "0 0 0 * * SUN"]);
    }

    #[test]
    fn matches_daily_time() {
        let expr = CronExpr::parse("0 8 * * *").unwrap();
        assert!(expr.matches(&at(2026, 3, 2, 8, 0)));
        assert!(expr.matches(&(at(2026, 3, 2, 8, 0) + Duration::seconds(42))));
        assert!(!expr.matches(&at(2026, 3, 2, 8, 1)));
        assert!(!expr.matches(&at(2026, 3, 2, 9, 0)));
    }

    #[test]
    fn sunday_is_zero_and_seven() {
        // 2026-03-01 is a Sunday
        let sunday = at(2026, 3, 1, 12, 0);
        assert_eq!(sunday.weekday(), chrono::Weekday::Sun);
        assert!(CronExpr::parse("0 12 * * 0").unwrap().matches(&sunday));
        assert!(CronExpr::parse("0 12 * * 7").unwrap().matches(&sunday));
        assert!(CronExpr::parse("0 12 * * SUN").unwrap().matches(&sunday));
        assert!(!CronExpr::parse("0 12 * * 1").unwrap().matches(&sunday));
    }

    #[test]
    fn day_of_month_or_day_of_week() {
        // 1st of the month OR any Monday
        let expr = CronExpr::parse("0 9 1 * MON").unwrap();
        assert!(expr.matches(&at(2026, 4, 1, 9, 0))); // Wednesday the 1st
        assert!(expr.matches(&at(2026, 4, 6, 9, 0))); // Monday the 6th
        assert!(!expr.matches(&at(2026, 4, 7, 9, 0))); // Tuesday the 7th
    }

    #[test]
    fn steps_and_ranges() {
        let expr = CronExpr::parse("*/15 9-17 * * *").unwrap();
        assert!(expr.matches(&at(2026, 1, 5, 9, 45)));
        assert!(!expr.matches(&at(2026, 1, 5, 9, 50)));
        assert!(!expr.matches(&at(2026, 1, 5, 18, 0)));

        let expr = CronExpr::parse("5/20 * * * *").unwrap();
        assert!(expr.matches(&at(2026, 1, 5, 3, 25)));
        assert!(!expr.matches(&at(2026, 1, 5, 3, 0)));
    }

    #[test]
    fn next_after_finds_following_run() {
        let expr = CronExpr::parse("0 8 * * *").unwrap();
        let next = expr.next_after(&at(2026, 3, 2, 8, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 3, 8, 0));

        let expr = CronExpr::parse("0 9 1 * MON").unwrap();
        let next = expr.next_after(&at(2026, 4, 1, 9, 0)).unwrap();
        assert_eq!(next, at(2026, 4, 6, 9, 0));
    }

    #[test]
    fn describes_common_schedules() {
        assert_eq!(CronExpr::parse("0 8 * * *").unwrap().describe(), "every day at 08:00");
        assert_eq!(CronExpr::parse("* * * * *").unwrap().describe(), "every minute");
        assert_eq!(CronExpr::parse("*/5 * * * *").unwrap().describe(), "every 5 minutes");
        assert_eq!(
            CronExpr::parse("30 9 * * 1-5").unwrap().describe(),
            "at 09:30 on weekdays"
        );
        assert_eq!(
            CronExpr::parse("0 0 1 JAN *").unwrap().describe(),
            "at 00:00 on day 1 of the month in January"
        );
        assert_eq!(
            CronExpr::parse("15 * * * *").unwrap().describe(),
            "every hour at minute 15"
        );
    }
}
