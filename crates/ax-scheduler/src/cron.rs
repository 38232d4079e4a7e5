//! 5-field cron matcher (`minute hour dom month dow`). Supports `*`, `N`,
//! `N-M`, `N,M,…`, and `*/N` per field. `dom`/`dow` follow the classic cron
//! OR rule: when both are restricted (neither is `*`), a minute matches if
//! *either* field matches.

use chrono::{DateTime, Datelike, Timelike, Utc};

const MINUTE: (u32, u32) = (0, 59);
const HOUR: (u32, u32) = (0, 23);
const DOM: (u32, u32) = (1, 31);
const MONTH: (u32, u32) = (1, 12);
const DOW: (u32, u32) = (0, 6);

#[derive(Debug, Clone)]
struct Field {
    allowed: Vec<bool>, // indexed by value - min
    min: u32,
    is_wildcard: bool,
}

impl Field {
    fn parse(spec: &str, (min, max): (u32, u32)) -> Result<Self, String> {
        let is_wildcard = spec.trim() == "*";
        let mut allowed = vec![false; (max - min + 1) as usize];
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(format!("empty cron field component in '{spec}'"));
            }
            let (range_part, step) = match part.split_once('/') {
                Some((r, s)) => (
                    r,
                    s.parse::<u32>()
                        .map_err(|_| format!("invalid step in '{part}'"))?,
                ),
                None => (part, 1),
            };
            if step == 0 {
                return Err(format!("step cannot be zero in '{part}'"));
            }
            let (lo, hi) = if range_part == "*" {
                (min, max)
            } else if let Some((a, b)) = range_part.split_once('-') {
                let a: u32 = a.parse().map_err(|_| format!("invalid range start in '{part}'"))?;
                let b: u32 = b.parse().map_err(|_| format!("invalid range end in '{part}'"))?;
                (a, b)
            } else {
                let v: u32 = range_part
                    .parse()
                    .map_err(|_| format!("invalid value '{range_part}' in cron field"))?;
                (v, v)
            };
            if lo < min || hi > max || lo > hi {
                return Err(format!("cron field value out of range [{min},{max}]: '{part}'"));
            }
            let mut v = lo;
            while v <= hi {
                allowed[(v - min) as usize] = true;
                v += step;
            }
        }
        Ok(Field { allowed, min, is_wildcard })
    }

    fn matches(&self, value: u32) -> bool {
        self.allowed
            .get((value - self.min) as usize)
            .copied()
            .unwrap_or(false)
    }
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "cron expression must have 5 fields (minute hour dom month dow), got {}: '{expr}'",
                fields.len()
            ));
        }
        Ok(CronSchedule {
            minute: Field::parse(fields[0], MINUTE)?,
            hour: Field::parse(fields[1], HOUR)?,
            dom: Field::parse(fields[2], DOM)?,
            month: Field::parse(fields[3], MONTH)?,
            dow: Field::parse(fields[4], DOW)?,
        })
    }

    /// True if `dt` (any timezone, compared in UTC field values) matches this expression.
    pub fn matches(&self, dt: DateTime<Utc>) -> bool {
        if !self.minute.matches(dt.minute()) || !self.hour.matches(dt.hour()) {
            return false;
        }
        if !self.month.matches(dt.month()) {
            return false;
        }
        // chrono weekday: Mon=0..Sun=6 via num_days_from_monday, but cron dow is
        // 0=Sunday..6=Saturday. Convert.
        let cron_dow = (dt.weekday().num_days_from_sunday()) % 7;

        let dom_restricted = !self.dom.is_wildcard;
        let dow_restricted = !self.dow.is_wildcard;
        match (dom_restricted, dow_restricted) {
            (false, false) => true,
            (true, false) => self.dom.matches(dt.day()),
            (false, true) => self.dow.matches(cron_dow),
            (true, true) => self.dom.matches(dt.day()) || self.dow.matches(cron_dow),
        }
    }
}

/// Convenience one-shot parse-and-match, used where callers don't want to
/// cache a parsed [`CronSchedule`].
pub fn matches_expression(expr: &str, dt: DateTime<Utc>) -> Result<bool, String> {
    Ok(CronSchedule::parse(expr)?.matches(dt))
}

/// Scan forward minute-by-minute from `from` (exclusive) for the next instant
/// matching `expr`, bounded to `max_minutes` to guarantee termination.
pub fn next_match_after(
    expr: &str,
    from: DateTime<Utc>,
    max_minutes: i64,
) -> Result<Option<DateTime<Utc>>, String> {
    let schedule = CronSchedule::parse(expr)?;
    let start = truncate_to_minute(from) + chrono::Duration::minutes(1);
    for i in 0..max_minutes {
        let candidate = start + chrono::Duration::minutes(i);
        if schedule.matches(candidate) {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

pub fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.hour(), dt.minute(), 0)
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
        .unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn wildcard_matches_every_minute() {
        let s = CronSchedule::parse("* * * * *").unwrap();
        assert!(s.matches(dt(2026, 7, 27, 13, 45)));
    }

    #[test]
    fn exact_minute_and_hour() {
        let s = CronSchedule::parse("30 9 * * *").unwrap();
        assert!(s.matches(dt(2026, 7, 27, 9, 30)));
        assert!(!s.matches(dt(2026, 7, 27, 9, 31)));
        assert!(!s.matches(dt(2026, 7, 27, 10, 30)));
    }

    #[test]
    fn step_values() {
        let s = CronSchedule::parse("*/15 * * * *").unwrap();
        assert!(s.matches(dt(2026, 7, 27, 0, 0)));
        assert!(s.matches(dt(2026, 7, 27, 0, 15)));
        assert!(!s.matches(dt(2026, 7, 27, 0, 20)));
    }

    #[test]
    fn list_and_range() {
        let s = CronSchedule::parse("0 9,17 1-5 * *").unwrap();
        assert!(s.matches(dt(2026, 7, 3, 9, 0)));
        assert!(s.matches(dt(2026, 7, 5, 17, 0)));
        assert!(!s.matches(dt(2026, 7, 6, 9, 0)));
    }

    #[test]
    fn dom_dow_or_semantics() {
        // 2026-07-27 is a Monday (dow=1).
        let s = CronSchedule::parse("0 0 1 * 1").unwrap();
        assert!(s.matches(dt(2026, 7, 1, 0, 0))); // dom matches
        assert!(s.matches(dt(2026, 7, 27, 0, 0))); // dow matches (Monday)
        assert!(!s.matches(dt(2026, 7, 2, 0, 0))); // neither matches
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("* * *").is_err());
    }

    #[test]
    fn next_match_after_scans_forward() {
        let from = dt(2026, 7, 27, 13, 0);
        let next = next_match_after("0 14 * * *", from, 24 * 60).unwrap().unwrap();
        assert_eq!(next, dt(2026, 7, 27, 14, 0));
    }
}
