//! Lenient calendar-date parsing for `date` / `date_range` search terms.

use crate::schema::parse_timestamp;
use chrono::{Days, NaiveDate};

/// Parse a search term to a calendar date relative to `today`.
///
/// Accepts ISO dates and timestamps, `d/m/Y`, `today`, `yesterday`, `tomorrow`, `now`,
/// `+N days|weeks`, `-N days|weeks` and `N days|weeks ago`. Anything else is None.
pub fn parse_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(t) = parse_timestamp(trimmed) {
        return Some(t.date_naive());
    }
    let s = trimmed.to_ascii_lowercase();
    match s.as_str() {
        "today" | "now" => return Some(today),
        "yesterday" => return today.checked_sub_days(Days::new(1)),
        "tomorrow" => return today.checked_add_days(Days::new(1)),
        _ => {}
    }
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%d/%m/%Y") {
        return Some(d);
    }
    relative(&s, today)
}

fn relative(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (s, ago) = match s.strip_suffix("ago") {
        Some(rest) => (rest.trim_end(), true),
        None => (s, false),
    };
    let mut parts = s.split_whitespace();
    let amount = parts.next()?;
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let (negative, digits) = match amount.as_bytes().first()? {
        b'+' => (false, &amount[1..]),
        b'-' => (true, &amount[1..]),
        _ => (false, amount),
    };
    let n: u64 = digits.parse().ok()?;
    let days = match unit.trim_end_matches('s') {
        "day" => n,
        "week" => n.checked_mul(7)?,
        _ => return None,
    };
    if negative != ago {
        today.checked_sub_days(Days::new(days))
    } else {
        today.checked_add_days(Days::new(days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    #[test]
    fn absolute_formats() {
        assert_eq!(parse_date("2024-01-31", today()), d(2024, 1, 31));
        assert_eq!(parse_date("2024-01-31 23:10:00", today()), d(2024, 1, 31));
        assert_eq!(parse_date("2024-01-31T23:10:00Z", today()), d(2024, 1, 31));
        assert_eq!(parse_date("31/01/2024", today()), d(2024, 1, 31));
    }

    #[test]
    fn relative_formats() {
        assert_eq!(parse_date("Today", today()), d(2024, 3, 10));
        assert_eq!(parse_date("yesterday", today()), d(2024, 3, 9));
        assert_eq!(parse_date("tomorrow", today()), d(2024, 3, 11));
        assert_eq!(parse_date("+2 days", today()), d(2024, 3, 12));
        assert_eq!(parse_date("1 week ago", today()), d(2024, 3, 3));
        assert_eq!(parse_date("-1 day", today()), d(2024, 3, 9));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date("not a date", today()), None);
        assert_eq!(parse_date("3 fortnights", today()), None);
        assert_eq!(parse_date("", today()), None);
    }
}
