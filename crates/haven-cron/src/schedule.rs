use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::types::Schedule;

/// Compute the next UTC execution time for `schedule` starting strictly
/// after `from`. Returns `None` when the schedule is exhausted (an `At`
/// instant already in the past, or an unparsable cron expression).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::At { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }
        Schedule::Every { every_secs } => Some(from + Duration::seconds((*every_secs).max(1) as i64)),
        Schedule::Cron { expression } => next_cron_match(expression, from),
    }
}

/// Minimal 5-field cron evaluator: `minute hour day-of-month month
/// day-of-week`. Each field is `*`, a literal number, or a comma-separated
/// list of numbers — no ranges or steps. Scans forward minute-by-minute up
/// to a year; returns `None` if no match is found in that window or the
/// expression doesn't have exactly 5 fields.
fn next_cron_match(expression: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }
    let minute = parse_field(fields[0], 0, 59)?;
    let hour = parse_field(fields[1], 0, 23)?;
    let dom = parse_field(fields[2], 1, 31)?;
    let month = parse_field(fields[3], 1, 12)?;
    let dow = parse_field(fields[4], 0, 6)?;

    let mut candidate = from
        .with_second(0)?
        .with_nanosecond(0)?
        + Duration::minutes(1);

    const MAX_STEPS: i64 = 60 * 24 * 366;
    for _ in 0..MAX_STEPS {
        let minute_ok = minute.contains(&(candidate.minute() as u32));
        let hour_ok = hour.contains(&candidate.hour());
        let dom_ok = dom.contains(&candidate.day());
        let month_ok = month.contains(&candidate.month());
        // chrono weekday: Monday=0..Sunday=6; cron dow: Sunday=0..Saturday=6.
        let cron_dow = (candidate.weekday().num_days_from_sunday()) as u32;
        let dow_ok = dow.contains(&cron_dow);

        if minute_ok && hour_ok && dom_ok && month_ok && dow_ok {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }
    None
}

fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }
    field
        .split(',')
        .map(|part| part.parse::<u32>().ok().filter(|v| *v >= min && *v <= max))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_advances_by_interval() {
        let from = Utc::now();
        let next = compute_next_run(&Schedule::Every { every_secs: 30 }, from).unwrap();
        assert_eq!((next - from).num_seconds(), 30);
    }

    #[test]
    fn at_in_the_past_is_exhausted() {
        let from = Utc::now();
        let past = from - Duration::hours(1);
        assert!(compute_next_run(&Schedule::At { at: past }, from).is_none());
    }

    #[test]
    fn cron_wildcard_matches_next_minute() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let next = compute_next_run(&Schedule::Cron { expression: "* * * * *".into() }, from).unwrap();
        assert_eq!(next, from + Duration::minutes(1));
    }

    #[test]
    fn cron_specific_hour_minute() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let next = compute_next_run(&Schedule::Cron { expression: "30 9 * * *".into() }, from).unwrap();
        assert_eq!(next.hour(), 9);
        assert_eq!(next.minute(), 30);
        assert_eq!(next.day(), 2);
    }

    #[test]
    fn malformed_cron_expression_is_none() {
        assert!(compute_next_run(&Schedule::Cron { expression: "bogus".into() }, Utc::now()).is_none());
    }
}
