//! Leading time expressions: `in N minutes|hours|days`, `at HH:MM`, `tomorrow [HH:MM]`

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^in\s+(\d+)\s*(minutes?|mins?|hours?|hrs?|days?)\b\s*(.*)$").unwrap()
});
static AT_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^at\s+(\d{1,2}):(\d{2})\b\s*(.*)$").unwrap());
static TOMORROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^tomorrow\b(?:\s+(?:at\s+)?(\d{1,2}):(\d{2})\b)?\s*(.*)$").unwrap()
});

/// Hour used for `tomorrow` without a time
const DEFAULT_HOUR: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTime {
    /// Milliseconds since the Unix epoch
    pub when_ms: i64,
    /// What is left of the input after the time expression
    pub text: String,
}

pub fn parse_time_expression<Tz: TimeZone>(input: &str, now: &DateTime<Tz>) -> Option<ParsedTime> {
    let input = input.trim();

    if let Some(caps) = RELATIVE.captures(input) {
        let amount: i64 = caps[1].parse().ok()?;
        let unit = caps[2].to_lowercase();
        let delta = if unit.starts_with('m') {
            Duration::try_minutes(amount)?
        } else if unit.starts_with('h') {
            Duration::try_hours(amount)?
        } else {
            Duration::try_days(amount)?
        };
        let when = now.clone().checked_add_signed(delta)?;
        return Some(ParsedTime {
            when_ms: when.timestamp_millis(),
            text: caps[3].trim().to_string(),
        });
    }

    if let Some(caps) = AT_TIME.captures(input) {
        let time = clock_time(&caps[1], &caps[2])?;
        let today = now.date_naive();
        let mut when = at_local(now, today, time)?;
        if when <= *now {
            when = at_local(now, today.checked_add_days(Days::new(1))?, time)?;
        }
        return Some(ParsedTime {
            when_ms: when.timestamp_millis(),
            text: caps[3].trim().to_string(),
        });
    }

    if let Some(caps) = TOMORROW.captures(input) {
        let time = match (caps.get(1), caps.get(2)) {
            (Some(h), Some(m)) => clock_time(h.as_str(), m.as_str())?,
            _ => NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0)?,
        };
        let tomorrow = now.date_naive().checked_add_days(Days::new(1))?;
        let when = at_local(now, tomorrow, time)?;
        return Some(ParsedTime {
            when_ms: when.timestamp_millis(),
            text: caps[3].trim().to_string(),
        });
    }

    None
}

fn clock_time(hour: &str, minute: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// `date` at `time` in `now`'s time zone; the earlier instant when ambiguous
fn at_local<Tz: TimeZone>(now: &DateTime<Tz>, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    now.timezone()
        .from_local_datetime(&date.and_time(time))
        .earliest()
}
