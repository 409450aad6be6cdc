//! Human-friendly duration input.
//!
//! Three forms are accepted: token syntax (`1d2h5m`, `1 hour 5 minutes`),
//! colon syntax (`7:04`, `1d 7:04`), and a bare integer meaning minutes.
//! Ministry reminders additionally accept an in-game server time, either
//! `HH:MM` (next occurrence) or `D-M-YYYY HH:MM` (absolute).

use chrono::{DateTime, Duration, Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

// Unit alternatives are ordered longest first so e.g. "hours" is not
// consumed as "h" + leftover.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?P<num>\d+)(?P<unit>days|day|d|hours|hour|hrs|hr|h|minutes|minute|mins|min|m)",
    )
    .unwrap()
});

// e.g. "7:04", "1d7:04", "1d 7:04" (matched against the compacted input)
static COLON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(?P<d>\d+)d)?(?P<h>\d{1,2}):(?P<m>\d{1,2})$").unwrap());

// e.g. "17:09" or "8-11-2025 17:09"; the minute must be two digits
static SERVER_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<day>\d{1,2})-(?P<month>\d{1,2})-(?P<year>\d{4})\s+)?(?P<h>\d{1,2}):(?P<m>\d{2})$")
        .unwrap()
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("minutes must be < 60 in H:MM format")]
    MinutesOverflow,
    #[error("could not parse duration: {0:?}")]
    Unparsable(String),
    #[error("invalid server time: {0:?}")]
    InvalidServerTime(String),
    #[error("server time {0:?} is in the past")]
    PastServerTime(String),
}

fn compact(s: &str) -> String {
    s.split_whitespace().collect()
}

/// Checked construction from day/hour/minute counts; `None` on overflow.
pub fn duration_from_parts(days: i64, hours: i64, minutes: i64) -> Option<Duration> {
    let d = Duration::try_days(days)?;
    let h = Duration::try_hours(hours)?;
    let m = Duration::try_minutes(minutes)?;
    d.checked_add(&h)?.checked_add(&m)
}

fn parse_colon_form(s: &str) -> Result<Option<Duration>, DurationError> {
    let compacted = compact(s);
    let caps = match COLON_RE.captures(&compacted) {
        Some(caps) => caps,
        None => return Ok(None),
    };
    let days: i64 = match caps.name("d") {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| DurationError::Unparsable(s.to_string()))?,
        None => 0,
    };
    let hours: i64 = caps["h"].parse().unwrap();
    let minutes: i64 = caps["m"].parse().unwrap();
    if minutes >= 60 {
        // Not a fallthrough: "7:99" is a hard error, not a token candidate.
        return Err(DurationError::MinutesOverflow);
    }
    duration_from_parts(days, hours, minutes)
        .ok_or_else(|| DurationError::Unparsable(s.to_string()))
        .map(Some)
}

fn parse_tokenized_form(s: &str) -> Option<Duration> {
    let compacted = compact(s);
    let mut days = 0i64;
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut matched_total = 0;
    let mut found = false;

    for caps in TOKEN_RE.captures_iter(&compacted) {
        found = true;
        let whole = caps.get(0).unwrap();
        matched_total += whole.end() - whole.start();
        let num: i64 = caps["num"].parse().ok()?;
        match caps["unit"].to_ascii_lowercase().as_bytes()[0] {
            b'd' => days = days.checked_add(num)?,
            b'h' => hours = hours.checked_add(num)?,
            b'm' => minutes = minutes.checked_add(num)?,
            _ => unreachable!(),
        }
    }

    if !found || matched_total != compacted.len() {
        // Partial matches like "1m30" are rejected wholesale.
        return None;
    }

    hours = hours.checked_add(minutes / 60)?;
    minutes %= 60;
    duration_from_parts(days, hours, minutes)
}

fn parse_bare_minutes(s: &str) -> Option<Duration> {
    // No internal whitespace: "4 8" is not 48 minutes.
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok().map(Duration::minutes)
    } else {
        None
    }
}

/// Parses a human-friendly duration (`1h30m`, `1d7:04`, `45`).
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let sanitized = input.trim();
    if sanitized.is_empty() {
        return Err(DurationError::Empty);
    }
    if let Some(d) = parse_colon_form(sanitized)? {
        return Ok(d);
    }
    if let Some(d) = parse_tokenized_form(sanitized) {
        return Ok(d);
    }
    if let Some(d) = parse_bare_minutes(sanitized) {
        return Ok(d);
    }
    Err(DurationError::Unparsable(sanitized.to_string()))
}

/// Formats a duration as `Xd Yh Zm`, omitting zero units (at least `0m`).
pub fn format_duration(d: Duration) -> String {
    let total_minutes = d.num_minutes();
    let (days, rem) = (total_minutes / 1440, total_minutes % 1440);
    let (hours, minutes) = (rem / 60, rem % 60);
    let mut parts = Vec::new();
    if days != 0 {
        parts.push(format!("{days}d"));
    }
    if hours != 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes != 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

/// Converts an in-game server time into the duration until it occurs,
/// relative to the local clock. The game shows wall-clock times, so `17:09`
/// means the next 17:09 the user will see, not a UTC instant.
pub fn parse_server_time_to_duration(input: &str) -> Result<Duration, DurationError> {
    parse_server_time_to_duration_at(input, Local::now())
}

/// Same as [`parse_server_time_to_duration`] with an explicit reference time.
pub fn parse_server_time_to_duration_at<Tz: TimeZone>(
    input: &str,
    now: DateTime<Tz>,
) -> Result<Duration, DurationError> {
    let sanitized = input.trim();
    let invalid = || DurationError::InvalidServerTime(sanitized.to_string());
    let caps = SERVER_TIME_RE.captures(sanitized).ok_or_else(invalid)?;

    let hour: u32 = caps["h"].parse().map_err(|_| invalid())?;
    let minute: u32 = caps["m"].parse().map_err(|_| invalid())?;

    if let Some(day) = caps.name("day") {
        let day: u32 = day.as_str().parse().map_err(|_| invalid())?;
        let month: u32 = caps["month"].parse().map_err(|_| invalid())?;
        let year: i32 = caps["year"].parse().map_err(|_| invalid())?;
        let at = now
            .timezone()
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .ok_or_else(invalid)?;
        if at <= now {
            return Err(DurationError::PastServerTime(sanitized.to_string()));
        }
        Ok(at - now)
    } else {
        let naive = now
            .date_naive()
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(invalid)?;
        let mut at = now
            .timezone()
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(invalid)?;
        if at <= now {
            // Already past today, the game means tomorrow.
            at = at + Duration::days(1);
        }
        Ok(at - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn td(days: i64, hours: i64, minutes: i64) -> Duration {
        Duration::days(days) + Duration::hours(hours) + Duration::minutes(minutes)
    }

    #[test]
    fn parse_duration_valid() {
        let cases = [
            ("1h", td(0, 1, 0)),
            ("30m", td(0, 0, 30)),
            ("1h30m", td(0, 1, 30)),
            ("1d 7:0", td(1, 7, 0)),
            ("1d7:04", td(1, 7, 4)),
            ("1d 7:04", td(1, 7, 4)),
            ("1d 7h 04m", td(1, 7, 4)),
            ("1d 7h 04min", td(1, 7, 4)),
            ("7:4", td(0, 7, 4)),
            ("90m", td(0, 1, 30)),
            ("1d2h5m", td(1, 2, 5)),
            ("1hr", td(0, 1, 0)),
            ("45", td(0, 0, 45)),
            ("60m", td(0, 1, 0)),
            ("120m", td(0, 2, 0)),
            ("1h 60m", td(0, 2, 0)),
            ("07:04", td(0, 7, 4)),
            ("1d 0:59", td(1, 0, 59)),
            ("1H30M", td(0, 1, 30)),
            ("1 hour 5 minutes", td(0, 1, 5)),
            ("2hours", td(0, 2, 0)),
            ("15mins", td(0, 0, 15)),
            ("1d2h", td(1, 2, 0)),
            ("2h5m", td(0, 2, 5)),
            ("2h  5m", td(0, 2, 5)),
            ("\t 2h\n5m ", td(0, 2, 5)),
            ("0m", td(0, 0, 0)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration(input), Ok(expected), "input: {input:?}");
        }
    }

    #[test]
    fn parse_duration_invalid() {
        for bad in ["", "   ", "abc", "1d 7:64", "7:99", "007:04", "1m30", "4 8"] {
            assert!(parse_duration(bad).is_err(), "input: {bad:?}");
        }
    }

    #[test]
    fn parse_duration_overflow_is_an_error() {
        // Counts too large for chrono must come back as errors, not panics.
        for bad in [
            "999999999999999d",
            "999999999999999d7:04",
            "99999999999999999999d7:04",
            "99999999999999999999m",
            "9223372036854775807m 1m",
        ] {
            assert!(parse_duration(bad).is_err(), "input: {bad:?}");
        }
        assert_eq!(duration_from_parts(1, 2, 3), Some(td(1, 2, 3)));
        assert_eq!(duration_from_parts(i64::MAX, 0, 0), None);
    }

    #[test]
    fn format_duration_variants() {
        let cases = [
            (td(0, 0, 0), "0m"),
            (td(0, 0, 5), "5m"),
            (td(0, 2, 0), "2h"),
            (td(0, 1, 30), "1h 30m"),
            (td(1, 7, 4), "1d 7h 4m"),
            (td(2, 0, 0), "2d"),
        ];
        for (input, expected) in cases {
            assert_eq!(format_duration(input), expected);
        }
    }

    #[test]
    fn server_time_valid() {
        let cases = [
            // Time only, still ahead of us today.
            ("17:09", (2025, 12, 3, 14, 0), td(0, 3, 9)),
            // Time only, already past today, wraps to tomorrow.
            ("17:09", (2025, 12, 3, 18, 0), td(0, 23, 9)),
            // Full date-time.
            ("5-12-2025 17:09", (2025, 12, 3, 14, 0), td(2, 3, 9)),
            ("8-12-2025 10:00", (2025, 12, 3, 14, 0), td(4, 20, 0)),
            ("08-12-2025 10:00", (2025, 12, 3, 14, 0), td(4, 20, 0)),
            // Midnight.
            ("00:00", (2025, 12, 3, 22, 0), td(0, 2, 0)),
            // Single digit hour.
            ("3:30", (2025, 12, 3, 1, 0), td(0, 2, 30)),
        ];
        for (input, (y, mo, d, h, mi), expected) in cases {
            let now = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap();
            assert_eq!(
                parse_server_time_to_duration_at(input, now),
                Ok(expected),
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn server_time_invalid() {
        let now = Utc.with_ymd_and_hms(2025, 12, 3, 14, 0, 0).unwrap();
        let cases = [
            "",
            "   ",
            "abc",
            "25:00",         // invalid hour
            "12:60",         // invalid minute
            "17:9",          // minute must be 2 digits
            "1-1-2025",      // missing time
            "17:09:00",      // seconds not supported
            "1-12-2025 10:00", // date in the past
        ];
        for bad in cases {
            assert!(
                parse_server_time_to_duration_at(bad, now).is_err(),
                "input: {bad:?}"
            );
        }
    }

    // Regression: the convenience wrapper must resolve "HH:MM" against the
    // local clock, not UTC, or every reminder would be hours off.
    #[test]
    fn server_time_defaults_to_local_clock() {
        let target = Local::now() + Duration::minutes(30);
        let input = target.format("%H:%M").to_string();
        let result = parse_server_time_to_duration(&input).unwrap();
        assert!(
            result >= Duration::minutes(29) && result <= Duration::minutes(31),
            "expected ~30m, got {result}"
        );
    }
}
