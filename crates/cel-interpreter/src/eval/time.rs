//! Timestamp and duration parsing, formatting, and calendar access.

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Timelike};
use chrono_tz::Tz;

use super::value::{Duration, Timestamp};

/// Parse an RFC 3339 timestamp string.
///
/// Supports formats like:
/// - "2009-02-13T23:31:30Z"
/// - "2009-02-13T23:31:30.123456789Z"
/// - "2009-02-13T23:31:30+01:00"
pub fn parse_timestamp(s: &str) -> Result<Timestamp, String> {
    let dt = DateTime::parse_from_rfc3339(s)
        .map_err(|e| format!("invalid timestamp format: {}", e))?;

    let ts = Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    };

    if !ts.is_valid() {
        return Err("timestamp out of range: must be between year 0001 and 9999".to_string());
    }

    Ok(ts)
}

/// Parse a CEL duration string.
///
/// Supports compound values with `h`, `m`, `s`, `ms`, `us`, and `ns`
/// units, fractional magnitudes, and a leading sign: "100s", "1.5h",
/// "1h30m45s", "-30s".
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    if s.is_empty() {
        return Err("invalid duration: no value".to_string());
    }

    let mut total_nanos: i128 = 0;
    let mut remaining = s;

    while !remaining.is_empty() {
        let num_end = remaining
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(remaining.len());

        if num_end == 0 {
            return Err(format!(
                "invalid duration format: expected number at '{}'",
                remaining
            ));
        }

        let num_str = &remaining[..num_end];
        remaining = &remaining[num_end..];

        let unit_end = remaining
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(remaining.len());

        if unit_end == 0 {
            return Err(format!("invalid duration: missing unit after '{}'", num_str));
        }

        let unit = &remaining[..unit_end];
        remaining = &remaining[unit_end..];

        let multiplier: i128 = match unit {
            "h" => 3_600_000_000_000,
            "m" => 60_000_000_000,
            "s" => 1_000_000_000,
            "ms" => 1_000_000,
            "us" | "\u{00b5}s" => 1_000,
            "ns" => 1,
            _ => return Err(format!("invalid duration unit: '{}'", unit)),
        };

        if num_str.contains('.') {
            let num: f64 = num_str
                .parse()
                .map_err(|_| format!("invalid number in duration: '{}'", num_str))?;
            total_nanos += (num * multiplier as f64) as i128;
        } else {
            let num: i128 = num_str
                .parse()
                .map_err(|_| format!("invalid number in duration: '{}'", num_str))?;
            total_nanos += num * multiplier;
        }
    }

    if negative {
        total_nanos = -total_nanos;
    }

    let duration = Duration::new(
        (total_nanos / 1_000_000_000) as i64,
        (total_nanos % 1_000_000_000) as i32,
    );

    if !duration.is_valid() {
        return Err(
            "duration out of range: must be within approximately 10000 years".to_string(),
        );
    }

    Ok(duration)
}

/// Format a timestamp as an RFC 3339 string with nanosecond precision,
/// trailing zeros trimmed.
pub fn format_timestamp(ts: &Timestamp) -> String {
    if let Some(dt) = ts.to_datetime_utc() {
        if ts.nanos == 0 {
            dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
        } else {
            let nanos_str = format!("{:09}", ts.nanos);
            let trimmed = nanos_str.trim_end_matches('0');
            if trimmed.is_empty() {
                dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            } else {
                format!("{}.{}Z", dt.format("%Y-%m-%dT%H:%M:%S"), trimmed)
            }
        }
    } else {
        format!("{}s", ts.seconds)
    }
}

/// Format a duration as seconds with an optional fractional part.
pub fn format_duration(d: &Duration) -> String {
    if d.nanos == 0 {
        format!("{}s", d.seconds)
    } else {
        let total_nanos = d.seconds as i128 * 1_000_000_000 + d.nanos as i128;
        let sign = if total_nanos < 0 { "-" } else { "" };
        let abs_nanos = total_nanos.abs();
        let secs = abs_nanos / 1_000_000_000;
        let frac = abs_nanos % 1_000_000_000;

        if frac == 0 {
            format!("{}{}s", sign, secs)
        } else {
            let frac_str = format!("{:09}", frac);
            let trimmed = frac_str.trim_end_matches('0');
            format!("{}{}.{}s", sign, secs, trimmed)
        }
    }
}

/// Parse a timezone string: IANA names ("America/New_York") or fixed UTC
/// offsets ("+01:00", "-05:30", "02:00").
pub fn parse_timezone(tz: &str) -> Result<TimezoneInfo, String> {
    if let Ok(tz_parsed) = tz.parse::<Tz>() {
        return Ok(TimezoneInfo::Iana(tz_parsed));
    }
    parse_fixed_offset(tz).map(TimezoneInfo::Fixed)
}

fn parse_fixed_offset(s: &str) -> Result<FixedOffset, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("empty timezone string".to_string());
    }

    let (negative, rest) = if let Some(r) = s.strip_prefix('-') {
        (true, r)
    } else if let Some(r) = s.strip_prefix('+') {
        (false, r)
    } else {
        (false, s)
    };

    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() != 2 {
        return Err(format!("invalid timezone offset format: '{}'", s));
    }

    let hours: i32 = parts[0]
        .parse()
        .map_err(|_| format!("invalid hours in timezone: '{}'", parts[0]))?;
    let minutes: i32 = parts[1]
        .parse()
        .map_err(|_| format!("invalid minutes in timezone: '{}'", parts[1]))?;

    let total_seconds = (hours * 3600 + minutes * 60) * if negative { -1 } else { 1 };

    FixedOffset::east_opt(total_seconds)
        .ok_or_else(|| format!("timezone offset out of range: '{}'", s))
}

/// Either an IANA timezone or a fixed offset.
pub enum TimezoneInfo {
    Iana(Tz),
    Fixed(FixedOffset),
}

impl TimezoneInfo {
    /// Convert a UTC timestamp to a DateTime in this timezone.
    pub fn datetime_from_timestamp(&self, ts: &Timestamp) -> Option<DateTime<FixedOffset>> {
        let utc_dt = ts.to_datetime_utc()?;

        match self {
            TimezoneInfo::Iana(tz) => {
                let local = utc_dt.with_timezone(tz);
                let offset = local.offset().fix();
                Some(local.with_timezone(&offset))
            }
            TimezoneInfo::Fixed(offset) => Some(utc_dt.with_timezone(offset)),
        }
    }
}

/// A calendar component of a timestamp, per the accessor functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampComponent {
    /// Full 4-digit year.
    FullYear,
    /// Month (0-11, 0 = January).
    Month,
    /// Day of month (1-31, 1-indexed).
    Date,
    /// Day of month (0-30, 0-indexed).
    DayOfMonth,
    /// Day of week (0-6, 0 = Sunday).
    DayOfWeek,
    /// Day of year (0-365).
    DayOfYear,
    /// Hours (0-23).
    Hours,
    /// Minutes (0-59).
    Minutes,
    /// Seconds (0-59).
    Seconds,
    /// Milliseconds (0-999).
    Milliseconds,
}

impl TimestampComponent {
    /// Extract the component value from a DateTime.
    pub fn extract<Tz2: TimeZone>(&self, dt: &DateTime<Tz2>) -> i64 {
        match self {
            TimestampComponent::FullYear => dt.year() as i64,
            TimestampComponent::Month => dt.month0() as i64,
            TimestampComponent::Date => dt.day() as i64,
            TimestampComponent::DayOfMonth => (dt.day() - 1) as i64,
            TimestampComponent::DayOfWeek => dt.weekday().num_days_from_sunday() as i64,
            TimestampComponent::DayOfYear => dt.ordinal0() as i64,
            TimestampComponent::Hours => dt.hour() as i64,
            TimestampComponent::Minutes => dt.minute() as i64,
            TimestampComponent::Seconds => dt.second() as i64,
            TimestampComponent::Milliseconds => (dt.nanosecond() / 1_000_000) as i64,
        }
    }

    /// Accessor function name, for error messages.
    pub fn function_name(&self) -> &'static str {
        match self {
            TimestampComponent::FullYear => "getFullYear",
            TimestampComponent::Month => "getMonth",
            TimestampComponent::Date => "getDate",
            TimestampComponent::DayOfMonth => "getDayOfMonth",
            TimestampComponent::DayOfWeek => "getDayOfWeek",
            TimestampComponent::DayOfYear => "getDayOfYear",
            TimestampComponent::Hours => "getHours",
            TimestampComponent::Minutes => "getMinutes",
            TimestampComponent::Seconds => "getSeconds",
            TimestampComponent::Milliseconds => "getMilliseconds",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_basic() {
        let ts = parse_timestamp("2009-02-13T23:31:30Z").unwrap();
        assert_eq!(ts.seconds, 1234567890);
        assert_eq!(ts.nanos, 0);
    }

    #[test]
    fn test_parse_timestamp_with_nanos() {
        let ts = parse_timestamp("2009-02-13T23:31:30.123456789Z").unwrap();
        assert_eq!(ts.seconds, 1234567890);
        assert_eq!(ts.nanos, 123456789);
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let ts = parse_timestamp("2009-02-13T18:31:30-05:00").unwrap();
        assert_eq!(ts.seconds, 1234567890);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("123").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("100s").unwrap(), Duration::new(100, 0));
        assert_eq!(parse_duration("2h").unwrap(), Duration::new(7200, 0));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::new(5400, 0));
        assert_eq!(parse_duration("-30s").unwrap(), Duration::new(-30, 0));
        assert_eq!(
            parse_duration("500ms").unwrap(),
            Duration::new(0, 500_000_000)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::new(5400, 0));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("12hh3").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(&Timestamp::new(1234567890, 0)),
            "2009-02-13T23:31:30Z"
        );
        assert_eq!(
            format_timestamp(&Timestamp::new(1234567890, 123000000)),
            "2009-02-13T23:31:30.123Z"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::new(100, 0)), "100s");
        assert_eq!(format_duration(&Duration::new(1, 500000000)), "1.5s");
    }

    #[test]
    fn test_parse_timezone() {
        assert!(matches!(
            parse_timezone("America/New_York").unwrap(),
            TimezoneInfo::Iana(_)
        ));
        assert!(matches!(
            parse_timezone("+05:30").unwrap(),
            TimezoneInfo::Fixed(_)
        ));
        assert!(matches!(
            parse_timezone("05:30").unwrap(),
            TimezoneInfo::Fixed(_)
        ));
        assert!(parse_timezone("not/a/zone//").is_err());
    }

    #[test]
    fn test_component_extract() {
        let ts = Timestamp::new(1234567890, 0);
        let dt = ts.to_datetime_utc().unwrap();

        assert_eq!(TimestampComponent::FullYear.extract(&dt), 2009);
        assert_eq!(TimestampComponent::Month.extract(&dt), 1);
        assert_eq!(TimestampComponent::Date.extract(&dt), 13);
        assert_eq!(TimestampComponent::DayOfMonth.extract(&dt), 12);
        // 2009-02-13 was a Friday.
        assert_eq!(TimestampComponent::DayOfWeek.extract(&dt), 5);
        assert_eq!(TimestampComponent::Hours.extract(&dt), 23);
        assert_eq!(TimestampComponent::Minutes.extract(&dt), 31);
        assert_eq!(TimestampComponent::Seconds.extract(&dt), 30);
    }
}
