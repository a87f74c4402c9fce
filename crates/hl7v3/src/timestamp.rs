//! HL7 V3 `TS` timestamps.
//!
//! Accepted forms are `YYYYMMDD`, `YYYYMMDDHHMM` and `YYYYMMDDHHMMSS`, optionally followed by
//! fractional seconds and a `+HHMM` / `-HHMM` offset. Values without an offset are UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::{Hl7v3Error, Hl7v3Result};

/// Parse an HL7 V3 timestamp into a UTC instant.
///
/// # Errors
///
/// Returns [`Hl7v3Error::InvalidTimestamp`] if the value does not match one of the accepted
/// forms or names an impossible date or time.
pub fn parse_hl7_timestamp(value: &str) -> Hl7v3Result<DateTime<Utc>> {
    let invalid = || Hl7v3Error::InvalidTimestamp(value.to_owned());
    let value_trimmed = value.trim();

    let (body, offset) = split_offset(value_trimmed).ok_or_else(invalid)?;
    let (digits, fraction) = match body.split_once('.') {
        Some((digits, fraction)) => (digits, Some(fraction)),
        None => (body, None),
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.is_some_and(|f| f.is_empty() || !f.chars().all(|c| c.is_ascii_digit())) {
        return Err(invalid());
    }

    let field = |range: std::ops::Range<usize>| -> Hl7v3Result<u32> {
        digits
            .get(range)
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)
    };

    let (hour, minute, second) = match digits.len() {
        8 => (0, 0, 0),
        12 => (field(8..10)?, field(10..12)?, 0),
        14 => (field(8..10)?, field(10..12)?, field(12..14)?),
        _ => return Err(invalid()),
    };
    if fraction.is_some() && digits.len() != 14 {
        return Err(invalid());
    }

    let year = i32::try_from(field(0..4)?).map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?).ok_or_else(invalid)?;
    let nanos = match fraction {
        Some(f) => {
            let padded: String = f.chars().chain(std::iter::repeat('0')).take(9).collect();
            padded.parse::<u32>().map_err(|_| invalid())?
        }
        None => 0,
    };
    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or_else(invalid)?;
    let naive = NaiveDateTime::new(date, time);

    let instant = match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(invalid)?
            .with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    };
    Ok(instant)
}

/// Format a UTC instant as `YYYYMMDDHHMMSS`.
pub fn format_hl7_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H%M%S").to_string()
}

/// Split a trailing `±HHMM` offset from the value. Returns `None` if an offset is present but
/// malformed.
fn split_offset(value: &str) -> Option<(&str, Option<FixedOffset>)> {
    let Some(position) = value.find(['+', '-']) else {
        return Some((value, None));
    };
    let (body, offset) = value.split_at(position);
    let sign = if offset.starts_with('-') { -1 } else { 1 };
    let digits = &offset[1..];
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
    Some((body, Some(offset)))
}
