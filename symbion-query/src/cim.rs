use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Parse a CIM datetime (`yyyymmddHHMMSS.ffffff±UUU`, offset in minutes) into UTC.
///
/// Returns `None` for anything that is not a fully specified datetime,
/// including the wildcard (`*`) forms used for intervals.
pub fn parse_cim_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.len() != 25 || !raw.is_ascii() {
        return None;
    }

    let digits = |range: std::ops::Range<usize>| -> Option<u32> {
        let part = &raw[range];
        if part.bytes().all(|b| b.is_ascii_digit()) {
            part.parse().ok()
        } else {
            None
        }
    };

    let year = digits(0..4)? as i32;
    let date = NaiveDate::from_ymd_opt(year, digits(4..6)?, digits(6..8)?)?;
    let local = date.and_hms_micro_opt(digits(8..10)?, digits(10..12)?, digits(12..14)?, digits(15..21)?)?;

    if &raw[14..15] != "." {
        return None;
    }
    let offset_minutes = i64::from(digits(22..25)?);
    let offset = match &raw[21..22] {
        "+" => Duration::minutes(offset_minutes),
        "-" => Duration::minutes(-offset_minutes),
        _ => return None,
    };

    Some((local - offset).and_utc())
}
