//! PDF date strings (`D:YYYYMMDDHHmmSS+HH'mm'`).

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Timelike};

/// Format a timestamp in the `D:` notation with its UTC offset.
pub fn format_pdf_date(dt: DateTime<Local>) -> String {
    let offset = dt.offset().local_minus_utc();
    let (sign, offset) = if offset < 0 { ('-', -offset) } else { ('+', offset) };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{}{:02}'{:02}'",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        sign,
        offset / 3600,
        offset % 3600 / 60,
    )
}

/// Parse a `D:` date. Trailing fields default as the notation allows;
/// returns `None` on anything unreadable.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let digits = text.strip_prefix("D:").unwrap_or(text);
    let take = |start: usize, len: usize, default: u32| -> Option<u32> {
        if digits.len() < start + len {
            return Some(default);
        }
        digits[start..start + len].parse().ok()
    };
    let year: i32 = digits.get(..4)?.parse().ok()?;
    let month = take(4, 2, 1)?;
    let day = take(6, 2, 1)?;
    let hour = take(8, 2, 0)?;
    let minute = take(10, 2, 0)?;
    let second = take(12, 2, 0)?;

    let offset_seconds = match digits.as_bytes().get(14) {
        Some(b'+') | Some(b'-') => {
            let sign = if digits.as_bytes()[14] == b'-' { -1 } else { 1 };
            let hours: i32 = digits.get(15..17)?.parse().ok()?;
            let minutes: i32 = digits
                .get(18..20)
                .and_then(|m| m.parse().ok())
                .unwrap_or(0);
            sign * (hours * 3600 + minutes * 60)
        }
        _ => 0,
    };
    FixedOffset::east_opt(offset_seconds)?
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_instant() {
        let now = Local::now();
        let formatted = format_pdf_date(now);
        assert!(formatted.starts_with("D:"));
        let parsed = parse_pdf_date(&formatted).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());
    }

    #[test]
    fn partial_dates_default() {
        let parsed = parse_pdf_date("D:2024").unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.hour(), 0);
    }

    #[test]
    fn explicit_offset() {
        let parsed = parse_pdf_date("D:20240615120000+02'00'").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_pdf_date("last tuesday").is_none());
    }
}
