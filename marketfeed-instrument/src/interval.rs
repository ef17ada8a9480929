//! Candle interval canonicalization and millisecond-duration math.
//!
//! Canonical form is a lowercase `{count}{unit}` string where `unit` is one
//! of `m` (minute), `h` (hour), `d` (day), `w` (week), plus the special
//! calendar-month unit written with an uppercase `M` (eg/ `"1M"`).

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 3_600_000;
const DAY_MS: u64 = 86_400_000;
const WEEK_MS: u64 = 604_800_000;
/// 30-day calendar-month approximation, per spec.
const MONTH_MS: u64 = 2_592_000_000;

const DEFAULT_MS: u64 = HOUR_MS;

/// Convert a canonical interval string to its millisecond duration.
///
/// Unknown or malformed input defaults to one hour, matching the documented
/// fallback for unrecognised candle intervals.
pub fn interval_to_ms(interval: &str) -> u64 {
    let digit_count = interval.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_count == 0 || digit_count == interval.len() {
        return DEFAULT_MS;
    }

    let (count, unit) = interval.split_at(digit_count);
    let Ok(count) = count.parse::<u64>() else {
        return DEFAULT_MS;
    };

    let unit_ms = match unit {
        "m" => MINUTE_MS,
        "h" => HOUR_MS,
        "d" => DAY_MS,
        "w" => WEEK_MS,
        "M" => MONTH_MS,
        _ => return DEFAULT_MS,
    };

    count * unit_ms
}

/// Canonicalize Upbit/Bybit's numeric-minutes-or-letter rendering
/// (`"1"`, `"5"`, `"60"`, `"D"`, `"W"`, `"M"`) into canonical form.
pub fn from_upbit_or_bybit(raw: &str) -> Option<String> {
    match raw {
        "D" => Some("1d".to_string()),
        "W" => Some("1w".to_string()),
        "M" => Some("1M".to_string()),
        minutes if minutes.chars().all(|c| c.is_ascii_digit()) && !minutes.is_empty() => {
            Some(format!("{minutes}m"))
        }
        _ => None,
    }
}

/// Canonicalize Huobi's `"1min"`, `"60min"`, `"4hour"`, `"1day"`, `"1week"`,
/// `"1mon"` rendering into canonical form.
pub fn from_huobi(raw: &str) -> Option<String> {
    for (suffix, unit) in [("min", "m"), ("hour", "h"), ("day", "d"), ("week", "w"), ("mon", "M")] {
        if let Some(count) = raw.strip_suffix(suffix) {
            if !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()) {
                return Some(format!("{count}{unit}"));
            }
        }
    }
    None
}

/// Canonicalize Bittrex's `"MINUTE_1"`, `"HOUR_1"`, `"DAY_1"` rendering into
/// canonical form.
pub fn from_bittrex(raw: &str) -> Option<String> {
    let (prefix, count) = raw.split_once('_')?;
    let unit = match prefix {
        "MINUTE" => "m",
        "HOUR" => "h",
        "DAY" => "d",
        _ => return None,
    };
    count.chars().all(|c| c.is_ascii_digit()).then(|| format!("{count}{unit}"))
}

/// Canonicalize Crypto.com's upper-case `"1M"`/`"1H"`/`"1D"`/`"7D"`
/// rendering (note: Crypto.com's `M` means minute, unlike canonical form's
/// month `M`) into canonical form.
pub fn from_cryptocom(raw: &str) -> Option<String> {
    let digit_count = raw.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_count == 0 || digit_count == raw.len() {
        return None;
    }
    let (count, unit) = raw.split_at(digit_count);
    let canonical_unit = match unit {
        "M" => "m",
        "H" => "h",
        "D" => "d",
        _ => return None,
    };
    Some(format!("{count}{canonical_unit}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_to_ms_minute() {
        assert_eq!(interval_to_ms("1m"), 60_000);
    }

    #[test]
    fn test_interval_to_ms_hour() {
        assert_eq!(interval_to_ms("1h"), 3_600_000);
    }

    #[test]
    fn test_interval_to_ms_day() {
        assert_eq!(interval_to_ms("1d"), 86_400_000);
    }

    #[test]
    fn test_interval_to_ms_week() {
        assert_eq!(interval_to_ms("1w"), 604_800_000);
    }

    #[test]
    fn test_interval_to_ms_thirty_days() {
        assert_eq!(interval_to_ms("30d"), 2_592_000_000);
    }

    #[test]
    fn test_interval_to_ms_unknown_defaults_to_hour() {
        assert_eq!(interval_to_ms("unknown"), 3_600_000);
    }

    #[test]
    fn test_from_upbit_or_bybit() {
        assert_eq!(from_upbit_or_bybit("1").as_deref(), Some("1m"));
        assert_eq!(from_upbit_or_bybit("60").as_deref(), Some("60m"));
        assert_eq!(from_upbit_or_bybit("D").as_deref(), Some("1d"));
        assert_eq!(from_upbit_or_bybit("W").as_deref(), Some("1w"));
        assert_eq!(from_upbit_or_bybit("M").as_deref(), Some("1M"));
    }

    #[test]
    fn test_from_huobi() {
        assert_eq!(from_huobi("1min").as_deref(), Some("1m"));
        assert_eq!(from_huobi("60min").as_deref(), Some("60m"));
        assert_eq!(from_huobi("4hour").as_deref(), Some("4h"));
        assert_eq!(from_huobi("1day").as_deref(), Some("1d"));
        assert_eq!(from_huobi("1week").as_deref(), Some("1w"));
        assert_eq!(from_huobi("1mon").as_deref(), Some("1M"));
    }

    #[test]
    fn test_from_bittrex() {
        assert_eq!(from_bittrex("MINUTE_1").as_deref(), Some("1m"));
        assert_eq!(from_bittrex("HOUR_1").as_deref(), Some("1h"));
        assert_eq!(from_bittrex("DAY_1").as_deref(), Some("1d"));
    }

    #[test]
    fn test_from_cryptocom() {
        assert_eq!(from_cryptocom("1M").as_deref(), Some("1m"));
        assert_eq!(from_cryptocom("1H").as_deref(), Some("1h"));
        assert_eq!(from_cryptocom("1D").as_deref(), Some("1d"));
        assert_eq!(from_cryptocom("7D").as_deref(), Some("7d"));
    }
}
