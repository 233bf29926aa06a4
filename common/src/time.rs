//! Parsing of the playback `at` parameter, `speed`, and gap policy.
//!
//! Grounded on `original_source/src/looprec.cpp` (`LoopRec::GetStartedAt`
//! and the `Speed` wrapper).

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::error::CommonError;

const SPEED_EPSILON: f64 = 1e-6;

/// Parses the `at` playback parameter into a UTC instant.
///
/// Accepted forms, tried in order:
/// 1. `now-<seconds>` (integer or float) relative to `now`.
/// 2. ISO basic (`YYYYMMDDTHHMMSS[.ffffff]`) or extended
///    (`YYYY-MM-DDTHH:MM:SS[.ffffff]`), each with an optional trailing
///    timezone designator (`Z`/`z`, `±hh:mm`, `±hhmm`). A designator-less
///    value is interpreted as host-local time and converted to UTC.
pub fn parse_at(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CommonError> {
    if let Some(rest) = value.strip_prefix("now-") {
        let secs: f64 = rest
            .parse()
            .map_err(|_| CommonError::InvalidTime(value.to_owned()))?;
        return Ok(now - chrono::Duration::milliseconds((secs * 1000.0) as i64));
    }
    parse_timestamp(value)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CommonError> {
    let (body, tz) = split_timezone(value);

    let naive = parse_naive(body).ok_or_else(|| CommonError::InvalidTime(value.to_owned()))?;

    match tz {
        Some(TzDesignator::Utc) => Ok(Utc.from_utc_datetime(&naive)),
        Some(TzDesignator::Offset(offset_secs)) => {
            let shifted = naive - chrono::Duration::seconds(offset_secs);
            Ok(Utc.from_utc_datetime(&shifted))
        }
        None => {
            let local = Local
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| CommonError::InvalidTime(value.to_owned()))?;
            Ok(local.with_timezone(&Utc))
        }
    }
}

enum TzDesignator {
    Utc,
    /// Seconds to subtract from the naive fields to reach UTC (i.e. the
    /// UTC offset itself, positive east of UTC).
    Offset(i64),
}

fn split_timezone(value: &str) -> (&str, Option<TzDesignator>) {
    if let Some(body) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        return (body, Some(TzDesignator::Utc));
    }
    // Look for a trailing +hh:mm / -hh:mm / +hhmm / -hhmm, scanning from the
    // right so the date's own `-` separators (if extended form) aren't
    // mistaken for the offset sign. A valid trailing designator is 5 or 6
    // characters: sign + 2 digits [+ ':'] + 2 digits.
    let bytes = value.as_bytes();
    for &designator_len in &[6usize, 5usize] {
        if bytes.len() <= designator_len {
            continue;
        }
        let split_at = bytes.len() - designator_len;
        let sign = bytes[split_at];
        if sign != b'+' && sign != b'-' {
            continue;
        }
        let candidate = &value[split_at..];
        if let Some(offset) = parse_offset(candidate) {
            return (&value[..split_at], Some(TzDesignator::Offset(offset)));
        }
    }
    (value, None)
}

fn parse_offset(candidate: &str) -> Option<i64> {
    let sign: i64 = match candidate.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let rest = &candidate[1..];
    let (hh, mm) = if let Some((h, m)) = rest.split_once(':') {
        (h, m)
    } else if rest.len() == 4 {
        rest.split_at(2)
    } else {
        return None;
    };
    let hh: i64 = hh.parse().ok()?;
    let mm: i64 = mm.parse().ok()?;
    Some(sign * (hh * 3600 + mm * 60))
}

fn parse_naive(body: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y%m%dT%H%M%S%.f",
        "%Y%m%dT%H%M%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())
}

/// Playback speed, clamped to a minimum of `0.1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed(f64);

impl Speed {
    pub fn new(requested: f64) -> Self {
        Speed(requested.max(0.1))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_normal(self) -> bool {
        (self.0 - 1.0).abs() < SPEED_EPSILON
    }

    pub fn is_fast(self) -> bool {
        self.0 > 1.0 && !self.is_normal()
    }

    pub fn is_slow(self) -> bool {
        self.0 < 1.0 && !self.is_normal()
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed::new(1.0)
    }
}

/// Behaviour when the playback pacer hits a hole in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    Break,
    Skip,
    Wait,
}

impl GapPolicy {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "break" => GapPolicy::Break,
            "wait" => GapPolicy::Wait,
            _ => GapPolicy::Skip,
        }
    }
}

impl Default for GapPolicy {
    fn default() -> Self {
        GapPolicy::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_minus_seconds() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
        let at = parse_at("now-10", now).unwrap();
        assert_eq!(at, now - chrono::Duration::seconds(10));
    }

    #[test]
    fn now_minus_fractional_seconds() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
        let at = parse_at("now-1.5", now).unwrap();
        assert_eq!(at, now - chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn iso_basic_with_utc_designator() {
        let at = parse_at("20260726T120000Z", Utc::now()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap());
    }

    #[test]
    fn iso_extended_with_offset() {
        let at = parse_at("2026-07-26T14:00:00+02:00", Utc::now()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap());
    }

    #[test]
    fn iso_basic_with_compact_offset() {
        let at = parse_at("20260726T100000-0200", Utc::now()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap());
    }

    #[test]
    fn garbage_input_fails() {
        assert!(parse_at("now-banana", Utc::now()).is_err());
        assert!(parse_at("not-a-timestamp", Utc::now()).is_err());
    }

    #[test]
    fn speed_classification() {
        assert!(Speed::new(1.0).is_normal());
        assert!(Speed::new(2.0).is_fast());
        assert!(Speed::new(0.5).is_slow());
        assert!(Speed::new(0.001).value() >= 0.1);
    }

    #[test]
    fn gap_policy_defaults_to_skip() {
        assert_eq!(GapPolicy::parse("bogus"), GapPolicy::Skip);
        assert_eq!(GapPolicy::parse("BREAK"), GapPolicy::Break);
    }
}
