use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};

/// One captured recording window: a (data, index) file pair, optionally
/// mirrored to object storage. `continuous` marks a segment opened by
/// rotation (not by a fresh disconnect/reconnect) from its predecessor.
pub struct Segment {
    pub t0: DateTime<Utc>,
    pub continuous: bool,
    pub dir: PathBuf,
    pub data_ext: String,
    pub index_ext: String,
    pushed: AtomicBool,
    expired: AtomicBool,
    remote_keys: Mutex<Option<(String, String)>>,
}

impl Segment {
    pub fn new(dir: PathBuf, t0: DateTime<Utc>, continuous: bool, data_ext: String, index_ext: String) -> Self {
        Segment {
            t0,
            continuous,
            dir,
            data_ext,
            index_ext,
            pushed: AtomicBool::new(false),
            expired: AtomicBool::new(false),
            remote_keys: Mutex::new(None),
        }
    }

    pub fn stem(&self) -> String {
        format_stem(self.t0, self.continuous)
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem(), self.data_ext))
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem(), self.index_ext))
    }

    pub fn is_pushed(&self) -> bool {
        self.pushed.load(Ordering::Acquire)
    }

    pub fn mark_pushed(&self, data_key: String, index_key: String) {
        self.pushed.store(true, Ordering::Release);
        *self.remote_keys.lock().expect("lock poisoned") = Some((data_key, index_key));
    }

    pub fn remote_keys(&self) -> Option<(String, String)> {
        self.remote_keys.lock().expect("lock poisoned").clone()
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    pub fn mark_expired(&self) {
        self.expired.store(true, Ordering::Release);
    }

    /// `now - (total_duration + segment_duration) ... now` is the
    /// retention window; preserved exactly, including the one-segment
    /// grace period.
    pub fn is_retention_expired(&self, now: DateTime<Utc>, total_duration: chrono::Duration, segment_duration: chrono::Duration) -> bool {
        self.t0 + total_duration + segment_duration < now
    }
}

/// `<ISO-compact-UTC>Z[=]` — the `=` suffix marks a continuous
/// successor of the previous segment.
pub fn format_stem(t0: DateTime<Utc>, continuous: bool) -> String {
    let base = t0.format("%Y%m%dT%H%M%S%.6f").to_string();
    let suffix = if continuous { "Z=" } else { "Z" };
    format!("{base}{suffix}")
}

/// Parses a filename stem (without extension) back into `(t0, continuous)`.
/// Returns `None` for anything that doesn't match the expected shape.
pub fn parse_stem(stem: &str) -> Option<(DateTime<Utc>, bool)> {
    let (body, continuous) = match stem.strip_suffix("Z=") {
        Some(body) => (body, true),
        None => (stem.strip_suffix('Z')?, false),
    };
    let naive = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S%.f").ok()?;
    Some((DateTime::from_naive_utc_and_offset(naive, Utc), continuous))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_round_trips_through_parse() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-15T10:30:00.500000Z")
            .unwrap()
            .with_timezone(&Utc);
        let stem = format_stem(t0, true);
        let (parsed_t0, continuous) = parse_stem(&stem).unwrap();
        assert_eq!(parsed_t0, t0);
        assert!(continuous);
    }

    #[test]
    fn non_continuous_stem_has_no_equals_suffix() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let stem = format_stem(t0, false);
        assert!(stem.ends_with('Z'));
        assert!(!stem.ends_with("Z="));
        let (_, continuous) = parse_stem(&stem).unwrap();
        assert!(!continuous);
    }

    #[test]
    fn garbage_stem_fails_to_parse() {
        assert!(parse_stem("not-a-timestamp").is_none());
    }

    #[test]
    fn retention_boundary_includes_one_segment_grace_period() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let segment = Segment::new(PathBuf::from("/tmp"), t0, false, "dat".into(), "idx".into());
        let total = chrono::Duration::seconds(3600);
        let seg_dur = chrono::Duration::seconds(600);

        let just_inside = t0 + total + seg_dur - chrono::Duration::seconds(1);
        assert!(!segment.is_retention_expired(just_inside, total, seg_dur));

        let just_outside = t0 + total + seg_dur + chrono::Duration::seconds(1);
        assert!(segment.is_retention_expired(just_outside, total, seg_dur));
    }
}
