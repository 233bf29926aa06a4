use common::ByteOrder;
use serde::Deserialize;

fn default_data_extension() -> String {
    "dat".into()
}
fn default_index_extension() -> String {
    "idx".into()
}
fn default_segment_duration() -> u64 {
    600
}
fn default_total_duration() -> u64 {
    3600
}
fn default_index_interval_ms() -> u64 {
    100
}
fn default_prefetch_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    /// Defaults to the local hostname when left empty.
    #[serde(default)]
    pub folder: String,
    #[serde(default = "default_bufsiz")]
    pub bufsiz: usize,
}

fn default_bufsiz() -> usize {
    65536
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopRecConfig {
    pub name: String,
    pub dir: String,
    #[serde(default = "default_data_extension")]
    pub data_extension: String,
    #[serde(default = "default_index_extension")]
    pub index_extension: String,
    #[serde(default = "default_segment_duration")]
    pub segment_duration: u64,
    #[serde(default = "default_total_duration")]
    pub total_duration: u64,
    #[serde(default = "default_index_interval_ms")]
    pub index_interval: u64,
    #[serde(default)]
    pub index_endian: String,
    #[serde(default = "default_prefetch_ms")]
    pub prefetch: u64,
    /// Milliseconds of oldest-packet age the write queue tolerates
    /// before it's cleared and the writer closed; `0` disables queueing.
    #[serde(default)]
    pub queue: u64,
    #[serde(default)]
    pub queue_limit_min: Option<u64>,
    #[serde(default)]
    pub queue_limit_max: Option<u64>,
    pub s3: Option<S3Config>,
}

impl LoopRecConfig {
    /// Resolves overlapping extension names the way the original keeps
    /// the index file distinguishable from the data file: when both are
    /// configured identically, the index extension gets an `_idx` suffix.
    pub fn resolved_extensions(&self) -> (String, String) {
        if self.data_extension == self.index_extension {
            (self.data_extension.clone(), format!("{}_idx", self.index_extension))
        } else {
            (self.data_extension.clone(), self.index_extension.clone())
        }
    }

    pub fn segment_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.segment_duration.max(10) as i64)
    }

    pub fn total_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.total_duration.max(self.segment_duration.max(10)) as i64)
    }

    pub fn index_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.index_interval.max(1))
    }

    pub fn byte_order(&self) -> ByteOrder {
        let mut opts = common::OptionMap::new();
        opts.set("index_endian", self.index_endian.as_str());
        opts.get_byte_order("index_endian", ByteOrder::Native)
    }

    pub fn prefetch(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.prefetch)
    }

    /// `queue`, clamped to `[queue_limit_min, queue_limit_max]` where
    /// configured. `0` (queueing disabled) is left untouched — the
    /// clamps bound the age limit, not whether queueing is on.
    pub fn queue_ms(&self) -> u64 {
        if self.queue == 0 {
            return 0;
        }
        let mut value = self.queue;
        if let Some(min) = self.queue_limit_min {
            value = value.max(min);
        }
        if let Some(max) = self.queue_limit_max {
            value = value.min(max);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_extensions_get_disambiguated() {
        let cfg = LoopRecConfig {
            name: "x".into(),
            dir: "/tmp".into(),
            data_extension: "rec".into(),
            index_extension: "rec".into(),
            segment_duration: 600,
            total_duration: 3600,
            index_interval: 100,
            index_endian: String::new(),
            prefetch: 1000,
            queue: 0,
            queue_limit_min: None,
            queue_limit_max: None,
            s3: None,
        };
        let (data, index) = cfg.resolved_extensions();
        assert_eq!(data, "rec");
        assert_eq!(index, "rec_idx");
    }

    #[test]
    fn minimums_are_enforced() {
        let cfg = LoopRecConfig {
            name: "x".into(),
            dir: "/tmp".into(),
            data_extension: "dat".into(),
            index_extension: "idx".into(),
            segment_duration: 1,
            total_duration: 1,
            index_interval: 0,
            index_endian: String::new(),
            prefetch: 1000,
            queue: 0,
            queue_limit_min: None,
            queue_limit_max: None,
            s3: None,
        };
        assert_eq!(cfg.segment_duration(), chrono::Duration::seconds(10));
        assert_eq!(cfg.total_duration(), chrono::Duration::seconds(10));
        assert_eq!(cfg.index_interval(), std::time::Duration::from_millis(1));
    }
}
