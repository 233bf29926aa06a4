//! Ordered key/value option store with typed, defaulted accessors.
//!
//! Re-expresses the templated coerced getters over a string map from the
//! original implementation (`URIOption::Get<T>`) as a small typed API:
//! `get_bool`, `get_i64`, `get_f64`, `get_str`, `get_duration_ms`, and
//! `get_byte_order`, each taking an explicit default and able to
//! distinguish "key absent" from "key present but blank".

use std::fmt;
use std::time::Duration;

/// Byte order for on-disk index records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Native,
    Big,
    Little,
}

impl ByteOrder {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Some(ByteOrder::Native),
            "big" => Some(ByteOrder::Big),
            "little" => Some(ByteOrder::Little),
            _ => None,
        }
    }

    pub fn to_be(self, v: i64) -> [u8; 8] {
        match self {
            ByteOrder::Big => v.to_be_bytes(),
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Native => v.to_ne_bytes(),
        }
    }

    pub fn from_bytes(self, buf: [u8; 8]) -> i64 {
        match self {
            ByteOrder::Big => i64::from_be_bytes(buf),
            ByteOrder::Little => i64::from_le_bytes(buf),
            ByteOrder::Native => i64::from_ne_bytes(buf),
        }
    }
}

/// An ordered, case-insensitive-keyed string map.
///
/// Order of insertion is preserved (mirrors iteration order used when
/// serializing a streamid or an authorizer request body); lookups are
/// case-insensitive on the key, matching SRT's documented streamid key
/// handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: Vec<(String, String)>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(entry) = self.find_mut(&key) {
            entry.1 = value.into();
        } else {
            self.entries.push((key, value.into()));
        }
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut (String, String)> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `default` when the key is absent; returns the parsed value,
    /// or `blank_default` when the value is present but an empty string —
    /// matching `Get<std::string>(key, "", "")`'s two-default signature
    /// used for streamid fields such as `ResourceName`.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or(default).to_owned()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            None => default,
            Some(v) => matches!(v, "1" | "true" | "on" | "yes"),
        }
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.raw(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.raw(key)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(default)
    }

    pub fn get_duration_ms(&self, key: &str, default_ms: u64) -> Duration {
        Duration::from_millis(self.get_i64(key, default_ms as i64).max(0) as u64)
    }

    pub fn get_byte_order(&self, key: &str, default: ByteOrder) -> ByteOrder {
        self.raw(key)
            .and_then(ByteOrder::parse)
            .unwrap_or(default)
    }

    /// Renders the map as `key1=val1<sep>key2=val2…` using `kv_sep` between
    /// key and value and `entry_sep` between entries — mirrors
    /// `URIOption::operator()(entry_sep, kv_sep)` used for log lines.
    pub fn render(&self, entry_sep: char, kv_sep: char) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}{kv_sep}{v}"))
            .collect::<Vec<_>>()
            .join(&entry_sep.to_string())
    }
}

impl fmt::Display for OptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(',', '='))
    }
}

/// Accepts a JSON object whose values may be strings, numbers, bools, or
/// null; each is rendered to its string form the way a config-file
/// option map is meant to be read (e.g. `"latency": 200` and
/// `"latency": "200"` are equivalent).
impl<'de> serde::Deserialize<'de> for OptionMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: serde_json::Map<String, serde_json::Value> =
            serde::Deserialize::deserialize(deserializer)?;
        let mut map = OptionMap::new();
        for (key, value) in raw {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            map.set(key, rendered);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut m = OptionMap::new();
        m.set("Host", "example.com");
        assert_eq!(m.get_str("host", ""), "example.com");
        assert_eq!(m.get_str("HOST", ""), "example.com");
    }

    #[test]
    fn missing_vs_blank_defaults() {
        let mut m = OptionMap::new();
        m.set("r", "");
        assert_eq!(m.get_str("r", "fallback"), "");
        assert_eq!(m.get_str("missing", "fallback"), "fallback");
    }

    #[test]
    fn bool_coercion() {
        let mut m = OptionMap::new();
        m.set("rcvsyn", "1");
        assert!(m.get_bool("rcvsyn", false));
        m.set("rcvsyn", "0");
        assert!(!m.get_bool("rcvsyn", true));
    }

    #[test]
    fn byte_order_round_trips() {
        let be = ByteOrder::Big;
        let bytes = be.to_be(42);
        assert_eq!(be.from_bytes(bytes), 42);
    }

    #[test]
    fn set_overwrites_existing_key_in_place() {
        let mut m = OptionMap::new();
        m.set("a", "1");
        m.set("b", "2");
        m.set("a", "3");
        assert_eq!(m.len(), 2);
        assert_eq!(m.get_str("a", ""), "3");
    }
}
