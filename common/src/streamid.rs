//! Parsing of the SRT `streamid` handshake field.
//!
//! Grounded on `original_source/src/option.cpp`
//! (`StreamOption::ParseStreamId`) and `option.h`. Three forms are
//! accepted:
//!
//! 1. `#!::k=v,k=v,…` or its percent-encoded spelling `%23!::k=v,…`.
//! 2. `<resource>;k=v,k=v,…` — everything before the first `;` becomes
//!    the `r` key, percent-decoded.
//! 3. A bare `,`-separated / `=`-delimited key-value list.

use crate::option::OptionMap;

const STANDARD_PREFIX: &str = "#!::";
const STANDARD_PREFIX_ENCODED: &str = "%23!::";

/// A parsed streamid, backed by an [`OptionMap`].
#[derive(Debug, Clone, Default)]
pub struct StreamOption {
    map: OptionMap,
}

impl StreamOption {
    pub fn parse(streamid: &str) -> Self {
        let mut map = OptionMap::new();
        if let Some(rest) = streamid.strip_prefix(STANDARD_PREFIX) {
            parse_kv_list(rest, &mut map);
        } else if let Some(rest) = streamid.strip_prefix(STANDARD_PREFIX_ENCODED) {
            parse_kv_list(rest, &mut map);
        } else if let Some(pos) = streamid.find(';') {
            let (resource, rest) = streamid.split_at(pos);
            let rest = &rest[1..];
            map.set("r", percent_decode(resource));
            parse_kv_list(rest, &mut map);
        } else {
            parse_kv_list(streamid, &mut map);
        }
        StreamOption { map }
    }

    pub fn empty() -> Self {
        StreamOption { map: OptionMap::new() }
    }

    pub fn map(&self) -> &OptionMap {
        &self.map
    }

    pub fn resource_name(&self) -> String {
        self.map.get_str("r", "")
    }

    pub fn user_name(&self) -> String {
        self.map.get_str("u", "")
    }

    pub fn host_name(&self) -> String {
        self.map.get_str("h", "")
    }

    pub fn session_id(&self) -> String {
        self.map.get_str("s", "")
    }

    pub fn type_(&self) -> String {
        self.map.get_str("t", "")
    }

    pub fn mode(&self) -> String {
        self.map.get_str("m", "")
    }
}

fn parse_kv_list(s: &str, map: &mut OptionMap) {
    for pair in s.split(',') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((k, v)) => map.set(k, v),
            None => map.set(pair, ""),
        }
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_prefix() {
        let s = StreamOption::parse("#!::r=ch1,m=publish");
        assert_eq!(s.resource_name(), "ch1");
        assert_eq!(s.mode(), "publish");
    }

    #[test]
    fn parses_percent_encoded_prefix() {
        let s = StreamOption::parse("%23!::r=ch1,m=request");
        assert_eq!(s.resource_name(), "ch1");
        assert_eq!(s.mode(), "request");
    }

    #[test]
    fn parses_resource_semicolon_form() {
        let s = StreamOption::parse("ch%201;m=publish");
        assert_eq!(s.resource_name(), "ch 1");
        assert_eq!(s.mode(), "publish");
    }

    #[test]
    fn parses_bare_kv_list() {
        let s = StreamOption::parse("r=ch1,speed=2.0,at=now-10");
        assert_eq!(s.resource_name(), "ch1");
        assert_eq!(s.map().get_f64("speed", 1.0), 2.0);
        assert_eq!(s.map().get_str("at", ""), "now-10");
    }

    #[test]
    fn empty_streamid_has_no_resource() {
        let s = StreamOption::parse("");
        assert_eq!(s.resource_name(), "");
    }

    #[test]
    fn key_without_value_is_blank() {
        let s = StreamOption::parse("#!::flag,r=ch1");
        assert_eq!(s.map().get_str("flag", "x"), "");
    }
}
