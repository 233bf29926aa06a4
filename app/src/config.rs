//! Process-level configuration: JSON on disk, tolerant of a leading BOM,
//! `//`/`/* */` comments, and trailing commas before arrays/objects
//! close — the same ergonomics as the original's config reader, which
//! field operators routinely hand-edit.
//!
//! Follows the forwarder's raw/validated two-stage loading shape: a
//! `Raw*` struct mirrors the JSON exactly with every field optional,
//! then `Config::from_raw` fills defaults and builds the strongly
//! typed, pre-validated structures the rest of the app consumes.

use std::path::Path;

use common::{OptionMap, SockAddr};
use reflector::{EndpointConfig, HookConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(String),
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggerConfig {
    #[serde(default = "default_log_target")]
    pub target: String,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub max_files: Option<u32>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_target() -> String {
    "stdout".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Deserialize)]
struct RawReflect {
    #[serde(default = "default_app_name")]
    app: String,
    host: String,
    port: u16,
    #[serde(default)]
    backlog: Option<u32>,
    #[serde(default)]
    epolltimeo: Option<i64>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    option: OptionMap,
    #[serde(default)]
    publish: HookConfig,
    #[serde(default)]
    play: HookConfig,
    #[serde(default = "default_cache_age")]
    #[serde(rename = "cacheAge")]
    cache_age: u64,
    #[serde(default, rename = "loopRecs")]
    loop_recs: Vec<looprec::LoopRecConfig>,
}

fn default_app_name() -> String {
    "live".to_owned()
}

fn default_cache_age() -> u64 {
    10
}

/// One `reflects[]` entry, fully resolved: the endpoint configuration
/// the `reflector` crate understands, plus the loop recorders attached
/// to it.
pub struct ReflectEntry {
    pub endpoint: EndpointConfig,
    pub pre_bind_option: OptionMap,
    pub loop_recs: Vec<looprec::LoopRecConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    logger: LoggerConfig,
    #[serde(default)]
    srtloglevel: Option<String>,
    #[serde(default)]
    cainfo: Option<String>,
    #[serde(default)]
    reflects: Vec<RawReflect>,
}

fn default_name() -> String {
    "srt-live-reflect".to_owned()
}

pub struct Config {
    pub name: String,
    pub logger: LoggerConfig,
    pub srtloglevel: Option<String>,
    pub cainfo: Option<String>,
    pub reflects: Vec<ReflectEntry>,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw_text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::load_from_str(&raw_text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let cleaned = strip_json_comments_and_trailing_commas(text);
        let raw: RawConfig = serde_json::from_str(&cleaned).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut reflects = Vec::with_capacity(raw.reflects.len());
        for entry in raw.reflects {
            let addr = format!("{}:{}", entry.host, entry.port);
            let bind_addr: SockAddr = addr
                .parse::<std::net::SocketAddr>()
                .map(SockAddr::new)
                .map_err(|_| ConfigError::Invalid(format!("invalid host/port: {addr}")))?;

            let mut pre_bind_option = entry.option.clone();
            if let Some(backlog) = entry.backlog {
                pre_bind_option.set("backlog", backlog.to_string());
            }
            if let Some(epolltimeo) = entry.epolltimeo {
                pre_bind_option.set("epolltimeo", epolltimeo.to_string());
            }
            if let Some(uri) = &entry.uri {
                pre_bind_option.set("uri", uri.clone());
            }

            let endpoint = EndpointConfig {
                app: entry.app,
                bind_addr,
                option: entry.option,
                publish: entry.publish,
                play: entry.play,
                cache_age_secs: entry.cache_age,
            };

            reflects.push(ReflectEntry {
                endpoint,
                pre_bind_option,
                loop_recs: entry.loop_recs,
            });
        }

        Ok(Config {
            name: raw.name,
            logger: raw.logger,
            srtloglevel: raw.srtloglevel,
            cainfo: raw.cainfo,
            reflects,
        })
    }
}

/// Strips a leading UTF-8 BOM, `//` and `/* */` comments outside string
/// literals, and trailing commas before a closing `]`/`}` — the JSON5-ish
/// dialect operators hand-edit these config files in.
fn strip_json_comments_and_trailing_commas(input: &str) -> String {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    strip_trailing_commas(&out)
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if c == ',' {
            let mut lookahead = chars.clone();
            let mut saw_closer = false;
            while let Some(next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                } else {
                    saw_closer = matches!(next, ']' | '}');
                    break;
                }
            }
            if saw_closer {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_line_comments() {
        let input = "\u{feff}{\n  // a comment\n  \"name\": \"x\"\n}";
        let cleaned = strip_json_comments_and_trailing_commas(input);
        let value: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["name"], "x");
    }

    #[test]
    fn strips_block_comments_and_trailing_commas() {
        let input = "{ \"a\": 1, /* note */ \"b\": [1, 2,], }";
        let cleaned = strip_json_comments_and_trailing_commas(input);
        let value: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"][1], 2);
    }

    #[test]
    fn preserves_slashes_and_commas_inside_strings() {
        let input = r#"{ "path": "a/b, c//d" }"#;
        let cleaned = strip_json_comments_and_trailing_commas(input);
        let value: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["path"], "a/b, c//d");
    }

    #[test]
    fn loads_minimal_config() {
        let input = r#"{
            "name": "edge1",
            "reflects": [
                { "host": "0.0.0.0", "port": 9000, "uri": "#!::r=live" }
            ]
        }"#;
        let config = Config::load_from_str(input).unwrap();
        assert_eq!(config.name, "edge1");
        assert_eq!(config.reflects.len(), 1);
        assert_eq!(config.reflects[0].endpoint.cache_age_secs, 10);
    }
}
