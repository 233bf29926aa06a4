use std::time::Duration;

use common::{OptionMap, SockAddr};
use serde::Deserialize;

use crate::access::AccessEntry;

fn default_cache_age() -> u64 {
    10
}

/// Configuration for one `publish` or `play` hook: option overrides, the
/// access list, and the two authorizer URIs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub option: OptionMap,
    #[serde(default)]
    pub access: Vec<AccessEntry>,
    #[serde(default)]
    pub on_pre_accept: Option<String>,
    #[serde(default)]
    pub on_accept: Option<String>,
    /// Seconds between statistics log lines; `0` disables. Only
    /// meaningful on the `publish` side.
    #[serde(default)]
    pub stats: u64,
}

/// One `reflects[]` entry: a bound endpoint plus its publish/play policy.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_app")]
    pub app: String,
    pub bind_addr: SockAddr,
    #[serde(default)]
    pub option: OptionMap,
    #[serde(default)]
    pub publish: HookConfig,
    #[serde(default)]
    pub play: HookConfig,
    #[serde(default = "default_cache_age")]
    pub cache_age_secs: u64,
}

impl EndpointConfig {
    pub fn cache_age(&self) -> Duration {
        Duration::from_secs(self.cache_age_secs)
    }
}

fn default_app() -> String {
    "live".to_owned()
}
