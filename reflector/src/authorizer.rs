use std::collections::BTreeMap;

use common::{OptionMap, SockAddr, StreamOption};
use serde::Serialize;
use tracing::warn;

/// Outcome of one authorizer consultation, cacheable by
/// [`crate::cache::AuthCache`].
#[derive(Debug, Clone)]
pub enum AuthResult {
    Allow(OptionMap),
    Deny,
}

/// Request body posted to an authorizer URI:
/// `{app, name, on, call, addr, streamid: {...}}`.
#[derive(Debug, Serialize)]
pub struct AuthRequest {
    pub app: String,
    pub name: String,
    pub on: String,
    pub call: String,
    pub addr: String,
    pub streamid: BTreeMap<String, String>,
}

impl AuthRequest {
    pub fn new(app: &str, name: &str, on: &str, call: &str, peer: &SockAddr, stream_option: &StreamOption) -> Self {
        let streamid = stream_option
            .map()
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        AuthRequest {
            app: app.to_owned(),
            name: name.to_owned(),
            on: on.to_owned(),
            call: call.to_owned(),
            addr: peer.address(),
            streamid,
        }
    }

    /// The `uri + ":" + serialized_body` cache fingerprint.
    pub fn cache_key(&self, uri: &str) -> String {
        let body = serde_json::to_string(self).unwrap_or_default();
        format!("{uri}:{body}")
    }
}

pub struct Authorizer {
    client: reqwest::Client,
}

impl Default for Authorizer {
    fn default() -> Self {
        Authorizer {
            client: reqwest::Client::new(),
        }
    }
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// POSTs `request` to `uri`. Any non-2xx response, or a transport
    /// failure, is treated as a denial (upstream errors are cached as
    /// denials for the cache TTL by the caller, to prevent retry
    /// storms).
    pub async fn perform(&self, uri: &str, request: &AuthRequest) -> AuthResult {
        let response = match self.client.post(uri).json(request).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(uri, error = %err, "authorizer unreachable");
                return AuthResult::Deny;
            }
        };
        if !response.status().is_success() {
            return AuthResult::Deny;
        }
        match response.json::<serde_json::Value>().await {
            Ok(value) => AuthResult::Allow(overrides_from_response(&value)),
            Err(_) => AuthResult::Allow(OptionMap::new()),
        }
    }
}

/// Accepts either a nested `{"option": {...}}` body or a flat object as
/// the override bag, since the two places in the spec describing this
/// response disagree on nesting — tolerate both.
fn overrides_from_response(value: &serde_json::Value) -> OptionMap {
    let object = value
        .get("option")
        .and_then(serde_json::Value::as_object)
        .or_else(|| value.as_object());

    let mut map = OptionMap::new();
    if let Some(object) = object {
        for (key, value) in object {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            map.set(key.clone(), rendered);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_prefer_nested_option_object() {
        let value: serde_json::Value = serde_json::json!({
            "option": {"latency": 200},
            "ignored": "field",
        });
        let map = overrides_from_response(&value);
        assert_eq!(map.get_str("latency", ""), "200");
        assert!(!map.has("ignored"));
    }

    #[test]
    fn overrides_fall_back_to_flat_object() {
        let value: serde_json::Value = serde_json::json!({"passphrase": "secret"});
        let map = overrides_from_response(&value);
        assert_eq!(map.get_str("passphrase", ""), "secret");
    }

    #[test]
    fn cache_key_is_stable_for_identical_requests() {
        let peer = SockAddr::new("203.0.113.1:1".parse().unwrap());
        let so = StreamOption::parse("r=ch1,m=publish");
        let a = AuthRequest::new("live", "ch1", "publish", "pre_accept", &peer, &so);
        let b = AuthRequest::new("live", "ch1", "publish", "pre_accept", &peer, &so);
        assert_eq!(a.cache_key("https://auth.example/hook"), b.cache_key("https://auth.example/hook"));
    }
}
