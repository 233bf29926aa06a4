use common::{glob, SockAddr};
use serde::Deserialize;

use crate::error::ReflectorError;

/// One ordered entry of a `publish.access[]` / `play.access[]` list.
/// `name` is a glob against the resource name; `allow`/`deny` match
/// either the literal `*`/`all` or a CIDR condition against the peer
/// address.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessEntry {
    pub name: String,
    #[serde(default)]
    pub allow: Option<String>,
    #[serde(default)]
    pub deny: Option<String>,
}

/// Evaluates an access list against a resource name and peer address.
/// Mirrors `Reflect::AccessCheck`: a `name` mismatch skips the entry
/// entirely; `deny` short-circuits to `false`; `allow` short-circuits
/// to `true`; running off the end default-allows.
pub fn check(
    entries: &[AccessEntry],
    resource: &str,
    peer: &SockAddr,
) -> Result<bool, ReflectorError> {
    for entry in entries {
        if !glob::pattern_match(&entry.name, resource)? {
            continue;
        }
        if let Some(deny) = &entry.deny {
            if matches_condition(deny, peer)? {
                return Ok(false);
            }
        }
        if let Some(allow) = &entry.allow {
            if matches_condition(allow, peer)? {
                return Ok(true);
            }
        }
    }
    Ok(true)
}

fn matches_condition(condition: &str, peer: &SockAddr) -> Result<bool, ReflectorError> {
    let lowered = condition.to_ascii_lowercase();
    if lowered == "*" || lowered == "all" {
        return Ok(true);
    }
    Ok(peer.matches(condition)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SockAddr {
        SockAddr::new(s.parse().unwrap())
    }

    #[test]
    fn deny_short_circuits_regardless_of_later_allow() {
        let entries = vec![
            AccessEntry {
                name: "*".into(),
                allow: None,
                deny: Some("10.0.0.0/8".into()),
            },
            AccessEntry {
                name: "*".into(),
                allow: Some("*".into()),
                deny: None,
            },
        ];
        assert!(!check(&entries, "ch1", &addr("10.1.2.3:5000")).unwrap());
    }

    #[test]
    fn non_matching_name_is_skipped_not_denied() {
        let entries = vec![AccessEntry {
            name: "private-*".into(),
            allow: None,
            deny: Some("*".into()),
        }];
        assert!(check(&entries, "public-ch", &addr("203.0.113.1:1")).unwrap());
    }

    #[test]
    fn empty_list_default_allows() {
        assert!(check(&[], "ch1", &addr("203.0.113.1:1")).unwrap());
    }

    #[test]
    fn allow_all_literal_short_circuits() {
        let entries = vec![AccessEntry {
            name: "*".into(),
            allow: Some("all".into()),
            deny: None,
        }];
        assert!(check(&entries, "ch1", &addr("198.51.100.2:1")).unwrap());
    }
}
