//! Peer address wrapper with CIDR-style matching and IPv4-mapped-IPv6
//! collapse.
//!
//! Grounded on `original_source/src/sockaddr.cpp` (`SockAddr::Match`,
//! `SockAddr::ConvertV4MappedV6ToV4`). This is deliberately distinct from
//! the glob-style resource-name matcher in [`crate::glob`] — addresses
//! match by CIDR prefix, resource names match by wildcard pattern.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::CommonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(into = "String")]
pub struct SockAddr(SocketAddr);

impl From<SockAddr> for String {
    fn from(addr: SockAddr) -> Self {
        addr.to_display_string()
    }
}

impl<'de> serde::Deserialize<'de> for SockAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<SocketAddr>()
            .map(SockAddr)
            .map_err(serde::de::Error::custom)
    }
}

impl SockAddr {
    pub fn new(addr: SocketAddr) -> Self {
        SockAddr(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn to_display_string(&self) -> String {
        match self.0.ip() {
            IpAddr::V6(_) => format!("[{}]:{}", self.0.ip(), self.0.port()),
            IpAddr::V4(_) => format!("{}:{}", self.0.ip(), self.0.port()),
        }
    }

    /// Numeric address only, no port — used as the `addr` field of the
    /// authorizer request body.
    pub fn address(&self) -> String {
        self.0.ip().to_string()
    }

    /// Collapses an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) down to the
    /// plain IPv4 form. Returns `true` if a conversion happened.
    pub fn convert_v4_mapped_v6_to_v4(&mut self) -> bool {
        if let IpAddr::V6(v6) = self.0.ip() {
            if let Some(v4) = v6.to_ipv4_mapped() {
                self.0.set_ip(IpAddr::V4(v4));
                return true;
            }
        }
        false
    }

    /// CIDR-style match: `condition` is `addr` or `addr/prefixlen`.
    /// Matching fails outright when address families differ, mirroring
    /// `SockAddr::Match`.
    pub fn matches(&self, condition: &str) -> Result<bool, CommonError> {
        let (addr_str, prefix) = match condition.split_once('/') {
            Some((a, p)) => {
                let p: u32 = p
                    .parse()
                    .map_err(|_| CommonError::InvalidAccessCondition(condition.to_owned()))?;
                (a, Some(p))
            }
            None => (condition, None),
        };
        let cond_ip: IpAddr = addr_str
            .parse()
            .map_err(|_| CommonError::InvalidAccessCondition(condition.to_owned()))?;

        match (self.0.ip(), cond_ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let len = prefix.unwrap_or(32).min(32);
                Ok(mask_eq_v4(a, b, len))
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let len = prefix.unwrap_or(128).min(128);
                Ok(mask_eq_v6(a, b, len))
            }
            _ => Ok(false),
        }
    }
}

fn mask_eq_v4(a: Ipv4Addr, b: Ipv4Addr, prefix_len: u32) -> bool {
    if prefix_len == 0 {
        return true;
    }
    let mask: u32 = if prefix_len < 32 {
        u32::MAX << (32 - prefix_len)
    } else {
        u32::MAX
    };
    (u32::from(a) & mask) == (u32::from(b) & mask)
}

fn mask_eq_v6(a: Ipv6Addr, b: Ipv6Addr, prefix_len: u32) -> bool {
    let a = a.octets();
    let b = b.octets();
    let mut remaining = prefix_len;
    for i in 0..16 {
        if remaining == 0 {
            break;
        }
        let bits = remaining.min(8);
        let mask: u8 = if bits < 8 {
            0xffu8 << (8 - bits)
        } else {
            0xff
        };
        if (a[i] & mask) != (b[i] & mask) {
            return false;
        }
        remaining -= bits;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SockAddr {
        SockAddr::new(s.parse().unwrap())
    }

    #[test]
    fn v4_cidr_match() {
        let a = addr("10.1.2.3:5000");
        assert!(a.matches("10.0.0.0/8").unwrap());
        assert!(!a.matches("11.0.0.0/8").unwrap());
    }

    #[test]
    fn exact_v4_match_no_prefix() {
        let a = addr("192.0.2.7:1000");
        assert!(a.matches("192.0.2.7").unwrap());
        assert!(!a.matches("192.0.2.8").unwrap());
    }

    #[test]
    fn mismatched_family_never_matches() {
        let a = addr("10.1.2.3:1000");
        assert!(!a.matches("::1/128").unwrap());
    }

    #[test]
    fn v4_mapped_v6_collapses_to_v4() {
        let mut a = SockAddr::new("[::ffff:192.0.2.7]:5000".parse().unwrap());
        assert!(a.convert_v4_mapped_v6_to_v4());
        assert_eq!(a.address(), "192.0.2.7");
    }

    #[test]
    fn plain_v6_is_not_converted() {
        let mut a = SockAddr::new("[2001:db8::1]:5000".parse().unwrap());
        assert!(!a.convert_v4_mapped_v6_to_v4());
    }

    #[test]
    fn prefix_zero_matches_everything_in_family() {
        let a = addr("203.0.113.9:1");
        assert!(a.matches("0.0.0.0/0").unwrap());
    }
}
