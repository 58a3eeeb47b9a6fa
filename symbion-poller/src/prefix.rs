//! IP prefixes as reported by adapter configuration rows

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// An address plus the bit length of its subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    pub fn new(addr: IpAddr, len: u8) -> Option<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        (len <= max).then_some(Self { addr, len })
    }

    /// Parse an address with either a prefix length (`24`, `64`) or a dotted
    /// IPv4 mask (`255.255.255.0`). Non-contiguous masks are rejected.
    pub fn parse(address: &str, subnet: &str) -> Option<Self> {
        let addr: IpAddr = address.trim().parse().ok()?;
        let subnet = subnet.trim();

        if let Ok(len) = subnet.parse::<u8>() {
            return Self::new(addr, len);
        }

        let mask: Ipv4Addr = subnet.parse().ok()?;
        if !addr.is_ipv4() {
            return None;
        }
        let bits = u32::from(mask);
        let len = bits.leading_ones();
        if bits.checked_shl(len).unwrap_or(0) != 0 {
            return None;
        }
        Self::new(addr, len as u8)
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl Serialize for IpPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_and_length_are_equivalent() {
        let dotted = IpPrefix::parse("10.0.0.5", "255.255.255.0").unwrap();
        let length = IpPrefix::parse("10.0.0.5", "24").unwrap();
        assert_eq!(dotted, length);
        assert_eq!(dotted.to_string(), "10.0.0.5/24");
    }

    #[test]
    fn test_malformed_mask_is_rejected() {
        assert!(IpPrefix::parse("10.0.0.5", "not-a-mask").is_none());
        assert!(IpPrefix::parse("10.0.0.5", "255.0.255.0").is_none());
        assert!(IpPrefix::parse("10.0.0.5", "33").is_none());
        assert!(IpPrefix::parse("not-an-ip", "24").is_none());
    }

    #[test]
    fn test_ipv6_uses_length_only() {
        let v6 = IpPrefix::parse("fe80::1c2d:3e4f:5a6b:7c8d", "64").unwrap();
        assert_eq!(v6.prefix_len(), 64);
        assert!(IpPrefix::parse("fe80::1", "255.255.255.0").is_none());
    }

    #[test]
    fn test_edge_masks() {
        assert_eq!(IpPrefix::parse("0.0.0.0", "0.0.0.0").unwrap().prefix_len(), 0);
        assert_eq!(IpPrefix::parse("192.168.1.1", "255.255.255.255").unwrap().prefix_len(), 32);
    }

    #[test]
    fn test_serializes_as_text() {
        let p = IpPrefix::parse("192.168.1.10", "255.255.0.0").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"192.168.1.10/16\"");
    }
}
