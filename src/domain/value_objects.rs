//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value, not by identity.
//! Both types here travel over the wire as plain strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Tag carried in the `type` field of every configuration envelope.
///
/// The tag decides how the opaque `config` payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// A named set of public addresses (`frontend`)
    Frontend,
    /// A TCP load balanced service (`tcp`)
    Tcp,
    /// Name-based HTTP/HTTPS service on shared frontends (`shared_http`)
    SharedHttp,
}

impl ServiceType {
    /// All known tags, in wire order.
    pub const ALL: [ServiceType; 3] = [Self::Frontend, Self::Tcp, Self::SharedHttp];

    /// Parse a tag. Unknown tags yield `None`; there is no fallback variant.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "frontend" => Some(Self::Frontend),
            "tcp" => Some(Self::Tcp),
            "shared_http" => Some(Self::SharedHttp),
            _ => None,
        }
    }

    /// Convert to the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Tcp => "tcp",
            Self::SharedHttp => "shared_http",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a CIDR string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkParseError {
    #[error("missing '/' in network '{0}'")]
    MissingPrefix(String),
    #[error("invalid address in network '{0}'")]
    InvalidAddress(String),
    #[error("invalid prefix length in network '{0}'")]
    InvalidPrefix(String),
}

/// An IPv4 or IPv6 network in CIDR notation, e.g. `10.10.20.0/24`.
///
/// Host bits are cleared on construction, so `10.10.20.7/24` and
/// `10.10.20.0/24` compare equal and print identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// Build a network from an address and prefix length.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, NetworkParseError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(NetworkParseError::InvalidPrefix(format!("{addr}/{prefix}")));
        }
        Ok(Self {
            addr: mask(addr, prefix),
            prefix,
        })
    }

    /// Network address (host bits zeroed).
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

}

fn mask(addr: IpAddr, prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - u32::from(prefix))
            };
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if prefix == 0 {
                0
            } else {
                u128::MAX << (128 - u32::from(prefix))
            };
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

impl FromStr for IpNetwork {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| NetworkParseError::MissingPrefix(s.to_string()))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| NetworkParseError::InvalidAddress(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| NetworkParseError::InvalidPrefix(s.to_string()))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl Serialize for IpNetwork {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpNetwork {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
