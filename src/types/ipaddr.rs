//! IP addresses and CIDR ranges.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::net::IpAddr as StdIpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use once_cell::sync::Lazy;

use crate::error::EvalError;

static LOOPBACK_V4: Lazy<IpNet> = Lazy::new(|| "127.0.0.0/8".parse().expect("valid range"));
static LOOPBACK_V6: Lazy<IpNet> = Lazy::new(|| "::1/128".parse().expect("valid range"));
static MULTICAST_V4: Lazy<IpNet> = Lazy::new(|| "224.0.0.0/4".parse().expect("valid range"));
static MULTICAST_V6: Lazy<IpNet> = Lazy::new(|| "ff00::/8".parse().expect("valid range"));

/// An address with a prefix length. A single host has a full-length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpAddr(IpNet);

impl IpAddr {
    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.0, IpNet::V6(_))
    }

    /// True when the whole range lies inside the loopback block of its family.
    pub fn is_loopback(&self) -> bool {
        let block = if self.is_ipv4() {
            &*LOOPBACK_V4
        } else {
            &*LOOPBACK_V6
        };
        block.contains(&self.0.trunc())
    }

    pub fn is_multicast(&self) -> bool {
        let block = if self.is_ipv4() {
            &*MULTICAST_V4
        } else {
            &*MULTICAST_V6
        };
        block.contains(&self.0.trunc())
    }

    /// True when every address of `self` is covered by `range`. Ranges of
    /// different families never contain one another.
    pub fn is_in_range(&self, range: &IpAddr) -> bool {
        range.0.trunc().contains(&self.0.trunc())
    }
}

impl FromStr for IpAddr {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EvalError::InvalidExtensionArgument {
            function: "ip".to_string(),
            message: format!("{s:?} is not an IP address or CIDR range"),
        };
        if s.contains('/') {
            return s.parse::<IpNet>().map(IpAddr).map_err(|_| invalid());
        }
        let addr: StdIpAddr = s.parse().map_err(|_| invalid())?;
        Ok(IpAddr(IpNet::from(addr)))
    }
}

impl Display for IpAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.0.prefix_len() == self.0.max_prefix_len() {
            write!(f, "{}", self.0.addr())
        } else {
            write!(f, "{}", self.0)
        }
    }
}
