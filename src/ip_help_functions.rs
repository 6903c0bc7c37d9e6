//! This module contains some help functions regarding the IP address
//!
//! Functions
//! - [ip2id]: Generates an ID for the node based on the IP-address.
//! - [offline_id]: The ID used when the node has no address at all.

use std::net::IpAddr;

use crate::config;
use crate::types::NodeId;

/// Extracts your ID based on `ip`: the last octet of an IPv4 address, the last segment of an IPv6 one.
///
/// ## Example
/// ```
/// use elevatormarket::ip_help_functions::ip2id;
/// use std::net::IpAddr;
/// use std::str::FromStr;
///
/// let ip = IpAddr::from_str("192.168.0.17").unwrap();
/// assert_eq!(ip2id(ip), "17");
/// ```
pub fn ip2id(ip: IpAddr) -> NodeId {
    match ip {
        IpAddr::V4(addr) => addr.octets()[3].to_string(),
        IpAddr::V6(addr) => format!("{:x}", addr.segments()[7]),
    }
}

/// ID of a node that could not find its own IP address, unique per process on this host.
pub fn offline_id() -> NodeId {
    format!("{}-{}", config::OFFLINE_ID_PREFIX, std::process::id())
}
