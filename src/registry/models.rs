//! Entries tracked by the switch registries.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::cache::Persist;
use super::store::Entry;
use crate::core::{HwAddrError, unix_now};

/// 48-bit link-layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct HwAddr(pub [u8; 6]);

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for HwAddr {
    type Err = HwAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| HwAddrError::Short(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| HwAddrError::BadOctet(part.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(HwAddrError::Long(s.to_string()));
        }
        Ok(HwAddr(octets))
    }
}

impl Serialize for HwAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An address learned on the overlay.
#[derive(Debug)]
pub struct Neighbor {
    ip_addr: IpAddr,
    hw_addr: Mutex<HwAddr>,
    hit_time: AtomicI64,
    new_time: i64,
}

impl Neighbor {
    /// Record `ip_addr` as seen at `hw_addr` now.
    pub fn new(ip_addr: IpAddr, hw_addr: HwAddr) -> Self {
        let now = unix_now();
        Self {
            ip_addr,
            hw_addr: Mutex::new(hw_addr),
            hit_time: AtomicI64::new(now),
            new_time: now,
        }
    }

    /// Set the last-hit time.
    pub fn with_hit_time(self, hit_time: i64) -> Self {
        self.hit_time.store(hit_time, Ordering::Relaxed);
        self
    }

    /// IP address.
    pub fn ip_addr(&self) -> IpAddr {
        self.ip_addr
    }

    /// Current hardware address.
    pub fn hw_addr(&self) -> HwAddr {
        *self.hw_addr.lock()
    }

    /// Last time traffic was seen (Unix seconds).
    pub fn hit_time(&self) -> i64 {
        self.hit_time.load(Ordering::Relaxed)
    }

    /// First time the neighbor was learned (Unix seconds).
    pub fn new_time(&self) -> i64 {
        self.new_time
    }

    /// Mark the neighbor as seen now.
    pub fn hit(&self) {
        self.hit_time.store(unix_now(), Ordering::Relaxed);
    }
}

impl Entry for Neighbor {
    fn key(&self) -> String {
        self.ip_addr.to_string()
    }

    fn refresh(&self, newer: &Self) {
        *self.hw_addr.lock() = newer.hw_addr();
        self.hit_time.store(newer.hit_time(), Ordering::Relaxed);
    }
}

impl Persist for Neighbor {
    fn fields(&self) -> HashMap<String, String> {
        HashMap::from([
            ("address".to_string(), self.ip_addr.to_string()),
            ("ethernet".to_string(), self.hw_addr().to_string()),
            ("hit".to_string(), self.hit_time().to_string()),
        ])
    }
}

/// A tunnel account, scoped to its network as `user@network`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Scoped account name.
    pub name: String,
    /// Shared password.
    pub password: String,
}

impl User {
    /// Scope `username` to `network`.
    pub fn scoped(username: &str, network: &str, password: impl Into<String>) -> Self {
        Self {
            name: format!("{username}@{network}"),
            password: password.into(),
        }
    }
}

impl Entry for User {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// A static route pushed to the points of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix.
    pub prefix: String,
    /// Gateway address.
    pub next_hop: String,
}

/// Address pool and routes of a logical network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name.
    pub name: String,
    /// First address of the pool.
    pub ip_start: String,
    /// Last address of the pool.
    pub ip_end: String,
    /// Pool netmask.
    pub netmask: String,
    /// Static routes.
    pub routes: Vec<Route>,
}

impl Entry for Network {
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Persist for Network {
    fn fields(&self) -> HashMap<String, String> {
        HashMap::from([
            ("name".to_string(), self.name.clone()),
            ("start".to_string(), self.ip_start.clone()),
            ("end".to_string(), self.ip_end.clone()),
            ("netmask".to_string(), self.netmask.clone()),
            ("routes".to_string(), self.routes.len().to_string()),
        ])
    }
}

/// A flow observed crossing the switch.
#[derive(Debug)]
pub struct OnlineLine {
    /// Ethernet type.
    pub eth_type: u16,
    /// Source IP.
    pub ip_source: IpAddr,
    /// Destination IP.
    pub ip_dest: IpAddr,
    /// IP protocol number.
    pub ip_proto: u8,
    /// Source port.
    pub port_source: u16,
    /// Destination port.
    pub port_dest: u16,
    hit_time: AtomicI64,
    new_time: i64,
}

impl OnlineLine {
    /// Record a flow seen now.
    pub fn new(
        eth_type: u16,
        ip_source: IpAddr,
        ip_dest: IpAddr,
        ip_proto: u8,
        port_source: u16,
        port_dest: u16,
    ) -> Self {
        let now = unix_now();
        Self {
            eth_type,
            ip_source,
            ip_dest,
            ip_proto,
            port_source,
            port_dest,
            hit_time: AtomicI64::new(now),
            new_time: now,
        }
    }

    /// Set the last-hit time.
    pub fn with_hit_time(self, hit_time: i64) -> Self {
        self.hit_time.store(hit_time, Ordering::Relaxed);
        self
    }

    /// First time the flow was seen.
    pub fn new_time(&self) -> i64 {
        self.new_time
    }

    /// Last time the flow was seen.
    pub fn last_time(&self) -> i64 {
        self.hit_time.load(Ordering::Relaxed)
    }

    /// Mark the flow as seen now.
    pub fn hit(&self) {
        self.hit_time.store(unix_now(), Ordering::Relaxed);
    }
}

impl Entry for OnlineLine {
    fn key(&self) -> String {
        format!(
            "{:04x}:{}:{}:{}:{}:{}",
            self.eth_type,
            self.ip_source,
            self.ip_dest,
            self.ip_proto,
            self.port_source,
            self.port_dest
        )
    }

    fn refresh(&self, newer: &Self) {
        self.hit_time.store(newer.last_time(), Ordering::Relaxed);
    }
}

impl Persist for OnlineLine {
    fn fields(&self) -> HashMap<String, String> {
        HashMap::from([
            ("source".to_string(), self.ip_source.to_string()),
            ("destination".to_string(), self.ip_dest.to_string()),
            ("protocol".to_string(), self.ip_proto.to_string()),
            ("hit".to_string(), self.last_time().to_string()),
        ])
    }
}
