//! Point configuration.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::core::{DEFAULT_MTU, DEFAULT_NETWORK, DEFAULT_SWITCH_PORT};
use crate::crypto::CryptConfig;
use crate::transport::Protocol;

/// Append `port` to an address that names only a host.
///
/// `"10.0.0.1"` becomes `"10.0.0.1:10002"`; `"10.0.0.1:5000"` is kept.
/// Bracketed IPv6 hosts are handled the same way.
pub fn right_addr(addr: &str, port: u16) -> String {
    let bare = if addr.starts_with('[') {
        addr.ends_with(']')
    } else {
        !addr.contains(':')
    };
    if bare && !addr.is_empty() {
        format!("{addr}:{port}")
    } else {
        addr.to_string()
    }
}

/// Random alias for a point configured without one.
pub fn default_alias() -> String {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.is_empty() {
            return host;
        }
    }
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(char::from)
        .collect()
}

/// Tunnel interface settings handed to the OS provisioning layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Device name. Empty lets the OS choose.
    pub name: String,
    /// Bridge to attach the device to.
    pub bridge: String,
    /// Address assigned to the device or bridge, in CIDR form.
    pub address: String,
    /// Device MTU.
    pub mtu: usize,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            bridge: String::new(),
            address: String::new(),
            mtu: DEFAULT_MTU,
        }
    }
}

/// Configuration of one tunnel endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointConfig {
    /// Display name of the endpoint.
    pub alias: String,
    /// Switch address, `host` or `host:port`.
    pub connection: String,
    /// Logical network joined.
    pub network: String,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Ask the switch for an address lease.
    pub request_addr: bool,
    /// Tunnel interface.
    pub interface: InterfaceConfig,
    /// Cipher settings.
    pub crypt: Option<CryptConfig>,
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            alias: String::new(),
            connection: String::new(),
            network: DEFAULT_NETWORK.to_string(),
            protocol: Protocol::Tcp,
            username: String::new(),
            password: String::new(),
            request_addr: true,
            interface: InterfaceConfig::default(),
            crypt: None,
        }
    }
}

impl PointConfig {
    /// Create a configuration for the switch at `connection`.
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            ..Self::default()
        }
    }

    /// Fill unset fields with their defaults.
    pub fn correct(&mut self) {
        if self.alias.is_empty() {
            self.alias = default_alias();
        }
        self.connection = right_addr(&self.connection, DEFAULT_SWITCH_PORT);
        if self.network.is_empty() {
            self.network = DEFAULT_NETWORK.to_string();
        }
        if self.interface.mtu == 0 {
            self.interface.mtu = DEFAULT_MTU;
        }
        if self.crypt.as_ref().is_some_and(|c| !c.is_enabled()) {
            self.crypt = None;
        }
    }
}
