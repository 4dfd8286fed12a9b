//! Logical network configuration.

use serde::{Deserialize, Serialize};

use crate::client::PointConfig;
use crate::crypto::CryptConfig;

/// Bridge the network's links attach to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge device name.
    pub name: String,
    /// Bridge address, in CIDR form.
    pub address: String,
}

/// Address pool leased to points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetConfig {
    /// First address of the pool.
    pub start: String,
    /// Last address of the pool.
    pub end: String,
    /// Pool netmask. Empty disables the pool.
    pub netmask: String,
}

/// Static route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Destination prefix.
    pub prefix: String,
    /// Gateway address.
    #[serde(rename = "nexthop")]
    pub next_hop: String,
}

/// Account allowed on the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Account name, unscoped.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// One logical network served by the switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name.
    pub name: String,
    /// Alias given to the links of this network.
    pub alias: String,
    /// Bridge settings.
    pub bridge: BridgeConfig,
    /// Address pool.
    pub subnet: SubnetConfig,
    /// Static routes.
    pub routes: Vec<RouteConfig>,
    /// Accounts.
    pub password: Vec<PasswordConfig>,
    /// Outbound links to other switches.
    pub links: Vec<PointConfig>,
    /// Cipher applied to links that configure none.
    pub crypt: Option<CryptConfig>,
}

impl NetworkConfig {
    /// Create an empty configuration for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_network() {
        let cfg: NetworkConfig = serde_json::from_str(
            r#"{
                "name": "example",
                "bridge": {"name": "br-example", "address": "172.16.1.10/24"},
                "subnet": {"start": "172.16.1.100", "end": "172.16.1.150", "netmask": "255.255.255.0"},
                "routes": [{"prefix": "192.168.10.0/24", "nexthop": "172.16.1.200"}],
                "password": [{"username": "hi", "password": "hi@123$"}],
                "links": [{"connection": "10.0.0.2"}]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.name, "example");
        assert_eq!(cfg.bridge.name, "br-example");
        assert_eq!(cfg.routes[0].next_hop, "172.16.1.200");
        assert_eq!(cfg.password[0].username, "hi");
        assert_eq!(cfg.links.len(), 1);
        assert!(cfg.alias.is_empty());
        assert!(cfg.crypt.is_none());
    }
}
