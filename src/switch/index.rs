//! Read-only snapshot of the switch state for the control plane.

#![allow(missing_docs)]

use std::sync::Arc;

use serde::Serialize;

use super::registry::Registry;
use super::worker::NetworkWorker;
use crate::client::Point;
use crate::core::unix_now;
use crate::registry::{Neighbor, Network, OnlineLine, Route};
use crate::transport::Status;

/// Point or link row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointSchema {
    pub uuid: String,
    pub alias: String,
    pub network: String,
    pub address: String,
    pub protocol: String,
    pub status: Status,
    pub uptime: i64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl From<&Point> for PointSchema {
    fn from(point: &Point) -> Self {
        let stats = point.connection().stats();
        Self {
            uuid: point.uuid().to_string(),
            alias: point.alias().to_string(),
            network: point.network().to_string(),
            address: point.addr().to_string(),
            protocol: point.config().protocol.to_string(),
            status: point.status(),
            uptime: point.up_time(),
            rx_bytes: stats.rx_bytes,
            tx_bytes: stats.tx_bytes,
        }
    }
}

/// Neighbor row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborSchema {
    pub address: String,
    pub ethernet: String,
    pub hit_time: i64,
    pub uptime: i64,
}

impl From<&Neighbor> for NeighborSchema {
    fn from(neighbor: &Neighbor) -> Self {
        Self {
            address: neighbor.ip_addr().to_string(),
            ethernet: neighbor.hw_addr().to_string(),
            hit_time: neighbor.hit_time(),
            uptime: unix_now() - neighbor.new_time(),
        }
    }
}

/// Observed flow row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineSchema {
    pub eth_type: u16,
    pub ip_source: String,
    pub ip_dest: String,
    pub ip_proto: u8,
    pub port_source: u16,
    pub port_dest: u16,
    pub hit_time: i64,
    pub uptime: i64,
}

impl From<&OnlineLine> for OnlineSchema {
    fn from(line: &OnlineLine) -> Self {
        Self {
            eth_type: line.eth_type,
            ip_source: line.ip_source.to_string(),
            ip_dest: line.ip_dest.to_string(),
            ip_proto: line.ip_proto,
            port_source: line.port_source,
            port_dest: line.port_dest,
            hit_time: line.last_time(),
            uptime: line.last_time() - line.new_time(),
        }
    }
}

/// Address pool row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSchema {
    pub name: String,
    pub ip_start: String,
    pub ip_end: String,
    pub netmask: String,
    pub routes: Vec<Route>,
}

impl From<&Network> for NetworkSchema {
    fn from(network: &Network) -> Self {
        Self {
            name: network.name.clone(),
            ip_start: network.ip_start.clone(),
            ip_end: network.ip_end.clone(),
            netmask: network.netmask.clone(),
            routes: network.routes.clone(),
        }
    }
}

/// Network worker row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSchema {
    pub name: String,
    pub alias: String,
    pub uuid: String,
    pub uptime: i64,
    pub links: usize,
}

impl From<&NetworkWorker> for WorkerSchema {
    fn from(worker: &NetworkWorker) -> Self {
        Self {
            name: worker.name().to_string(),
            alias: worker.alias().to_string(),
            uuid: worker.id(),
            uptime: worker.up_time(),
            links: worker.links().len(),
        }
    }
}

/// Everything the control plane shows on its index page.
///
/// Points and links are ordered by UUID descending, neighbors by IP
/// descending, flows by last activity ascending and networks by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Index {
    pub version: String,
    pub workers: Vec<WorkerSchema>,
    pub points: Vec<PointSchema>,
    pub links: Vec<PointSchema>,
    pub neighbors: Vec<NeighborSchema>,
    pub online: Vec<OnlineSchema>,
    pub networks: Vec<NetworkSchema>,
}

impl Index {
    /// Collect a snapshot of `registry`.
    pub fn collect(registry: &Registry) -> Self {
        let mut points: Vec<Arc<Point>> = registry.points.list().collect();
        points.sort_by(|a, b| b.uuid().cmp(a.uuid()));

        let mut links: Vec<Arc<Point>> = registry.links.list().collect();
        links.sort_by(|a, b| b.uuid().cmp(a.uuid()));

        let mut neighbors: Vec<Arc<Neighbor>> = registry.neighbors.list().collect();
        neighbors.sort_by_cached_key(|n| std::cmp::Reverse(n.ip_addr().to_string()));

        let mut online: Vec<Arc<OnlineLine>> = registry.online.list().collect();
        online.sort_by_key(|line| line.last_time());

        let mut networks: Vec<Arc<Network>> = registry.networks.list().collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            workers: Vec::new(),
            points: points.iter().map(|p| PointSchema::from(&**p)).collect(),
            links: links.iter().map(|p| PointSchema::from(&**p)).collect(),
            neighbors: neighbors.iter().map(|n| NeighborSchema::from(&**n)).collect(),
            online: online.iter().map(|l| OnlineSchema::from(&**l)).collect(),
            networks: networks.iter().map(|n| NetworkSchema::from(&**n)).collect(),
        }
    }

    /// Add a row per worker, ordered by name.
    pub fn with_workers<'a>(mut self, workers: impl IntoIterator<Item = &'a NetworkWorker>) -> Self {
        self.workers = workers.into_iter().map(WorkerSchema::from).collect();
        self.workers.sort_by(|a, b| a.name.cmp(&b.name));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PointConfig;
    use crate::registry::HwAddr;
    use crate::switch::NetworkConfig;
    use std::net::IpAddr;

    fn neighbor(ip: &str) -> Arc<Neighbor> {
        let ip: IpAddr = ip.parse().unwrap();
        Arc::new(Neighbor::new(ip, HwAddr([2, 0, 0, 0, 0, 1])))
    }

    fn line(source: &str, hit: i64) -> Arc<OnlineLine> {
        Arc::new(
            OnlineLine::new(0x0800, source.parse().unwrap(), "10.0.0.254".parse().unwrap(), 17, 53, 53)
                .with_hit_time(hit),
        )
    }

    #[test]
    fn test_collect_orders_rows() {
        let registry = Registry::new();
        for ip in ["10.0.0.2", "10.0.0.10", "10.0.0.3"] {
            registry.neighbors.add(neighbor(ip)).unwrap();
        }
        registry.online.add(line("10.0.0.1", 300)).unwrap();
        registry.online.add(line("10.0.0.2", 100)).unwrap();
        registry.online.add(line("10.0.0.3", 200)).unwrap();
        for addr in ["127.0.0.1:1", "127.0.0.1:2", "127.0.0.1:3"] {
            let point = Point::new(PointConfig::new(addr)).unwrap();
            registry.points.add(Arc::new(point)).unwrap();
        }

        let index = Index::collect(&registry);

        let ips: Vec<_> = index.neighbors.iter().map(|n| n.address.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.3", "10.0.0.2", "10.0.0.10"]);

        let hits: Vec<_> = index.online.iter().map(|l| l.hit_time).collect();
        assert_eq!(hits, vec![100, 200, 300]);

        let uuids: Vec<_> = index.points.iter().map(|p| p.uuid.clone()).collect();
        let mut sorted = uuids.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(uuids, sorted);
        assert!(index.links.is_empty());
    }

    #[test]
    fn test_index_serializes() {
        let registry = Arc::new(Registry::new());
        let worker = NetworkWorker::new(NetworkConfig::new("example"), None, Arc::clone(&registry));
        registry.neighbors.add(neighbor("192.168.1.1")).unwrap();

        let index = Index::collect(&registry).with_workers([&worker]);
        let json = serde_json::to_value(&index).unwrap();

        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["workers"][0]["name"], "example");
        assert_eq!(json["workers"][0]["uptime"], 0);
        assert_eq!(json["neighbors"][0]["ethernet"], "02:00:00:00:00:01");
        assert!(json["points"].as_array().unwrap().is_empty());
    }
}
