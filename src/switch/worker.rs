//! Link manager of one logical network.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::registry::Registry;
use crate::client::{Point, PointConfig, RetryPolicy, right_addr};
use crate::core::{DEFAULT_SWITCH_PORT, IdentitySource, SwitchError, unix_now};
use crate::crypto::CryptConfig;
use crate::registry::{Network, Route, User};

/// Completion handle of one link provisioning step.
pub type LinkHandle = JoinHandle<Result<Arc<Point>, SwitchError>>;

/// Links keyed by address. `epoch` advances on every stop, so provisioning
/// started before a stop can tell it must not register.
#[derive(Default)]
struct LinkTable {
    epoch: u64,
    points: HashMap<String, Arc<Point>>,
}

type LinkMap = Arc<RwLock<LinkTable>>;

/// Supervisor of a network's outbound links.
///
/// Links are owned here and also registered, without ownership, in the
/// shared [`Registry::links`] store while they are active.
pub struct NetworkWorker {
    alias: String,
    config: NetworkConfig,
    crypt: Option<CryptConfig>,
    registry: Arc<Registry>,
    retry: RetryPolicy,
    new_time: i64,
    start_time: AtomicI64,
    links: LinkMap,
    uuid: RwLock<String>,
    initialized: AtomicBool,
}

impl NetworkWorker {
    /// Create a worker for `config`.
    ///
    /// `crypt` is the switch-wide cipher, used by links and networks that
    /// configure none.
    pub fn new(config: NetworkConfig, crypt: Option<CryptConfig>, registry: Arc<Registry>) -> Self {
        Self {
            alias: config.alias.clone(),
            crypt: config.crypt.clone().or(crypt),
            config,
            registry,
            retry: RetryPolicy::default(),
            new_time: unix_now(),
            start_time: AtomicI64::new(0),
            links: Arc::new(RwLock::new(LinkTable::default())),
            uuid: RwLock::new(String::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Reconnect backoff of the links.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publish the network's accounts, address pool and routes.
    /// Idempotent.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        for pass in &self.config.password {
            let user = User::scoped(&pass.username, &self.config.name, pass.password.clone());
            if let Err(e) = self.registry.users.add(Arc::new(user)) {
                warn!("Network {} user {}: {}", self.config.name, pass.username, e);
            }
        }

        let subnet = &self.config.subnet;
        if subnet.netmask.is_empty() {
            return;
        }
        let mut routes = Vec::with_capacity(self.config.routes.len());
        for route in &self.config.routes {
            if route.next_hop.is_empty() {
                warn!("Network {} route {} has no nexthop", self.config.name, route.prefix);
                continue;
            }
            routes.push(Route {
                prefix: route.prefix.clone(),
                next_hop: route.next_hop.clone(),
            });
        }
        let network = Network {
            name: self.config.name.clone(),
            ip_start: subnet.start.clone(),
            ip_end: subnet.end.clone(),
            netmask: subnet.netmask.clone(),
            routes,
        };
        if let Err(e) = self.registry.networks.add(Arc::new(network)) {
            warn!("Network {}: {}", self.config.name, e);
        }
    }

    /// Start the worker and provision every configured link.
    ///
    /// Must run inside a tokio runtime.
    pub fn start(&self, identity: &dyn IdentitySource) -> Vec<LinkHandle> {
        info!("Network {} start", self.config.name);
        self.initialize();
        *self.uuid.write() = identity.uuid();
        self.start_time.store(unix_now(), Ordering::Relaxed);

        self.config
            .links
            .iter()
            .map(|link| self.add_link(link.clone()))
            .collect()
    }

    /// Stop every link and forget them, locally and in the shared registry.
    ///
    /// Links still being provisioned are refused and resolve to
    /// [`SwitchError::Stopped`].
    pub fn stop(&self) {
        info!("Network {} stop", self.config.name);
        let mut links = self.links.write();
        links.epoch += 1;
        for (_, point) in links.points.drain() {
            point.stop();
            self.registry.links.del(point.addr());
        }
        self.start_time.store(0, Ordering::Relaxed);
    }

    /// Seconds since [`start`](Self::start), zero when stopped.
    pub fn up_time(&self) -> i64 {
        match self.start_time.load(Ordering::Relaxed) {
            0 => 0,
            start => unix_now() - start,
        }
    }

    /// Identity obtained at start.
    pub fn id(&self) -> String {
        self.uuid.read().clone()
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Alias given to links.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Creation time (Unix seconds).
    pub fn new_time(&self) -> i64 {
        self.new_time
    }

    /// Provision a link in the background.
    ///
    /// The network's alias, name and bridge override the link's own; the
    /// link never requests an address. A link already tracked under the
    /// same address is stopped and replaced.
    pub fn add_link(&self, mut cfg: PointConfig) -> LinkHandle {
        cfg.alias = self.alias.clone();
        cfg.network = self.config.name.clone();
        cfg.request_addr = false;
        cfg.interface.bridge = self.config.bridge.name.clone();
        cfg.interface.address = self.config.bridge.address.clone();
        if cfg.crypt.is_none() {
            cfg.crypt = self.crypt.clone();
        }

        let links = Arc::clone(&self.links);
        let registry = Arc::clone(&self.registry);
        let retry = self.retry;
        let epoch = self.links.read().epoch;
        tokio::spawn(async move { provision(cfg, retry, epoch, &links, &registry) })
    }

    /// Stop and forget the link to `addr`. Unknown addresses are ignored.
    pub fn del_link(&self, addr: &str) -> Option<Arc<Point>> {
        let key = right_addr(addr, DEFAULT_SWITCH_PORT);
        let mut links = self.links.write();
        let point = links.points.remove(&key)?;
        point.stop();
        self.registry.links.del(point.addr());
        info!("Network {} link {} removed", self.config.name, point.addr());
        Some(point)
    }

    /// Snapshot of the tracked links.
    pub fn links(&self) -> Vec<Arc<Point>> {
        self.links.read().points.values().cloned().collect()
    }

    /// Link tracked under `addr`.
    pub fn link(&self, addr: &str) -> Option<Arc<Point>> {
        let key = right_addr(addr, DEFAULT_SWITCH_PORT);
        self.links.read().points.get(&key).cloned()
    }
}

fn provision(
    cfg: PointConfig,
    retry: RetryPolicy,
    epoch: u64,
    links: &LinkMap,
    registry: &Registry,
) -> Result<Arc<Point>, SwitchError> {
    let point = Arc::new(Point::new(cfg)?.with_retry(retry));
    point.initialize();

    let key = point.addr().to_string();
    {
        let mut links = links.write();
        if links.epoch != epoch {
            point.stop();
            info!("Network {} link {} dropped: stopped", point.network(), key);
            return Err(SwitchError::Stopped(point.network().to_string()));
        }
        if let Some(old) = links.points.remove(&key) {
            warn!("Link {} replaced", key);
            old.stop();
            registry.links.del(old.addr());
        }
        registry.links.add(Arc::clone(&point))?;
        links.points.insert(key, Arc::clone(&point));
    }

    point.start();
    info!("Network {} link {} added", point.network(), point.addr());
    Ok(point)
}

impl fmt::Display for NetworkWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl fmt::Debug for NetworkWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkWorker")
            .field("name", &self.config.name)
            .field("uuid", &self.id())
            .field("links", &self.links.read().points.len())
            .finish()
    }
}
