//! Accepting side of a tunnel transport.
//!
//! [`Server::accept`] is the accept loop. It keeps retrying the bind while
//! the address is unavailable and pushes every accepted [`Connection`] onto
//! a bounded admission queue. The consumer adopts connections with
//! [`Server::next_admitted`] and hands back the ones that went away with
//! [`Server::retire`].

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio_kcp::{KcpConfig, KcpListener};
use tracing::{debug, info, warn};

use super::connection::{Connection, Protocol};
use super::wire::Wire;
use crate::core::{
    ADMISSION_QUEUE_SIZE, DATAGRAM_IDLE_TIMEOUT, DATAGRAM_QUEUE_SIZE, LISTEN_RETRY_INTERVAL,
    MAX_CLIENTS, MAX_DATAGRAM_SIZE, RETIREMENT_QUEUE_SIZE, TransportError, TransportResult,
};
use crate::crypto::CipherBlock;
use crate::registry::SafeMap;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Transport protocol.
    pub protocol: Protocol,

    /// Cipher block applied to every accepted connection.
    pub block: Option<Arc<CipherBlock>>,

    /// Idle timeout of accepted datagram sessions.
    pub idle_timeout: Option<Duration>,

    /// Delay between failed bind attempts.
    pub retry_interval: Duration,

    /// Maximum number of registered clients.
    pub max_clients: usize,

    /// Capacity of the admission queue.
    pub admission_capacity: usize,

    /// Capacity of the retirement queue.
    pub retirement_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            block: None,
            idle_timeout: Some(DATAGRAM_IDLE_TIMEOUT),
            retry_interval: LISTEN_RETRY_INTERVAL,
            max_clients: MAX_CLIENTS,
            admission_capacity: ADMISSION_QUEUE_SIZE,
            retirement_capacity: RETIREMENT_QUEUE_SIZE,
        }
    }
}

/// Builder for a [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport protocol.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the cipher block.
    pub fn block(mut self, block: Option<Arc<CipherBlock>>) -> Self {
        self.config.block = block;
        self
    }

    /// Set the idle timeout of datagram sessions.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the delay between failed bind attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Set the maximum number of registered clients.
    pub fn max_clients(mut self, max: usize) -> Self {
        self.config.max_clients = max;
        self
    }

    /// Set the admission queue capacity.
    pub fn admission_capacity(mut self, capacity: usize) -> Self {
        self.config.admission_capacity = capacity.max(1);
        self
    }

    /// Set the retirement queue capacity.
    pub fn retirement_capacity(mut self, capacity: usize) -> Self {
        self.config.retirement_capacity = capacity.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    /// Connections accepted.
    pub accept_count: u64,
    /// Connections retired.
    pub close_count: u64,
    /// Connections refused because the client registry was full.
    pub deny_count: u64,
    /// Connections currently registered.
    pub clients: usize,
}

enum Bound {
    Tcp(TcpListener),
    Udp(Arc<UdpSocket>),
    Kcp {
        listener: AsyncMutex<KcpListener>,
        local: Option<SocketAddr>,
    },
}

impl Bound {
    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Bound::Tcp(listener) => listener.local_addr().ok(),
            Bound::Udp(socket) => socket.local_addr().ok(),
            Bound::Kcp { local, .. } => *local,
        }
    }
}

/// Outcome of handing a connection to the consumer.
enum Admission {
    Admitted,
    Denied,
    Closed,
}

/// Listening endpoint producing [`Connection`]s.
pub struct Server {
    address: String,
    config: ServerConfig,
    bound: Mutex<Option<Arc<Bound>>>,
    closed: watch::Sender<bool>,
    admit_tx: mpsc::Sender<Arc<Connection>>,
    admit_rx: AsyncMutex<mpsc::Receiver<Arc<Connection>>>,
    retire_tx: mpsc::Sender<Arc<Connection>>,
    retire_rx: AsyncMutex<mpsc::Receiver<Arc<Connection>>>,
    clients: SafeMap<Arc<Connection>>,
    accept_count: AtomicU64,
    close_count: AtomicU64,
    deny_count: AtomicU64,
}

impl Server {
    /// Create a server for `address`. Nothing is bound until
    /// [`listen`](Self::listen) or [`accept`](Self::accept).
    pub fn new(address: impl Into<String>, config: ServerConfig) -> Self {
        let (admit_tx, admit_rx) = mpsc::channel(config.admission_capacity.max(1));
        let (retire_tx, retire_rx) = mpsc::channel(config.retirement_capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            address: address.into(),
            clients: SafeMap::new(config.max_clients),
            config,
            bound: Mutex::new(None),
            closed,
            admit_tx,
            admit_rx: AsyncMutex::new(admit_rx),
            retire_tx,
            retire_rx: AsyncMutex::new(retire_rx),
            accept_count: AtomicU64::new(0),
            close_count: AtomicU64::new(0),
            deny_count: AtomicU64::new(0),
        }
    }

    /// Configured address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    /// Whether a bind is held.
    pub fn is_listening(&self) -> bool {
        self.bound.lock().is_some()
    }

    /// Bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.lock().as_ref().and_then(|b| b.local_addr())
    }

    /// Registered clients.
    pub fn clients(&self) -> &SafeMap<Arc<Connection>> {
        &self.clients
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            accept_count: self.accept_count.load(Ordering::Relaxed),
            close_count: self.close_count.load(Ordering::Relaxed),
            deny_count: self.deny_count.load(Ordering::Relaxed),
            clients: self.clients.len(),
        }
    }

    /// Bind the configured address. A held bind is kept.
    pub async fn listen(&self) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.is_listening() {
            return Ok(());
        }

        let bind_err = |source| TransportError::Bind {
            address: self.address.clone(),
            source,
        };
        let bound = match self.config.protocol {
            Protocol::Tcp => Bound::Tcp(TcpListener::bind(&self.address).await.map_err(bind_err)?),
            Protocol::Udp => Bound::Udp(Arc::new(
                UdpSocket::bind(&self.address).await.map_err(bind_err)?,
            )),
            Protocol::Kcp => {
                let listener = KcpListener::bind(KcpConfig::default(), self.address.as_str())
                    .await
                    .map_err(|e| bind_err(std::io::Error::other(e.to_string())))?;
                Bound::Kcp {
                    local: listener.local_addr().ok(),
                    listener: AsyncMutex::new(listener),
                }
            }
        };

        let mut slot = self.bound.lock();
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        info!("Listen on {}://{}", self.config.protocol, self.address);
        slot.get_or_insert_with(|| Arc::new(bound));
        Ok(())
    }

    /// Run the accept loop until [`close`](Self::close).
    pub async fn accept(&self) -> TransportResult<()> {
        let mut closed = self.closed.subscribe();
        loop {
            if *closed.borrow_and_update() {
                break;
            }

            let bound = self.bound.lock().clone();
            let Some(bound) = bound else {
                if let Err(e) = self.listen().await {
                    warn!("Listen on {} failed: {}", self.address, e);
                    if !self.pause(&mut closed).await {
                        break;
                    }
                }
                continue;
            };

            let result = match &*bound {
                Bound::Tcp(listener) => self.accept_stream(listener, &mut closed).await,
                Bound::Udp(socket) => self.accept_datagram(socket, &mut closed).await,
                Bound::Kcp { listener, .. } => self.accept_kcp(listener, &mut closed).await,
            };
            if let Err(e) = result {
                warn!("Accept on {} failed: {}", self.address, e);
                if !self.pause(&mut closed).await {
                    break;
                }
            }
        }
        debug!("Accept loop on {} stopped", self.address);
        Ok(())
    }

    /// Adopt the next admitted connection. `None` once the server is closed.
    pub async fn next_admitted(&self) -> Option<Arc<Connection>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return None;
        }
        let mut rx = self.admit_rx.lock().await;
        tokio::select! {
            conn = rx.recv() => conn,
            _ = closed.changed() => None,
        }
    }

    /// Unregister and close `conn`, then queue it for retirement.
    ///
    /// Blocks while the retirement queue is full.
    pub async fn retire(&self, conn: Arc<Connection>) -> TransportResult<()> {
        self.clients.del(conn.address());
        self.close_count.fetch_add(1, Ordering::Relaxed);
        conn.close();
        debug!("Retire {} from {}", conn.address(), self.address);

        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::QueueClosed);
        }
        tokio::select! {
            sent = self.retire_tx.send(conn) => sent.map_err(|_| TransportError::QueueClosed),
            _ = closed.changed() => Err(TransportError::QueueClosed),
        }
    }

    /// Take the next retired connection. `None` once the server is closed.
    pub async fn next_retired(&self) -> Option<Arc<Connection>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return None;
        }
        let mut rx = self.retire_rx.lock().await;
        tokio::select! {
            conn = rx.recv() => conn,
            _ = closed.changed() => None,
        }
    }

    /// Release the bind and stop the accept loop.
    pub fn close(&self) {
        let was_open = !self.closed.send_replace(true);
        let bound = self.bound.lock().take();
        if was_open || bound.is_some() {
            info!("Close listener {}://{}", self.config.protocol, self.address);
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Sleep one retry interval. Returns `false` if closed meanwhile.
    async fn pause(&self, closed: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_interval) => true,
            _ = closed.changed() => false,
        }
    }

    async fn accept_stream(
        &self,
        listener: &TcpListener,
        closed: &mut watch::Receiver<bool>,
    ) -> TransportResult<()> {
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = closed.changed() => return Ok(()),
            };
            debug!("Accept {} on {}", peer, self.address);
            let conn = Connection::accepted_tcp(stream, self.config.block.clone());
            if let Admission::Closed = self.admit(Arc::new(conn), closed).await {
                return Ok(());
            }
        }
    }

    async fn accept_kcp(
        &self,
        listener: &AsyncMutex<KcpListener>,
        closed: &mut watch::Receiver<bool>,
    ) -> TransportResult<()> {
        let mut listener = listener.lock().await;
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => {
                    accepted.map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?
                }
                _ = closed.changed() => return Ok(()),
            };
            debug!("Accept {} on {}", peer, self.address);
            let conn = Connection::accepted_kcp(stream, peer, self.config.block.clone());
            if let Admission::Closed = self.admit(Arc::new(conn), closed).await {
                return Ok(());
            }
        }
    }

    /// Demultiplex one shared socket into per-peer sessions.
    ///
    /// A peer denied for a full registry is remembered and its datagrams
    /// are dropped until a client slot frees up.
    async fn accept_datagram(
        &self,
        socket: &Arc<UdpSocket>,
        closed: &mut watch::Receiver<bool>,
    ) -> TransportResult<()> {
        let mut peers: HashMap<SocketAddr, mpsc::Sender<Vec<u8>>> = HashMap::new();
        let mut denied: HashSet<SocketAddr> = HashSet::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (n, peer) = tokio::select! {
                received = socket.recv_from(&mut buf) => received?,
                _ = closed.changed() => return Ok(()),
            };
            let mut datagram = buf[..n].to_vec();

            if let Some(tx) = peers.get(&peer) {
                match tx.try_send(datagram) {
                    Ok(()) => continue,
                    Err(TrySendError::Full(_)) => {
                        debug!("Drop datagram from {}: queue full", peer);
                        continue;
                    }
                    // The previous session for this peer is gone.
                    Err(TrySendError::Closed(returned)) => {
                        peers.remove(&peer);
                        datagram = returned;
                    }
                }
            }

            if self.is_full() {
                if denied.contains(&peer) {
                    continue;
                }
            } else {
                denied.clear();
            }

            // Sessions whose connection went away release their queue.
            peers.retain(|_, tx| !tx.is_closed());

            let (tx, rx) = mpsc::channel(DATAGRAM_QUEUE_SIZE);
            let _ = tx.try_send(datagram);
            debug!("Accept {} on {}", peer, self.address);

            let wire = Wire::demux(Arc::clone(socket), peer, rx);
            let conn = Connection::accepted_datagram(
                wire,
                self.config.block.clone(),
                self.config.idle_timeout,
            );
            match self.admit(Arc::new(conn), closed).await {
                Admission::Admitted => {
                    peers.insert(peer, tx);
                }
                Admission::Denied => {
                    denied.insert(peer);
                }
                Admission::Closed => return Ok(()),
            }
        }
    }

    fn is_full(&self) -> bool {
        let capacity = self.clients.capacity();
        capacity > 0 && self.clients.len() >= capacity
    }

    /// Register `conn` and push it onto the admission queue.
    async fn admit(&self, conn: Arc<Connection>, closed: &mut watch::Receiver<bool>) -> Admission {
        self.accept_count.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.clients.set(conn.address(), Arc::clone(&conn)) {
            warn!("Deny {} on {}: {}", conn.address(), self.address, e);
            self.deny_count.fetch_add(1, Ordering::Relaxed);
            conn.close();
            return Admission::Denied;
        }

        let pending = Arc::clone(&conn);
        tokio::select! {
            sent = self.admit_tx.send(conn) => match sent {
                Ok(()) => Admission::Admitted,
                Err(_) => Admission::Closed,
            },
            _ = closed.changed() => {
                self.clients.del(pending.address());
                pending.close();
                Admission::Closed
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("protocol", &self.config.protocol)
            .field("listening", &self.is_listening())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Status;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn spawn_accept(server: &Arc<Server>) -> tokio::task::JoinHandle<TransportResult<()>> {
        let server = Arc::clone(server);
        tokio::spawn(async move { server.accept().await })
    }

    #[test]
    fn test_builder_defaults() {
        let config = ServerBuilder::new().build();
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.admission_capacity, 4);
        assert_eq!(config.retirement_capacity, 8);
        assert_eq!(config.max_clients, 1024);

        let config = ServerBuilder::new()
            .protocol(Protocol::Udp)
            .max_clients(2)
            .admission_capacity(0)
            .build();
        assert_eq!(config.protocol, Protocol::Udp);
        assert_eq!(config.max_clients, 2);
        assert_eq!(config.admission_capacity, 1);
    }

    #[tokio::test]
    async fn test_listen_retries_until_available() {
        init_tracing();
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = blocker.local_addr().unwrap();

        let config = ServerBuilder::new()
            .retry_interval(Duration::from_millis(50))
            .build();
        let server = Arc::new(Server::new(addr.to_string(), config));
        let task = spawn_accept(&server);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!server.is_listening());
        assert!(!task.is_finished());

        drop(blocker);
        wait_for(|| server.is_listening()).await;
        assert_eq!(server.local_addr(), Some(addr));

        server.close();
        task.await.unwrap().unwrap();
        assert!(!server.is_listening());
    }

    #[tokio::test]
    async fn test_tcp_admission_and_retirement() {
        init_tracing();
        let server = Arc::new(Server::new("127.0.0.1:0", ServerConfig::default()));
        server.listen().await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = spawn_accept(&server);

        let client = Connection::new(addr.to_string(), Protocol::Tcp, None);
        client.connect().await.unwrap();

        let accepted = server.next_admitted().await.unwrap();
        assert_eq!(accepted.status(), Status::Connected);
        assert_eq!(server.stats().accept_count, 1);
        assert_eq!(server.stats().clients, 1);

        client.write_frame(&[3u8; 100]).await.unwrap();
        assert_eq!(accepted.read_frame().await.unwrap(), vec![3u8; 100]);

        server.retire(Arc::clone(&accepted)).await.unwrap();
        let retired = server.next_retired().await.unwrap();
        assert!(Arc::ptr_eq(&retired, &accepted));
        assert_eq!(retired.status(), Status::Closed);
        assert_eq!(server.stats().close_count, 1);
        assert_eq!(server.stats().clients, 0);

        server.close();
        task.await.unwrap().unwrap();
        assert!(server.next_admitted().await.is_none());
    }

    #[tokio::test]
    async fn test_full_registry_denies() {
        let config = ServerBuilder::new().max_clients(1).build();
        let server = Arc::new(Server::new("127.0.0.1:0", config));
        server.listen().await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = spawn_accept(&server);

        let first = Connection::new(addr.to_string(), Protocol::Tcp, None);
        first.connect().await.unwrap();
        let _adopted = server.next_admitted().await.unwrap();

        let second = Connection::new(addr.to_string(), Protocol::Tcp, None);
        second.connect().await.unwrap();
        wait_for(|| server.stats().deny_count == 1).await;

        assert_eq!(server.stats().accept_count, 2);
        assert_eq!(server.clients().len(), 1);

        server.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_udp_demux() {
        init_tracing();
        let block = Some(Arc::new(CipherBlock::from_secret("demux").unwrap()));
        let config = ServerBuilder::new()
            .protocol(Protocol::Udp)
            .block(block.clone())
            .build();
        let server = Arc::new(Server::new("127.0.0.1:0", config));
        server.listen().await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = spawn_accept(&server);

        let alice = Connection::new(addr.to_string(), Protocol::Udp, block.clone());
        let bob = Connection::new(addr.to_string(), Protocol::Udp, block);
        alice.connect().await.unwrap();
        bob.connect().await.unwrap();

        alice.write_frame(&[0xA1; 60]).await.unwrap();
        let from_alice = server.next_admitted().await.unwrap();
        assert_eq!(from_alice.read_frame().await.unwrap(), vec![0xA1; 60]);

        bob.write_frame(&[0xB0; 60]).await.unwrap();
        let from_bob = server.next_admitted().await.unwrap();
        assert_eq!(from_bob.read_frame().await.unwrap(), vec![0xB0; 60]);

        // Further datagrams from a known peer reuse its session.
        alice.write_frame(&[0xA2; 60]).await.unwrap();
        assert_eq!(from_alice.read_frame().await.unwrap(), vec![0xA2; 60]);

        from_bob.write_frame(&[0xB1; 30]).await.unwrap();
        assert_eq!(bob.read_frame().await.unwrap(), vec![0xB1; 30]);

        assert_eq!(server.stats().accept_count, 2);
        server.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_udp_denied_peer_counted_once() {
        let config = ServerBuilder::new()
            .protocol(Protocol::Udp)
            .max_clients(1)
            .build();
        let server = Arc::new(Server::new("127.0.0.1:0", config));
        server.listen().await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = spawn_accept(&server);

        let alice = Connection::new(addr.to_string(), Protocol::Udp, None);
        let bob = Connection::new(addr.to_string(), Protocol::Udp, None);
        alice.connect().await.unwrap();
        bob.connect().await.unwrap();

        alice.write_frame(&[0xA1; 40]).await.unwrap();
        let from_alice = server.next_admitted().await.unwrap();
        assert_eq!(from_alice.read_frame().await.unwrap(), vec![0xA1; 40]);

        for _ in 0..3 {
            bob.write_frame(&[0xB0; 40]).await.unwrap();
        }
        // One socket, one loop: once this arrives, bob's datagrams were seen.
        alice.write_frame(&[0xA2; 40]).await.unwrap();
        assert_eq!(from_alice.read_frame().await.unwrap(), vec![0xA2; 40]);

        let stats = server.stats();
        assert_eq!(stats.accept_count, 2);
        assert_eq!(stats.deny_count, 1);
        assert_eq!(stats.clients, 1);

        // A freed slot lets the denied peer in.
        server.retire(from_alice).await.unwrap();
        bob.write_frame(&[0xB1; 40]).await.unwrap();
        let from_bob = server.next_admitted().await.unwrap();
        assert_eq!(from_bob.read_frame().await.unwrap(), vec![0xB1; 40]);
        assert_eq!(server.stats().accept_count, 3);

        server.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_kcp_admission() {
        init_tracing();
        let block = Some(Arc::new(CipherBlock::from_secret("kcp").unwrap()));
        let config = ServerBuilder::new()
            .protocol(Protocol::Kcp)
            .block(block.clone())
            .build();
        let server = Arc::new(Server::new("127.0.0.1:0", config));
        server.listen().await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = spawn_accept(&server);

        let client = Connection::new(addr.to_string(), Protocol::Kcp, block);
        client.connect().await.unwrap();
        client.write_frame(&[0xC0; 1200]).await.unwrap();

        let accepted = server.next_admitted().await.unwrap();
        assert_eq!(accepted.protocol(), Protocol::Kcp);
        assert_eq!(accepted.read_frame().await.unwrap(), vec![0xC0; 1200]);

        accepted.write_frame(&[0xC1; 64]).await.unwrap();
        assert_eq!(client.read_frame().await.unwrap(), vec![0xC1; 64]);

        server.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_pending_accept() {
        let server = Arc::new(Server::new("127.0.0.1:0", ServerConfig::default()));
        let task = spawn_accept(&server);
        wait_for(|| server.is_listening()).await;

        server.close();
        task.await.unwrap().unwrap();
        assert!(matches!(
            server.listen().await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
