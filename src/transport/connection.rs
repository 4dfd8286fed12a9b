//! Connection lifecycle for tunnel transports.
//!
//! A [`Connection`] is one end of a tunnel session. Its state machine:
//!
//! ```text
//!   Init ──retry()──▶ Connecting ──dial ok──▶ Connected
//!    ▲                    │                       │
//!    │                 dial err               close()
//!    │                    ▼                       ▼
//!    └─────────────── Closed ◀────────────────────┘
//!
//!   any ──terminal()──▶ Terminal   (absorbing)
//! ```
//!
//! A fatal read or write error (peer hang-up, idle timeout, lost stream
//! alignment) closes the connection like a local `close()`.
//!
//! Status hooks run after the connection lock is released, so a hook may
//! call back into the same connection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpStream, UdpSocket};
use tokio_kcp::{KcpConfig, KcpStream};
use tracing::{debug, info, warn};

use super::status::Status;
use super::stream::{DataStream, Framing};
use super::wire::Wire;
use crate::core::{
    DATAGRAM_IDLE_TIMEOUT, HookError, MAX_FRAME_VIOLATIONS, TransportError, TransportResult,
    unix_now,
};
use crate::crypto::CipherBlock;

/// Transport protocol of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Length-prefixed frames over TCP.
    #[default]
    Tcp,
    /// One frame per UDP datagram.
    Udp,
    /// Length-prefixed frames over a KCP session: reliable and ordered
    /// on top of UDP.
    Kcp,
}

impl Protocol {
    /// Framing used on the wire.
    pub fn framing(self) -> Framing {
        match self {
            Protocol::Tcp | Protocol::Kcp => Framing::Stream,
            Protocol::Udp => Framing::Datagram,
        }
    }

    /// Lowercase scheme name.
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Kcp => "kcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" | "" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "kcp" => Ok(Protocol::Kcp),
            other => Err(TransportError::InvalidAddress(format!(
                "unknown protocol: {other}"
            ))),
        }
    }
}

/// Callback set notified of connection lifecycle events.
///
/// Every hook has a no-op default. Errors are logged and dropped.
pub trait ConnectionListener: Send + Sync {
    /// The connection finished a successful dial.
    fn on_connected(&self, conn: &Connection) -> Result<(), HookError> {
        let _ = conn;
        Ok(())
    }

    /// The transport handle was released.
    fn on_close(&self, conn: &Connection) -> Result<(), HookError> {
        let _ = conn;
        Ok(())
    }

    /// The status changed from `old` to `new`.
    fn on_status(&self, conn: &Connection, old: Status, new: Status) {
        let _ = (conn, old, new);
    }
}

/// Listener with no hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ConnectionListener for NoopListener {}

/// Traffic counters of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Frames written.
    pub tx_frames: u64,
    /// Payload bytes written.
    pub tx_bytes: u64,
    /// Frames read.
    pub rx_frames: u64,
    /// Payload bytes read.
    pub rx_bytes: u64,
    /// Frames dropped for size or cipher violations.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tx_frames: AtomicU64,
    tx_bytes: AtomicU64,
    rx_frames: AtomicU64,
    rx_bytes: AtomicU64,
    dropped: AtomicU64,
}

struct Inner {
    status: Status,
    status_changed_at: i64,
    wire: Option<Arc<Wire>>,
}

impl Inner {
    /// Commit a status change. Terminal is never left.
    fn transition(&mut self, new: Status) -> Option<(Status, Status)> {
        if self.status == new || self.status.is_terminal() {
            return None;
        }
        let old = self.status;
        self.status = new;
        self.status_changed_at = unix_now();
        Some((old, new))
    }
}

/// One endpoint of a tunnel transport.
pub struct Connection {
    address: String,
    protocol: Protocol,
    codec: DataStream,
    idle_timeout: Option<Duration>,
    created_at: i64,
    inner: Mutex<Inner>,
    listener: RwLock<Arc<dyn ConnectionListener>>,
    violations: AtomicU32,
    counters: Counters,
}

impl Connection {
    /// Create an outbound connection to `address`.
    ///
    /// Datagram connections get the default idle timeout.
    pub fn new(address: impl Into<String>, protocol: Protocol, block: Option<Arc<CipherBlock>>) -> Self {
        let idle_timeout = match protocol {
            Protocol::Tcp | Protocol::Kcp => None,
            Protocol::Udp => Some(DATAGRAM_IDLE_TIMEOUT),
        };
        Self::build(
            address.into(),
            protocol,
            DataStream::new(protocol.framing()).with_block(block),
            idle_timeout,
            Status::Init,
            None,
        )
    }

    /// Adopt a stream accepted by a server.
    pub(crate) fn accepted_tcp(stream: TcpStream, block: Option<Arc<CipherBlock>>) -> Self {
        Self::accepted(Wire::tcp(stream), Protocol::Tcp, block, None)
    }

    /// Adopt a KCP session accepted by a server.
    pub(crate) fn accepted_kcp(stream: KcpStream, peer: std::net::SocketAddr, block: Option<Arc<CipherBlock>>) -> Self {
        Self::accepted(Wire::kcp(stream, peer), Protocol::Kcp, block, None)
    }

    /// Adopt a demultiplexed datagram peer of a server socket.
    pub(crate) fn accepted_datagram(wire: Wire, block: Option<Arc<CipherBlock>>, idle_timeout: Option<Duration>) -> Self {
        Self::accepted(wire, Protocol::Udp, block, idle_timeout)
    }

    fn accepted(
        wire: Wire,
        protocol: Protocol,
        block: Option<Arc<CipherBlock>>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let address = wire
            .remote_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        Self::build(
            address,
            protocol,
            DataStream::new(protocol.framing()).with_block(block),
            idle_timeout,
            Status::Connected,
            Some(Arc::new(wire)),
        )
    }

    fn build(
        address: String,
        protocol: Protocol,
        codec: DataStream,
        idle_timeout: Option<Duration>,
        status: Status,
        wire: Option<Arc<Wire>>,
    ) -> Self {
        let now = unix_now();
        Self {
            address,
            protocol,
            codec,
            idle_timeout,
            created_at: now,
            inner: Mutex::new(Inner {
                status,
                status_changed_at: now,
                wire,
            }),
            listener: RwLock::new(Arc::new(NoopListener)),
            violations: AtomicU32::new(0),
            counters: Counters::default(),
        }
    }

    /// Override the idle timeout. `None` waits forever.
    ///
    /// An expired timeout closes the connection.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the payload size bounds.
    pub fn with_bounds(mut self, min_size: usize, max_size: usize) -> Self {
        self.codec = self.codec.with_bounds(min_size, max_size);
        self
    }

    /// Replace the hook set.
    pub fn set_listener(&self, listener: Arc<dyn ConnectionListener>) {
        *self.listener.write() = listener;
    }

    /// Remote address as configured or as seen on accept.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Frame codec.
    pub fn codec(&self) -> &DataStream {
        &self.codec
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.inner.lock().status
    }

    /// Whether frames can flow.
    pub fn is_ok(&self) -> bool {
        self.status() == Status::Connected
    }

    /// Creation time (Unix seconds).
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Time of the last status change (Unix seconds).
    pub fn status_changed_at(&self) -> i64 {
        self.inner.lock().status_changed_at
    }

    /// Seconds since creation.
    pub fn up_time(&self) -> i64 {
        unix_now() - self.created_at
    }

    /// Local socket address while connected.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.wire().and_then(|w| w.local_addr())
    }

    /// Resolved peer address while connected.
    pub fn remote_addr(&self) -> Option<std::net::SocketAddr> {
        self.wire().and_then(|w| w.remote_addr())
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            tx_frames: self.counters.tx_frames.load(Ordering::Relaxed),
            tx_bytes: self.counters.tx_bytes.load(Ordering::Relaxed),
            rx_frames: self.counters.rx_frames.load(Ordering::Relaxed),
            rx_bytes: self.counters.rx_bytes.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Set the status, firing `on_status` when it actually changes.
    pub fn set_status(&self, status: Status) {
        let change = self.inner.lock().transition(status);
        self.notify_status(change);
    }

    /// Dial gate: claims the connection for one dial attempt.
    ///
    /// Returns `false` when a transport is present, another dial is in
    /// flight, or the connection is terminal.
    pub fn retry(&self) -> bool {
        let change = {
            let mut inner = self.inner.lock();
            if inner.wire.is_some()
                || matches!(inner.status, Status::Connecting | Status::Terminal)
            {
                return false;
            }
            inner.transition(Status::Connecting)
        };
        self.notify_status(change);
        true
    }

    /// Dial the remote address.
    ///
    /// Returns `Ok(())` without dialing when another attempt holds the gate
    /// or the connection is already up.
    pub async fn connect(&self) -> TransportResult<()> {
        if self.status().is_terminal() {
            return Err(TransportError::Terminal);
        }
        if !self.retry() {
            return Ok(());
        }

        info!("Connecting to {}://{}", self.protocol, self.address);
        let wire = match self.dial().await {
            Ok(wire) => wire,
            Err(e) => {
                self.set_status(Status::Closed);
                return Err(e);
            }
        };

        let change = {
            let mut inner = self.inner.lock();
            if inner.status.is_terminal() {
                None
            } else {
                inner.wire = Some(Arc::new(wire));
                inner.transition(Status::Connected)
            }
        };
        if self.status().is_terminal() {
            debug!("Connection {} terminated while dialing", self.address);
            return Err(TransportError::Terminal);
        }

        self.violations.store(0, Ordering::Relaxed);
        self.notify_status(change);
        let listener = self.listener();
        if let Err(e) = listener.on_connected(self) {
            debug!("on_connected hook for {} failed: {}", self.address, e);
        }
        Ok(())
    }

    /// Release the transport handle.
    ///
    /// Does nothing when no handle is present, so repeated calls notify
    /// `on_close` once.
    pub fn close(&self) {
        self.release(None);
    }

    /// Release the transport handle, if it is still `expected` when given.
    fn release(&self, expected: Option<&Arc<Wire>>) {
        let (wire, change) = {
            let mut inner = self.inner.lock();
            let current = match (inner.wire.take(), expected) {
                (Some(current), Some(expected)) if !Arc::ptr_eq(&current, expected) => {
                    inner.wire = Some(current);
                    return;
                }
                (current, _) => current,
            };
            let Some(wire) = current else {
                return;
            };
            let change = inner.transition(Status::Closed);
            (wire, change)
        };

        info!("Connection {} closed", self.address);
        wire.shutdown();
        self.notify_status(change);
        let listener = self.listener();
        if let Err(e) = listener.on_close(self) {
            debug!("on_close hook for {} failed: {}", self.address, e);
        }
    }

    /// Pin the connection to [`Status::Terminal`] and close it.
    pub fn terminal(&self) {
        self.set_status(Status::Terminal);
        self.close();
    }

    /// Read the next payload.
    ///
    /// A size or cipher violation drops the frame and is returned as an
    /// error. Too many consecutive violations close the connection, and so
    /// does any fatal error.
    pub async fn read_frame(&self) -> TransportResult<Vec<u8>> {
        let wire = self.wire().ok_or(TransportError::NotConnected)?;
        match wire.recv(&self.codec, self.idle_timeout).await {
            Ok(payload) => {
                self.violations.store(0, Ordering::Relaxed);
                self.counters.rx_frames.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .rx_bytes
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
                Ok(payload)
            }
            Err(e) if e.is_frame_violation() => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                let count = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Dropped frame from {}: {}", self.address, e);
                if count >= MAX_FRAME_VIOLATIONS {
                    warn!(
                        "Closing {} after {} consecutive frame violations",
                        self.address, count
                    );
                    self.release(Some(&wire));
                }
                Err(e)
            }
            Err(e) => Err(self.fail(&wire, e)),
        }
    }

    /// Write one payload. A fatal error closes the connection.
    pub async fn write_frame(&self, payload: &[u8]) -> TransportResult<()> {
        let wire = self.wire().ok_or(TransportError::NotConnected)?;
        if let Err(e) = wire.send(&self.codec, payload).await {
            return Err(self.fail(&wire, e));
        }
        self.counters.tx_frames.fetch_add(1, Ordering::Relaxed);
        self.counters
            .tx_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Close on a fatal error raised by `wire`, then hand the error back.
    fn fail(&self, wire: &Arc<Wire>, e: TransportError) -> TransportError {
        if e.is_fatal() {
            debug!("Transport {} failed: {}", self.address, e);
            self.release(Some(wire));
        }
        e
    }

    async fn dial(&self) -> TransportResult<Wire> {
        let dial_err = |source| TransportError::Dial {
            address: self.address.clone(),
            source,
        };
        match self.protocol {
            Protocol::Tcp => {
                let stream = TcpStream::connect(&self.address).await.map_err(dial_err)?;
                Ok(Wire::tcp(stream))
            }
            Protocol::Udp => {
                let remote = tokio::net::lookup_host(&self.address)
                    .await
                    .map_err(dial_err)?
                    .next()
                    .ok_or_else(|| TransportError::InvalidAddress(self.address.clone()))?;
                let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                let socket = UdpSocket::bind(local).await.map_err(dial_err)?;
                socket.connect(remote).await.map_err(dial_err)?;
                Ok(Wire::udp(socket))
            }
            Protocol::Kcp => {
                let remote = tokio::net::lookup_host(&self.address)
                    .await
                    .map_err(dial_err)?
                    .next()
                    .ok_or_else(|| TransportError::InvalidAddress(self.address.clone()))?;
                let stream = KcpStream::connect(&KcpConfig::default(), remote)
                    .await
                    .map_err(|e| dial_err(std::io::Error::other(e.to_string())))?;
                Ok(Wire::kcp(stream, remote))
            }
        }
    }

    fn wire(&self) -> Option<Arc<Wire>> {
        self.inner.lock().wire.clone()
    }

    fn listener(&self) -> Arc<dyn ConnectionListener> {
        Arc::clone(&self.listener.read())
    }

    fn notify_status(&self, change: Option<(Status, Status)>) {
        if let Some((old, new)) = change {
            debug!("Connection {} status {} -> {}", self.address, old, new);
            self.listener().on_status(self, old, new);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        connected: AtomicUsize,
        closed: AtomicUsize,
        changes: Mutex<Vec<(Status, Status)>>,
    }

    impl ConnectionListener for Recorder {
        fn on_connected(&self, _conn: &Connection) -> Result<(), HookError> {
            self.connected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_close(&self, _conn: &Connection) -> Result<(), HookError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Err(HookError("ignored".into()))
        }

        fn on_status(&self, _conn: &Connection, old: Status, new: Status) {
            self.changes.lock().push((old, new));
        }
    }

    fn recorded(conn: &Connection) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        conn.set_listener(recorder.clone());
        recorder
    }

    async fn tcp_pair() -> (Connection, TcpStream, Arc<Recorder>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let conn = Connection::new(addr.to_string(), Protocol::Tcp, None);
        let recorder = recorded(&conn);

        let (connected, accepted) = tokio::join!(conn.connect(), listener.accept());
        connected.unwrap();
        let (peer, _) = accepted.unwrap();
        (conn, peer, recorder)
    }

    #[test]
    fn test_set_status_same_is_silent() {
        let conn = Connection::new("127.0.0.1:1", Protocol::Tcp, None);
        let recorder = recorded(&conn);

        conn.set_status(Status::Init);
        assert!(recorder.changes.lock().is_empty());

        conn.set_status(Status::Closed);
        assert_eq!(*recorder.changes.lock(), vec![(Status::Init, Status::Closed)]);

        conn.set_status(Status::Closed);
        assert_eq!(recorder.changes.lock().len(), 1);
    }

    #[test]
    fn test_terminal_is_absorbing() {
        let conn = Connection::new("127.0.0.1:1", Protocol::Tcp, None);
        let recorder = recorded(&conn);

        conn.terminal();
        conn.set_status(Status::Connected);
        conn.set_status(Status::Closed);

        assert_eq!(conn.status(), Status::Terminal);
        assert_eq!(*recorder.changes.lock(), vec![(Status::Init, Status::Terminal)]);
        // No transport was present, so nothing to close.
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retry_gate() {
        let conn = Connection::new("127.0.0.1:1", Protocol::Tcp, None);
        assert!(conn.retry());
        assert_eq!(conn.status(), Status::Connecting);
        assert!(!conn.retry());

        conn.set_status(Status::Closed);
        assert!(conn.retry());

        conn.terminal();
        assert!(!conn.retry());
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("kcp".parse::<Protocol>().unwrap(), Protocol::Kcp);
        assert!("quic".parse::<Protocol>().is_err());
        assert_eq!(Protocol::Udp.framing(), Framing::Datagram);
        assert_eq!(Protocol::Kcp.framing(), Framing::Stream);
    }

    #[tokio::test]
    async fn test_connect_fires_hooks() {
        let (conn, _peer, recorder) = tcp_pair().await;

        assert!(conn.is_ok());
        assert!(conn.remote_addr().is_some());
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.changes.lock(),
            vec![
                (Status::Init, Status::Connecting),
                (Status::Connecting, Status::Connected)
            ]
        );

        // Already connected: the gate refuses a second dial.
        conn.connect().await.unwrap();
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _peer, recorder) = tcp_pair().await;

        conn.close();
        conn.close();

        assert_eq!(conn.status(), Status::Closed);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            conn.read_frame().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_terminal_refuses_connect() {
        let (conn, _peer, recorder) = tcp_pair().await;

        conn.terminal();
        assert_eq!(conn.status(), Status::Terminal);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);

        assert!(matches!(conn.connect().await, Err(TransportError::Terminal)));
        assert_eq!(conn.status(), Status::Terminal);
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_closed() {
        // Grab a free port, then release it so the dial is refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let conn = Connection::new(addr.to_string(), Protocol::Tcp, None);
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Dial { .. }));
        assert_eq!(conn.status(), Status::Closed);
        assert!(conn.retry());
    }

    #[tokio::test]
    async fn test_tcp_frames_flow() {
        let (conn, peer, _recorder) = tcp_pair().await;
        let accepted = Connection::accepted_tcp(peer, None);
        assert_eq!(accepted.status(), Status::Connected);

        conn.write_frame(&[0xAB; 64]).await.unwrap();
        assert_eq!(accepted.read_frame().await.unwrap(), vec![0xAB; 64]);

        accepted.write_frame(&[0xCD; 1514]).await.unwrap();
        assert_eq!(conn.read_frame().await.unwrap(), vec![0xCD; 1514]);

        assert_eq!(conn.stats().tx_frames, 1);
        assert_eq!(conn.stats().rx_bytes, 1514);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_read() {
        let (conn, _peer, _recorder) = tcp_pair().await;
        let conn = Arc::new(conn);

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.read_frame().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();

        let result = reader.await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_violations_drop_then_close() {
        let (conn, peer, recorder) = tcp_pair().await;
        let loose = Connection::accepted_tcp(peer, None).with_bounds(1, 1514);

        for _ in 0..MAX_FRAME_VIOLATIONS {
            loose.write_frame(&[0u8; 4]).await.unwrap();
        }
        for _ in 0..MAX_FRAME_VIOLATIONS {
            assert!(conn.read_frame().await.unwrap_err().is_frame_violation());
        }

        assert_eq!(conn.stats().dropped, MAX_FRAME_VIOLATIONS as u64);
        assert_eq!(conn.status(), Status::Closed);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_udp_frames_flow() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let block = Some(Arc::new(CipherBlock::from_secret("udp").unwrap()));
        let conn = Connection::new(addr.to_string(), Protocol::Udp, block.clone());
        conn.connect().await.unwrap();
        conn.write_frame(&[1u8; 100]).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        let codec = DataStream::new(Framing::Datagram).with_block(block);
        assert_eq!(codec.decode(&buf[..n]).unwrap(), vec![1u8; 100]);

        let reply = codec.encode(&[2u8; 20]).unwrap();
        server.send_to(&reply, from).await.unwrap();
        assert_eq!(conn.read_frame().await.unwrap(), vec![2u8; 20]);
    }

    #[tokio::test]
    async fn test_udp_idle_timeout() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let conn = Connection::new(addr.to_string(), Protocol::Udp, None)
            .with_idle_timeout(Some(Duration::from_millis(100)));
        conn.connect().await.unwrap();

        assert!(matches!(
            conn.read_frame().await,
            Err(TransportError::IdleTimeout)
        ));
        assert_eq!(conn.status(), Status::Closed);
    }

    #[tokio::test]
    async fn test_peer_hangup_closes() {
        let (conn, peer, _recorder) = tcp_pair().await;
        let accepted = Connection::accepted_tcp(peer, None);
        let recorder = recorded(&accepted);

        drop(conn);
        let err = accepted.read_frame().await.unwrap_err();
        assert!(err.is_fatal());

        assert_eq!(accepted.status(), Status::Closed);
        assert!(!accepted.is_ok());
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.changes.lock(),
            vec![(Status::Connected, Status::Closed)]
        );
    }

    #[tokio::test]
    async fn test_stream_idle_timeout_closes() {
        let (conn, _peer, recorder) = tcp_pair().await;
        let conn = conn.with_idle_timeout(Some(Duration::from_millis(100)));

        assert!(matches!(
            conn.read_frame().await,
            Err(TransportError::IdleTimeout)
        ));
        assert_eq!(conn.status(), Status::Closed);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_interrupts_blocked_write() {
        // The peer never reads, so the socket buffers fill and writes stall.
        let (conn, _peer, _recorder) = tcp_pair().await;
        let conn = Arc::new(conn);

        let writer = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                loop {
                    if let Err(e) = conn.write_frame(&[0x5A; 1514]).await {
                        return e;
                    }
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!writer.is_finished());

        conn.close();
        let err = tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("blocked write was not interrupted")
            .unwrap();
        assert!(matches!(
            err,
            TransportError::ConnectionClosed | TransportError::NotConnected
        ));
        assert_eq!(conn.status(), Status::Closed);
    }
}
