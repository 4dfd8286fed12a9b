//! Supervised tunnel endpoint.
//!
//! A [`Point`] owns one [`Connection`] to a switch and a background task
//! that keeps it up: dial, pump inbound frames, and after a transport loss
//! close and dial again with exponential backoff. The task ends when the
//! point is stopped or its connection becomes terminal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::PointConfig;
use crate::core::{
    INBOUND_QUEUE_SIZE, RECONNECT_INITIAL_INTERVAL, RECONNECT_MAX_INTERVAL, SwitchError,
    TransportError, TransportResult, unix_now,
};
use crate::registry::{Entry, Persist};
use crate::transport::{Connection, ConnectionListener, Status};

/// Reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First delay after a failure.
    pub initial: Duration,
    /// Upper bound of the delay.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: RECONNECT_INITIAL_INTERVAL,
            max: RECONNECT_MAX_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Create a policy doubling from `initial` up to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay following `current`.
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Logs status changes of a point's connection.
struct StatusLogger {
    alias: String,
}

impl ConnectionListener for StatusLogger {
    fn on_status(&self, conn: &Connection, old: Status, new: Status) {
        info!("Point {} {} {} -> {}", self.alias, conn, old, new);
    }
}

/// A tunnel endpoint connected to a switch.
pub struct Point {
    uuid: String,
    config: PointConfig,
    conn: Arc<Connection>,
    retry: RetryPolicy,
    new_time: i64,
    initialized: AtomicBool,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl Point {
    /// Create a point from `config`. Unset fields get their defaults.
    pub fn new(mut config: PointConfig) -> Result<Self, SwitchError> {
        config.correct();
        if config.connection.is_empty() {
            return Err(SwitchError::Config("point has no connection".into()));
        }

        let block = match &config.crypt {
            Some(crypt) => crypt.block()?.map(Arc::new),
            None => None,
        };
        let conn = Connection::new(config.connection.clone(), config.protocol, block);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
        let (stop, _) = watch::channel(false);

        Ok(Self {
            uuid: Uuid::new_v4().to_string(),
            config,
            conn: Arc::new(conn),
            retry: RetryPolicy::default(),
            new_time: unix_now(),
            initialized: AtomicBool::new(false),
            stop,
            task: Mutex::new(None),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        })
    }

    /// Replace the reconnect backoff.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Install the connection hooks. Idempotent.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        self.conn.set_listener(Arc::new(StatusLogger {
            alias: self.config.alias.clone(),
        }));
        debug!("Point {} initialized for {}", self.config.alias, self.conn);
    }

    /// Spawn the supervision task. Does nothing if it already runs.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        self.initialize();
        info!("Point {} start on {}", self.config.alias, self.conn);

        let point = Arc::clone(self);
        *task = Some(tokio::spawn(async move { point.supervise().await }));
    }

    /// Terminate the connection and end the supervision task.
    pub fn stop(&self) {
        if !self.stop.send_replace(true) {
            info!("Point {} stop on {}", self.config.alias, self.conn);
        }
        self.conn.terminal();
    }

    /// Whether the supervision task is alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Send one frame to the switch.
    pub async fn send(&self, frame: &[u8]) -> TransportResult<()> {
        self.conn.write_frame(frame).await
    }

    /// Take the receiver of inbound frames. Only the first call gets it.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.inbound_rx.lock().take()
    }

    /// Switch address this point connects to.
    pub fn addr(&self) -> &str {
        self.conn.address()
    }

    /// Unique id of this point.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Display name.
    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    /// Logical network.
    pub fn network(&self) -> &str {
        &self.config.network
    }

    /// Effective configuration.
    pub fn config(&self) -> &PointConfig {
        &self.config
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Connection status.
    pub fn status(&self) -> Status {
        self.conn.status()
    }

    /// Creation time (Unix seconds).
    pub fn new_time(&self) -> i64 {
        self.new_time
    }

    /// Seconds since creation.
    pub fn up_time(&self) -> i64 {
        unix_now() - self.new_time
    }

    async fn supervise(&self) {
        let mut stop = self.stop.subscribe();
        let mut backoff = self.retry.initial;
        loop {
            if *stop.borrow_and_update() {
                break;
            }

            match self.conn.connect().await {
                Err(TransportError::Terminal) => break,
                Err(e) => warn!("Point {} connect failed: {}", self.config.alias, e),
                Ok(()) if self.conn.is_ok() => {
                    backoff = self.retry.initial;
                    self.pump(&mut stop).await;
                    self.conn.close();
                }
                Ok(()) => {}
            }

            if self.conn.status().is_terminal() {
                break;
            }
            debug!("Point {} retry in {:?}", self.config.alias, backoff);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = stop.changed() => break,
            }
            backoff = self.retry.next(backoff);
        }
        debug!("Point {} supervision ended", self.config.alias);
    }

    /// Move inbound frames into the queue until the transport is lost.
    async fn pump(&self, stop: &mut watch::Receiver<bool>) {
        loop {
            let result = tokio::select! {
                result = self.conn.read_frame() => result,
                _ = stop.changed() => return,
            };
            match result {
                Ok(frame) => {
                    if let Err(TrySendError::Full(_)) = self.inbound_tx.try_send(frame) {
                        debug!("Point {} inbound queue full, frame dropped", self.config.alias);
                    }
                }
                Err(e) if e.is_fatal() => {
                    info!("Point {} lost {}: {}", self.config.alias, self.conn, e);
                    return;
                }
                Err(e) => debug!("Point {} dropped frame: {}", self.config.alias, e),
            }
        }
    }
}

impl Entry for Point {
    fn key(&self) -> String {
        self.addr().to_string()
    }
}

impl Persist for Point {
    fn fields(&self) -> HashMap<String, String> {
        HashMap::from([
            ("uuid".to_string(), self.uuid.clone()),
            ("alias".to_string(), self.config.alias.clone()),
            ("network".to_string(), self.config.network.clone()),
            ("protocol".to_string(), self.config.protocol.to_string()),
            ("status".to_string(), self.status().to_string()),
        ])
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("uuid", &self.uuid)
            .field("alias", &self.config.alias)
            .field("connection", &self.conn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptConfig;
    use crate::transport::{Protocol, Server, ServerBuilder};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(40))
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..300 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    async fn switch(protocol: Protocol, crypt: Option<&CryptConfig>) -> Arc<Server> {
        let block = crypt
            .and_then(|c| c.block().unwrap())
            .map(Arc::new);
        let config = ServerBuilder::new().protocol(protocol).block(block).build();
        let server = Arc::new(Server::new("127.0.0.1:0", config));
        server.listen().await.unwrap();
        let accept = Arc::clone(&server);
        tokio::spawn(async move { accept.accept().await });
        server
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next(Duration::from_secs(16)), Duration::from_secs(30));
        assert_eq!(policy.next(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[test]
    fn test_new_corrects_config() {
        let point = Point::new(PointConfig::new("127.0.0.1")).unwrap();
        assert_eq!(point.addr(), "127.0.0.1:10002");
        assert_eq!(point.key(), "127.0.0.1:10002");
        assert_eq!(point.network(), "default");
        assert!(!point.alias().is_empty());
        assert_eq!(point.uuid().len(), 36);
        assert_eq!(point.status(), Status::Init);

        assert!(matches!(
            Point::new(PointConfig::default()),
            Err(SwitchError::Config(_))
        ));
    }

    #[test]
    fn test_unsupported_cipher_rejected() {
        let mut cfg = PointConfig::new("127.0.0.1:1");
        cfg.crypt = Some(CryptConfig {
            algorithm: "des".into(),
            secret: "x".into(),
        });
        assert!(matches!(Point::new(cfg), Err(SwitchError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_start_exchanges_frames() {
        let crypt = CryptConfig::new("point-secret");
        let server = switch(Protocol::Tcp, Some(&crypt)).await;

        let mut cfg = PointConfig::new(server.local_addr().unwrap().to_string());
        cfg.crypt = Some(crypt);
        let point = Arc::new(Point::new(cfg).unwrap().with_retry(fast_retry()));
        let mut inbound = point.take_inbound().unwrap();
        assert!(point.take_inbound().is_none());

        point.start();
        point.start();
        let remote = server.next_admitted().await.unwrap();
        wait_for(|| point.status() == Status::Connected).await;

        remote.write_frame(&[0x42; 98]).await.unwrap();
        assert_eq!(inbound.recv().await.unwrap(), vec![0x42; 98]);

        point.send(&[0x24; 60]).await.unwrap();
        assert_eq!(remote.read_frame().await.unwrap(), vec![0x24; 60]);

        point.stop();
        assert_eq!(point.status(), Status::Terminal);
        wait_for(|| !point.is_running()).await;
        server.close();
    }

    #[tokio::test]
    async fn test_reconnects_after_loss() {
        let server = switch(Protocol::Tcp, None).await;
        let cfg = PointConfig::new(server.local_addr().unwrap().to_string());
        let point = Arc::new(Point::new(cfg).unwrap().with_retry(fast_retry()));
        point.start();

        let first = server.next_admitted().await.unwrap();
        server.retire(first).await.unwrap();

        let second = server.next_admitted().await.unwrap();
        wait_for(|| point.status() == Status::Connected).await;
        second.write_frame(&[1u8; 20]).await.unwrap();
        assert_eq!(
            point.take_inbound().unwrap().recv().await.unwrap(),
            vec![1u8; 20]
        );

        point.stop();
        wait_for(|| !point.is_running()).await;
        server.close();
    }

    #[tokio::test]
    async fn test_stop_during_backoff() {
        // Nothing listens here, so every dial fails.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let point = Arc::new(
            Point::new(PointConfig::new(addr.to_string()))
                .unwrap()
                .with_retry(RetryPolicy::new(Duration::from_secs(30), Duration::from_secs(30))),
        );
        point.start();
        wait_for(|| point.status() == Status::Closed).await;

        point.stop();
        wait_for(|| !point.is_running()).await;
        assert_eq!(point.status(), Status::Terminal);
    }
}
