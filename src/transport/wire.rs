//! Transport handles owned by a connection.
//!
//! A [`Wire`] is the live half of a connection: it exists from a successful
//! dial (or accept) until the connection is closed. Reads and writes lock
//! separate halves so a reader blocked on the socket never stalls a writer.
//! Shutting the wire down wakes every pending read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_kcp::KcpStream;

use super::stream::DataStream;
use crate::core::{MAX_DATAGRAM_SIZE, TransportError, TransportResult};

type StreamReader = Box<dyn AsyncRead + Send + Unpin>;
type StreamWriter = Box<dyn AsyncWrite + Send + Unpin>;

enum Reader {
    /// Length-prefixed frames over a reliable byte stream.
    Stream(StreamReader),
    Udp(Arc<UdpSocket>),
    /// Datagrams routed to this peer by a server's demultiplexer.
    Demux(mpsc::Receiver<Vec<u8>>),
}

enum Writer {
    Stream(StreamWriter),
    Udp(Arc<UdpSocket>),
    Demux {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
}

pub(crate) struct Wire {
    reader: Mutex<Reader>,
    writer: Mutex<Writer>,
    closed: watch::Sender<bool>,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
}

impl Wire {
    fn new(reader: Reader, writer: Writer, local: Option<SocketAddr>, remote: Option<SocketAddr>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
            local_addr: local,
            remote_addr: remote,
        }
    }

    /// Wrap a connected TCP stream.
    pub(crate) fn tcp(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let local = stream.local_addr().ok();
        let remote = stream.peer_addr().ok();
        let (read, write) = stream.into_split();
        Self::new(
            Reader::Stream(Box::new(read)),
            Writer::Stream(Box::new(write)),
            local,
            remote,
        )
    }

    /// Wrap a KCP session.
    pub(crate) fn kcp(stream: KcpStream, remote: SocketAddr) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self::new(
            Reader::Stream(Box::new(read)),
            Writer::Stream(Box::new(write)),
            None,
            Some(remote),
        )
    }

    /// Wrap a UDP socket already connected to its peer.
    pub(crate) fn udp(socket: UdpSocket) -> Self {
        let local = socket.local_addr().ok();
        let remote = socket.peer_addr().ok();
        let socket = Arc::new(socket);
        Self::new(
            Reader::Udp(Arc::clone(&socket)),
            Writer::Udp(socket),
            local,
            remote,
        )
    }

    /// Wrap one peer of a shared server socket.
    pub(crate) fn demux(socket: Arc<UdpSocket>, peer: SocketAddr, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        let local = socket.local_addr().ok();
        Self::new(
            Reader::Demux(rx),
            Writer::Demux { socket, peer },
            local,
            Some(peer),
        )
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub(crate) fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Wake pending reads and writes; the sockets close once the last
    /// handle is dropped.
    pub(crate) fn shutdown(&self) {
        self.closed.send_replace(true);
    }

    /// Receive one payload.
    ///
    /// `idle` bounds the wait. On a stream transport an expired wait may
    /// leave a frame half read, so the caller must treat it as fatal.
    pub(crate) async fn recv(&self, codec: &DataStream, idle: Option<Duration>) -> TransportResult<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut reader = tokio::select! {
            guard = self.reader.lock() => guard,
            _ = closed.changed() => return Err(TransportError::ConnectionClosed),
        };

        let read = async {
            match &mut *reader {
                Reader::Stream(half) => codec.read_frame(half).await,
                Reader::Udp(socket) => {
                    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
                    let n = socket.recv(&mut buf).await?;
                    Ok(codec.decode(&buf[..n])?)
                }
                Reader::Demux(rx) => {
                    let datagram = rx.recv().await.ok_or(TransportError::ConnectionClosed)?;
                    Ok(codec.decode(&datagram)?)
                }
            }
        };
        let bounded = async {
            match idle {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| TransportError::IdleTimeout)?,
                None => read.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = closed.changed() => Err(TransportError::ConnectionClosed),
        }
    }

    /// Send one payload.
    pub(crate) async fn send(&self, codec: &DataStream, payload: &[u8]) -> TransportResult<()> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut writer = tokio::select! {
            guard = self.writer.lock() => guard,
            _ = closed.changed() => return Err(TransportError::ConnectionClosed),
        };

        let write = async {
            match &mut *writer {
                Writer::Stream(half) => codec.write_frame(half, payload).await,
                Writer::Udp(socket) => {
                    let datagram = codec.encode(payload)?;
                    socket.send(&datagram).await?;
                    Ok(())
                }
                Writer::Demux { socket, peer } => {
                    let datagram = codec.encode(payload)?;
                    socket.send_to(&datagram, *peer).await?;
                    Ok(())
                }
            }
        };

        tokio::select! {
            result = write => result,
            _ = closed.changed() => Err(TransportError::ConnectionClosed),
        }
    }
}
