//! Error types for the switch core.

use std::io;

use thiserror::Error;

/// Errors in the cipher block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A cipher was requested without a shared secret.
    #[error("empty shared secret")]
    EmptySecret,

    /// The configured algorithm is not supported.
    #[error("unsupported cipher algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (short input, invalid tag or wrong key).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,
}

/// Errors produced by the frame codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload shorter than the lower bound.
    #[error("frame too short: {len} < {min}")]
    TooShort {
        /// Actual payload length.
        len: usize,
        /// Configured lower bound.
        min: usize,
    },

    /// Payload longer than the upper bound.
    #[error("frame too long: {len} > {max}")]
    TooLong {
        /// Actual payload length.
        len: usize,
        /// Configured upper bound.
        max: usize,
    },

    /// Stream header did not start with the frame marker.
    #[error("bad frame magic: {0:#06x}")]
    BadMagic(u16),

    /// Stream frame shorter than its header announces.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Length announced by the header.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// The cipher block rejected the body.
    #[error("cipher error: {0}")]
    Cipher(#[from] CryptoError),
}

impl FrameError {
    /// Whether the offending frame can be dropped while the connection
    /// stays usable.
    ///
    /// A bad marker means the stream lost alignment, so nothing after it
    /// can be trusted.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FrameError::BadMagic(_))
    }

    /// Whether the failure came from the cipher rather than the size check.
    pub fn is_cipher(&self) -> bool {
        matches!(self, FrameError::Cipher(_))
    }
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Frame codec error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error on an established transport.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Dialing the remote address failed.
    #[error("dial {address} failed: {source}")]
    Dial {
        /// Remote address.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Binding the local address failed.
    #[error("bind {address} failed: {source}")]
    Bind {
        /// Local address.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The address could not be resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// No transport handle is present.
    #[error("not connected")]
    NotConnected,

    /// The transport handle was released while the operation was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection was terminated and refuses to reconnect.
    #[error("connection terminated")]
    Terminal,

    /// A datagram session saw no traffic within its idle timeout.
    #[error("idle timeout")]
    IdleTimeout,

    /// The consumer side of a queue went away.
    #[error("queue closed")]
    QueueClosed,
}

impl TransportError {
    /// Check if this error only invalidates the current frame.
    pub fn is_frame_violation(&self) -> bool {
        matches!(self, TransportError::Frame(e) if e.is_recoverable())
    }

    /// Check if this error ends the current transport session.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Frame(e) => !e.is_recoverable(),
            TransportError::Io(_)
            | TransportError::NotConnected
            | TransportError::ConnectionClosed
            | TransportError::Terminal
            | TransportError::IdleTimeout => true,
            _ => false,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors from the concurrent registries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The map is at capacity and the key is new.
    #[error("registry full (capacity {capacity})")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Errors parsing a link-layer address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HwAddrError {
    /// Fewer than six octets.
    #[error("short hardware address: {0}")]
    Short(String),

    /// More than six octets.
    #[error("long hardware address: {0}")]
    Long(String),

    /// An octet is not a hex byte.
    #[error("bad hardware address octet: {0}")]
    BadOctet(String),
}

/// Errors from the external key/value cache.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The cache refused the operation.
    #[error("cache rejected operation: {0}")]
    Rejected(String),
}

/// Error returned from a listener or watcher hook.
///
/// Hooks are best-effort notifications. Their errors are logged and
/// otherwise ignored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

/// Top-level switch errors.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The owning network was stopped while the operation was pending.
    #[error("network {0} stopped")]
    Stopped(String),
}
