//! Constants of the switch transport and registries.
//!
//! Frame bounds and queue sizes are part of the wire and backpressure
//! behaviour and are shared by both ends of a tunnel.

use std::time::Duration;

// =============================================================================
// FRAME BOUNDS
// =============================================================================

/// Smallest payload a frame may carry.
pub const MIN_FRAME_SIZE: usize = 15;

/// Largest payload a frame may carry (a full Ethernet frame).
pub const MAX_FRAME_SIZE: usize = 1514;

/// Largest datagram read from a socket in one call.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

// =============================================================================
// STREAM FRAMING
// =============================================================================

/// Marker that opens every frame on a stream transport.
pub const STREAM_MAGIC: u16 = 0xFFFF;

/// Stream frame header size (magic + big-endian body length).
pub const STREAM_HEADER_SIZE: usize = 4;

// =============================================================================
// CIPHER BLOCK
// =============================================================================

/// Symmetric key size derived from the shared secret.
pub const CIPHER_KEY_SIZE: usize = 32;

/// XChaCha20 nonce size, carried in front of every sealed body.
pub const CIPHER_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const CIPHER_TAG_SIZE: usize = 16;

/// Bytes added to a payload by sealing it.
pub const CIPHER_OVERHEAD: usize = CIPHER_NONCE_SIZE + CIPHER_TAG_SIZE;

// =============================================================================
// SERVER QUEUES
// =============================================================================

/// Capacity of the queue of newly accepted connections.
pub const ADMISSION_QUEUE_SIZE: usize = 4;

/// Capacity of the queue of disconnected connections.
pub const RETIREMENT_QUEUE_SIZE: usize = 8;

/// Per-peer datagram queue on a demultiplexed UDP server.
pub const DATAGRAM_QUEUE_SIZE: usize = 128;

/// Maximum number of clients a server tracks at once.
pub const MAX_CLIENTS: usize = 1024;

// =============================================================================
// TIMING
// =============================================================================

/// Delay between bind attempts while a server is not listening.
pub const LISTEN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A datagram session with no traffic for this long is considered dead.
pub const DATAGRAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// First delay before reconnecting a point.
pub const RECONNECT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound of the reconnect backoff.
pub const RECONNECT_MAX_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// PROTOCOL POLICY
// =============================================================================

/// Consecutive frame violations after which a connection is closed.
pub const MAX_FRAME_VIOLATIONS: u32 = 16;

/// Frames buffered between a point's reader and its consumer.
pub const INBOUND_QUEUE_SIZE: usize = 1024;

// =============================================================================
// REGISTRY CAPACITIES
// =============================================================================

/// Neighbor table size.
pub const NEIGHBOR_CAPACITY: usize = 1024;

/// Point and link table size.
pub const POINT_CAPACITY: usize = 1024;

/// Online flow table size.
pub const ONLINE_CAPACITY: usize = 1024;

/// User and network table size.
pub const ACCOUNT_CAPACITY: usize = 1024;

/// Number of watchers a store accepts.
pub const LISTEN_CAPACITY: usize = 32;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Port a switch listens on for tunnel points.
pub const DEFAULT_SWITCH_PORT: u16 = 10002;

/// Interface MTU including the Ethernet header.
pub const DEFAULT_MTU: usize = 1518;

/// Network a point joins when none is configured.
pub const DEFAULT_NETWORK: &str = "default";
