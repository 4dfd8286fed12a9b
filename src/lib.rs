//! # overlay-switch
//!
//! Control and transport core of an overlay virtual-network switch.
//!
//! A switch carries raw link-layer frames between remote endpoints over TCP,
//! UDP or KCP tunnels, optionally sealed with XChaCha20-Poly1305. This crate
//! provides:
//!
//! - **Transport**: a frame codec with link-layer size bounds, connections
//!   with a lifecycle state machine, and an accepting server
//! - **Registries**: concurrent stores of neighbors, points, links, flows
//!   and networks, with first-seen and last-seen observers
//! - **Link management**: supervised tunnel endpoints and the per-network
//!   worker that provisions and tears them down
//!
//! ## Feature Flags
//!
//! - `crypto` (default): cipher block
//! - `transport` (default): codec, connection and server
//! - `client` (default): supervised tunnel endpoints
//! - `switch` (default): network workers, registry bundle, index view
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and collaborator traits (always included)
//! - [`registry`]: concurrent registries (always included)
//! - [`crypto`]: cipher block (requires `crypto` feature)
//! - [`transport`]: tunnel transports (requires `transport` feature)
//! - [`client`]: tunnel endpoints (requires `client` feature)
//! - [`switch`]: link management (requires `switch` feature)
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use overlay_switch::prelude::*;
//!
//! # async fn run() -> Result<(), SwitchError> {
//! let registry = Arc::new(Registry::new());
//! let mut config = NetworkConfig::new("example");
//! config.links.push(PointConfig::new("192.168.0.1"));
//!
//! let worker = NetworkWorker::new(config, None, registry);
//! for link in worker.start(&"4f1c5a7e-switch") {
//!     let point = link.await.map_err(|e| SwitchError::Config(e.to_string()))??;
//!     println!("{} -> {}", point.alias(), point.addr());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Concurrent registries (always included)
pub mod registry;

// Cipher block (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Transports (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Tunnel endpoints (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Link management (feature-gated)
#[cfg(feature = "switch")]
#[cfg_attr(docsrs, doc(cfg(feature = "switch")))]
pub mod switch;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::registry::{Entry, KvCache, MemoryCache, SafeMap, Store, Watcher};

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{CipherBlock, CryptConfig};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Connection, ConnectionListener, DataStream, Framing, Protocol, Server, ServerBuilder,
        ServerConfig, Status,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{Point, PointConfig, RetryPolicy};

    #[cfg(feature = "switch")]
    pub use crate::switch::{Index, LinkHandle, NetworkConfig, NetworkWorker, Registry};
}

// Re-export commonly used items at crate root
pub use crate::core::{SwitchError, TransportError};

#[cfg(feature = "transport")]
pub use transport::{Connection, DataStream, Server, Status};
