//! Tunnel transports.
//!
//! - **Frame codec**: [`DataStream`] bounds, frames and optionally seals
//!   every payload
//! - **Connection**: [`Connection`] with its [`Status`] state machine and
//!   [`ConnectionListener`] hooks
//! - **Server**: [`Server`] accept loop with admission and retirement queues
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Point / NetworkWorker              │
//! ├─────────────────────────────────────────┤
//! │   Connection  ◀── Server (accept)       │  ← This module
//! ├─────────────────────────────────────────┤
//! │   DataStream (bounds, cipher block)     │
//! ├─────────────────────────────────────────┤
//! │        TCP  /  UDP  /  KCP              │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod server;
mod status;
mod stream;
mod wire;

pub use connection::*;
pub use server::*;
pub use status::*;
pub use stream::*;
