//! Tunnel endpoints.
//!
//! A [`Point`] is the client side of a tunnel: it dials a switch described
//! by a [`PointConfig`] and keeps the connection alive.

mod config;
mod point;

pub use config::*;
pub use point::*;
