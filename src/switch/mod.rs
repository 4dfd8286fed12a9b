//! Switch-side link management.
//!
//! A [`NetworkWorker`] supervises the outbound links of one logical network
//! and publishes its accounts and address pool into the shared
//! [`Registry`]. [`Index`] is the read-only view of that registry.

mod config;
mod index;
mod registry;
mod worker;

pub use config::*;
pub use index::*;
pub use registry::*;
pub use worker::*;
