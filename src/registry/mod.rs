//! Concurrent registries.
//!
//! [`SafeMap`] is the lock-owning map every registry is built on. [`Store`]
//! adds typed entries and a [`Listen`] observer sub-registry that is told
//! when a key is first seen and when it leaves.

mod cache;
mod listen;
mod models;
mod safemap;
mod store;

pub use cache::*;
pub use listen::*;
pub use models::*;
pub use safemap::*;
pub use store::*;
