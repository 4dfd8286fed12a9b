//! Core types shared by every layer of the switch.
//!
//! This module has no transport dependencies. It holds the constants, the
//! error taxonomy and the narrow traits consumed from collaborators.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in whole seconds since the Unix epoch.
///
/// All registry and connection timestamps use this resolution.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
