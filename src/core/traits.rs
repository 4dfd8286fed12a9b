//! Interfaces consumed from collaborators outside the core.

/// The owning switch as seen by a network worker.
///
/// A worker asks for its identity when it starts, so every worker started
/// by the same switch reports the switch's UUID.
pub trait IdentitySource: Send + Sync {
    /// Stable identifier of the switch.
    fn uuid(&self) -> String;
}

impl IdentitySource for String {
    fn uuid(&self) -> String {
        self.clone()
    }
}

impl IdentitySource for &str {
    fn uuid(&self) -> String {
        (*self).to_string()
    }
}
