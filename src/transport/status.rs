//! Connection lifecycle status.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a [`Connection`](super::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, never dialed.
    Init,
    /// A dial attempt is in flight.
    Connecting,
    /// Transport handle present, frames flow.
    Connected,
    /// Transport released. May be dialed again.
    Closed,
    /// Permanently closed. Never leaves this state.
    Terminal,
}

impl Status {
    /// Whether the status is absorbing.
    pub fn is_terminal(self) -> bool {
        self == Status::Terminal
    }

    /// Lowercase name used in logs and schemas.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Init => "init",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Closed => "closed",
            Status::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Init.to_string(), "init");
        assert_eq!(Status::Terminal.to_string(), "terminal");
    }

    #[test]
    fn test_only_terminal_is_terminal() {
        for status in [
            Status::Init,
            Status::Connecting,
            Status::Connected,
            Status::Closed,
        ] {
            assert!(!status.is_terminal());
        }
        assert!(Status::Terminal.is_terminal());
    }
}
