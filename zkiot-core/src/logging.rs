//! Logging conventions
//!
//! All crates log through `tracing` with structured fields. Use the field
//! names below so log lines stay greppable across subsystems.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Unrecoverable failures, invariant violations |
//! | WARN  | Retries, dropped subscribers, degraded operation |
//! | INFO  | State transitions, batch/anchor lifecycle |
//! | DEBUG | Operation flow, RPC round trips |

use serde::{Deserialize, Serialize};

/// Log level matching tracing levels, used by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Standard structured field names
pub mod fields {
    pub const DEVICE_ID: &str = "device_id";
    pub const BATCH_ID: &str = "batch_id";
    pub const CHAIN: &str = "chain";
    pub const TX_HASH: &str = "tx_hash";
    pub const PROPOSAL_ID: &str = "proposal_id";
    pub const CLIENT_ID: &str = "client_id";
    pub const COUNT: &str = "count";
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::parse("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("nope"), None);
        assert_eq!(LogLevel::default().as_str(), "info");
    }
}
