//! Presence classification

use serde::{Deserialize, Serialize};

/// Liveness class derived from the last heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Idle,
    Offline,
}

/// Presence view for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub device_id: String,
    pub last_heartbeat_at: u64,
    pub status: PresenceStatus,
}

/// Pure status function of the last heartbeat and the observing clock
pub fn status_at(
    last_heartbeat_at: u64,
    now: u64,
    live_window_secs: u64,
    idle_window_secs: u64,
) -> PresenceStatus {
    let age = now.saturating_sub(last_heartbeat_at);
    if age <= live_window_secs {
        PresenceStatus::Online
    } else if age <= idle_window_secs {
        PresenceStatus::Idle
    } else {
        PresenceStatus::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_thresholds() {
        let t0 = 1_700_000_000;
        assert_eq!(status_at(t0, t0, 60, 300), PresenceStatus::Online);
        assert_eq!(status_at(t0, t0 + 60, 60, 300), PresenceStatus::Online);
        assert_eq!(status_at(t0, t0 + 120, 60, 300), PresenceStatus::Idle);
        assert_eq!(status_at(t0, t0 + 300, 60, 300), PresenceStatus::Idle);
        assert_eq!(status_at(t0, t0 + 600, 60, 300), PresenceStatus::Offline);
    }

    #[test]
    fn test_clock_skew_is_online() {
        // A heartbeat stamped slightly in the future reads as fresh.
        assert_eq!(status_at(100, 90, 60, 300), PresenceStatus::Online);
    }
}
