//! Event bus types

use serde::{Deserialize, Serialize};

/// The finite topic set published by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    DeviceRegistered,
    DeviceAuthenticated,
    DataSubmitted,
    BatchCreated,
    BatchAnchorProgress,
    DeviceStatusChange,
    ProposalCreated,
    ProposalApproved,
    ProposalRejected,
    ProposalExecuted,
    ProposalExpired,
}

impl EventKind {
    /// Every topic, for subscribe-all sessions
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::DeviceRegistered,
            EventKind::DeviceAuthenticated,
            EventKind::DataSubmitted,
            EventKind::BatchCreated,
            EventKind::BatchAnchorProgress,
            EventKind::DeviceStatusChange,
            EventKind::ProposalCreated,
            EventKind::ProposalApproved,
            EventKind::ProposalRejected,
            EventKind::ProposalExecuted,
            EventKind::ProposalExpired,
        ]
    }
}

/// One published event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic publish sequence
    pub event_id: u64,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    /// Unix seconds
    pub at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_wire_names() {
        let json = serde_json::to_string(&EventKind::BatchAnchorProgress).unwrap();
        assert_eq!(json, "\"BATCH_ANCHOR_PROGRESS\"");
        let back: EventKind = serde_json::from_str("\"DEVICE_STATUS_CHANGE\"").unwrap();
        assert_eq!(back, EventKind::DeviceStatusChange);
    }
}
