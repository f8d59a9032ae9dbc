use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// High-level event bus message kinds moving through the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Activation,
    Connection,
    Snapshot,
}

/// Immutable event envelope for logging and live monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Activation(ActivationEvent),
    Connection(ConnectionEvent),
    Snapshot(SnapshotEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    Ready,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationEvent {
    pub index: i64,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Opened,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub connection_id: u64,
    pub state: ConnectionState,
    pub live_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub id: i64,
    pub nfc_index: i64,
    pub texture_name: Option<String>,
    pub size: usize,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(phase: LifecyclePhase, details: impl Into<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase,
                details: Some(details.into()),
            }),
        )
    }
}
