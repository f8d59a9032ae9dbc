//! Server side of the activation protocol: fan-out, persistence, history.

pub mod server;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use chrono::Utc;
use tracing::{info, warn};
use weft_network::{run_socket, BroadcastReport, ConnectionHub, RealtimeServer, ViewerChannel};
use weft_ops::ActivityLog;
use weft_store::EventStore;
use weft_types::{
    analytics::{AnalyticsOverview, NfcStats},
    config::StorageConfig,
    events::{
        ActivationEvent, ConnectionEvent, ConnectionState, EventKind, EventPayload,
        LifecyclePhase, SnapshotEvent, SystemEvent,
    },
    protocol::ServerMessage,
    record::{EventQuery, NfcEvent, NfcEventPayload, StoredEvent},
    Result, WeftError,
};

pub use server::{router, serve, serve_listener};

pub struct Coordinator<N>
where
    N: RealtimeServer,
{
    hub: Arc<ConnectionHub>,
    store: EventStore,
    network: N,
    activity: ActivityLog,
    storage: StorageConfig,
}

impl<N> Coordinator<N>
where
    N: RealtimeServer,
{
    pub fn new(
        storage: StorageConfig,
        store: EventStore,
        network: N,
        activity: ActivityLog,
    ) -> Self {
        Self {
            hub: Arc::new(ConnectionHub::new()),
            store,
            network,
            activity,
            storage,
        }
    }

    pub fn hub(&self) -> Arc<ConnectionHub> {
        Arc::clone(&self.hub)
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub async fn boot(&self) -> Result<()> {
        self.network.run().await?;
        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::Boot,
            "coordinator boot complete",
        ))
        .await
    }

    /// Publish a lifecycle transition. A failed publish is only logged.
    pub async fn announce(&self, phase: LifecyclePhase, details: impl Into<String>) {
        if let Err(err) = self.publish(SystemEvent::lifecycle(phase, details)).await {
            warn!(?phase, "failed to publish lifecycle event: {err}");
        }
    }

    /// Tell every ready viewer to switch to visual `index`. The index is not
    /// range-checked here; viewers validate it against their own catalog.
    pub async fn activate(&self, index: i64) -> Result<BroadcastReport> {
        let report = self.hub.broadcast(&ServerMessage::activate(index))?;
        info!(
            index,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "activation broadcast"
        );
        self.publish(SystemEvent::new(
            EventKind::Activation,
            EventPayload::Activation(ActivationEvent {
                index,
                delivered: report.delivered,
                skipped: report.skipped,
                failed: report.failed,
            }),
        ))
        .await?;
        Ok(report)
    }

    /// Validate and store a viewer's snapshot. Nothing is written when the
    /// payload is incomplete.
    pub async fn record_snapshot(&self, payload: NfcEventPayload) -> Result<StoredEvent> {
        let record = payload.validate(Utc::now())?;
        let texture_name = record.texture_name.clone();
        let nfc_index = record.nfc_index;

        let stored = self
            .with_store(move |store| store.insert(&record))
            .await
            .map_err(|err| {
                warn!(nfc_index, "failed to persist snapshot: {err}");
                err
            })?;

        info!(id = stored.id, nfc_index, size = stored.size, "snapshot stored");
        self.publish(SystemEvent::new(
            EventKind::Snapshot,
            EventPayload::Snapshot(SnapshotEvent {
                id: stored.id,
                nfc_index,
                texture_name,
                size: stored.size,
            }),
        ))
        .await?;
        Ok(stored)
    }

    pub async fn list_events(
        &self,
        limit: Option<usize>,
        nfc_index: Option<i64>,
    ) -> Result<Vec<NfcEvent>> {
        let query = EventQuery {
            limit: self.effective_limit(limit),
            nfc_index,
        };
        self.with_store(move |store| store.list(query)).await
    }

    pub async fn overview(&self) -> Result<AnalyticsOverview> {
        self.with_store(|store| store.overview()).await
    }

    pub async fn nfc_stats(&self, nfc_index: i64) -> Result<NfcStats> {
        self.with_store(move |store| store.nfc_stats(nfc_index)).await
    }

    /// Own one viewer socket for its whole life.
    pub async fn serve_viewer(&self, socket: WebSocket) {
        let channel = match ViewerChannel::attach(&self.hub) {
            Ok(channel) => channel,
            Err(err) => {
                warn!("rejecting viewer: {err}");
                return;
            }
        };
        let id = channel.id;
        self.publish_connection(id, ConnectionState::Opened).await;

        let summary = run_socket(socket, self.hub(), channel).await;
        info!(
            connection = id,
            pings = summary.pings,
            ignored = summary.ignored,
            "viewer socket closed"
        );
        self.publish_connection(id, ConnectionState::Closed).await;
    }

    fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.storage.default_list_limit)
            .clamp(1, self.storage.max_list_limit.max(1))
    }

    async fn publish_connection(&self, connection_id: u64, state: ConnectionState) {
        let event = SystemEvent::new(
            EventKind::Connection,
            EventPayload::Connection(ConnectionEvent {
                connection_id,
                state,
                live_connections: self.hub.len(),
            }),
        );
        if let Err(err) = self.publish(event).await {
            warn!(connection = connection_id, "failed to publish connection event: {err}");
        }
    }

    async fn publish(&self, event: SystemEvent) -> Result<()> {
        let cloned = event.clone();
        self.network.publish(event).await?;
        self.activity.record_event(cloned).await?;
        Ok(())
    }

    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(EventStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|err| coordinator_error(format!("storage task failed: {err}")))?
    }
}

pub fn coordinator_error(message: impl Into<String>) -> WeftError {
    WeftError::Coordinator(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use weft_network::{ClientTransport, LocalServer};

    struct Recorder {
        open: bool,
        seen: Mutex<Vec<ServerMessage>>,
    }

    impl ClientTransport for Recorder {
        fn is_ready(&self) -> bool {
            self.open
        }

        fn deliver(&self, message: &ServerMessage) -> Result<()> {
            self.seen.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn coordinator() -> Coordinator<LocalServer> {
        Coordinator::new(
            StorageConfig::default(),
            EventStore::open_in_memory().unwrap(),
            LocalServer::new(16),
            ActivityLog::new(),
        )
    }

    #[tokio::test]
    async fn activation_reaches_open_viewers_and_is_logged() {
        let coordinator = coordinator();
        let open = Arc::new(Recorder {
            open: true,
            seen: Mutex::new(Vec::new()),
        });
        let closed = Arc::new(Recorder {
            open: false,
            seen: Mutex::new(Vec::new()),
        });
        coordinator.hub().register(open.clone()).unwrap();
        coordinator.hub().register(closed.clone()).unwrap();

        let report = coordinator.activate(2).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(open.seen.lock().unwrap()[0], ServerMessage::activate(2));
        assert!(closed.seen.lock().unwrap().is_empty());
        assert_eq!(coordinator.activity().count_kind(EventKind::Activation).await, 1);
    }

    #[tokio::test]
    async fn incomplete_snapshot_writes_nothing() {
        let coordinator = coordinator();
        let err = coordinator
            .record_snapshot(NfcEventPayload {
                nfc_index: Some(1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(coordinator.list_events(None, None).await.unwrap().is_empty());
        assert_eq!(coordinator.activity().count_kind(EventKind::Snapshot).await, 0);
    }

    #[tokio::test]
    async fn list_limit_is_clamped() {
        let coordinator = coordinator();
        assert_eq!(coordinator.effective_limit(None), 50);
        assert_eq!(coordinator.effective_limit(Some(0)), 1);
        assert_eq!(coordinator.effective_limit(Some(1_000_000)), 1200);
    }
}
