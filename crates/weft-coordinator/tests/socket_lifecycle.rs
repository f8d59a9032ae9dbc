use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use weft_coordinator::{serve_listener, Coordinator};
use weft_network::LocalServer;
use weft_ops::ActivityLog;
use weft_store::EventStore;
use weft_types::{
    config::StorageConfig,
    events::{EventPayload, LifecyclePhase},
    Result,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

fn coordinator() -> Arc<Coordinator<LocalServer>> {
    Arc::new(Coordinator::new(
        StorageConfig::default(),
        EventStore::open_in_memory().unwrap(),
        LocalServer::new(32),
        ActivityLog::new(),
    ))
}

async fn start(coordinator: Arc<Coordinator<LocalServer>>) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        serve_listener(coordinator, listener, None, async {
            let _ = stopped.await;
        })
        .await
    });
    Running { addr, stop, handle }
}

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let waited = timeout(Duration::from_secs(5), async {
        while !done() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn lifecycle_phases(coordinator: &Coordinator<LocalServer>) -> Vec<LifecyclePhase> {
    coordinator
        .activity()
        .snapshot_events()
        .await
        .into_iter()
        .filter_map(|event| match event.payload {
            EventPayload::Lifecycle(lifecycle) => Some(lifecycle.phase),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn viewer_socket_gets_pong_and_activation() {
    let coordinator = coordinator();
    let hub = coordinator.hub();
    let server = start(Arc::clone(&coordinator)).await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    wait_for("viewer registration", || hub.len() == 1).await;

    socket
        .send(Message::Text(json!({ "type": "ping" }).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut socket).await, json!({ "type": "pong" }));

    let report = coordinator.activate(2).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(next_json(&mut socket).await, json!({ "type": "activate", "index": 2 }));

    socket.close(None).await.unwrap();
    wait_for("viewer removal", || hub.is_empty()).await;

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn root_path_also_upgrades() {
    let coordinator = coordinator();
    let hub = coordinator.hub();
    let server = start(Arc::clone(&coordinator)).await;

    let (mut socket, _) = connect_async(format!("ws://{}/", server.addr)).await.unwrap();
    wait_for("viewer registration", || hub.len() == 1).await;
    coordinator.activate(0).await.unwrap();
    assert_eq!(next_json(&mut socket).await, json!({ "type": "activate", "index": 0 }));

    drop(socket);
    wait_for("viewer removal", || hub.is_empty()).await;
    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn serving_announces_ready_then_shutdown() {
    let coordinator = coordinator();
    let server = start(Arc::clone(&coordinator)).await;

    let waited = timeout(Duration::from_secs(5), async {
        while lifecycle_phases(&coordinator).await.is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "server never announced readiness");
    assert_eq!(lifecycle_phases(&coordinator).await, [LifecyclePhase::Ready]);

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
    assert_eq!(
        lifecycle_phases(&coordinator).await,
        [LifecyclePhase::Ready, LifecyclePhase::Shutdown]
    );
}
