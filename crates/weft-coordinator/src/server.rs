use std::{future::Future, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::WebSocketUpgrade,
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};
use weft_network::{BroadcastReport, RealtimeServer};
use weft_types::{
    analytics::{AnalyticsOverview, NfcStats},
    config::NetworkConfig,
    events::LifecyclePhase,
    record::{NfcEvent, NfcEventPayload},
    Result, WeftError,
};

use crate::{coordinator_error, Coordinator};

struct AppState<N: RealtimeServer> {
    coordinator: Arc<Coordinator<N>>,
    serves_static: bool,
}

impl<N: RealtimeServer> Clone for AppState<N> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            serves_static: self.serves_static,
        }
    }
}

/// Error body returned by every endpoint: `{"error": "..."}`.
pub struct ApiError(WeftError);

impl From<WeftError> for ApiError {
    fn from(err: WeftError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            warn!("request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(WeftError::Validation(message.into()))
}

#[derive(Debug, Deserialize)]
struct ActivationRequest {
    index: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TriggerParams {
    nfc: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    nfc_index: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ActivationResponse {
    status: &'static str,
    index: i64,
    #[serde(flatten)]
    report: BroadcastReport,
}

#[derive(Debug, Serialize)]
struct CreatedResponse {
    success: bool,
    id: i64,
    size: usize,
}

/// Build the coordinator's routes. When `static_dir` is set, unmatched paths
/// are served from it.
pub fn router<N>(coordinator: Arc<Coordinator<N>>, static_dir: Option<&str>) -> Router
where
    N: RealtimeServer + 'static,
{
    let state = AppState {
        coordinator,
        serves_static: static_dir.is_some(),
    };

    let router = Router::new()
        .route("/", get(root::<N>))
        .route("/ws", get(upgrade::<N>))
        .route("/ping", get(ping))
        .route("/api/nfc", post(activate::<N>))
        .route("/trigger", get(trigger::<N>))
        .route(
            "/api/nfc-events",
            post(create_event::<N>).get(list_events::<N>),
        )
        .route("/api/analytics/overview", get(overview::<N>))
        .route("/api/analytics/nfc/:index", get(nfc_stats::<N>))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.layer(CorsLayer::permissive())
}

/// Bind the configured address and serve until the listener fails.
pub async fn serve<N>(coordinator: Arc<Coordinator<N>>, network: &NetworkConfig) -> Result<()>
where
    N: RealtimeServer + 'static,
{
    let addr = format!("{}:{}", network.bind_addr, network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| coordinator_error(format!("failed to bind {addr}: {err}")))?;
    serve_listener(
        coordinator,
        listener,
        network.static_dir.as_deref(),
        std::future::pending(),
    )
    .await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Publishes `Ready` once the socket is accepting and `Shutdown` when the
/// server loop returns, whether it stopped cleanly or not.
pub async fn serve_listener<N, F>(
    coordinator: Arc<Coordinator<N>>,
    listener: TcpListener,
    static_dir: Option<&str>,
    shutdown: F,
) -> Result<()>
where
    N: RealtimeServer + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|err| coordinator_error(format!("listener has no address: {err}")))?;
    info!("Coordinator listening on http://{addr}");
    coordinator
        .announce(LifecyclePhase::Ready, format!("listening on {addr}"))
        .await;

    let app = router(Arc::clone(&coordinator), static_dir);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| coordinator_error(format!("server stopped: {err}")));

    let details = match &served {
        Ok(()) => format!("stopped listening on {addr}"),
        Err(err) => err.to_string(),
    };
    coordinator.announce(LifecyclePhase::Shutdown, details).await;
    served
}

async fn root<N>(State(state): State<AppState<N>>, ws: Option<WebSocketUpgrade>) -> Response
where
    N: RealtimeServer + 'static,
{
    match ws {
        Some(ws) => viewer_upgrade(state, ws),
        None if state.serves_static => Redirect::temporary("/index.html").into_response(),
        None => "weft coordinator".into_response(),
    }
}

async fn upgrade<N>(State(state): State<AppState<N>>, ws: WebSocketUpgrade) -> Response
where
    N: RealtimeServer + 'static,
{
    viewer_upgrade(state, ws)
}

fn viewer_upgrade<N>(state: AppState<N>, ws: WebSocketUpgrade) -> Response
where
    N: RealtimeServer + 'static,
{
    let coordinator = state.coordinator;
    ws.on_upgrade(move |socket| async move { coordinator.serve_viewer(socket).await })
}

async fn ping() -> &'static str {
    "pong"
}

async fn activate<N>(
    State(state): State<AppState<N>>,
    body: std::result::Result<Json<ActivationRequest>, JsonRejection>,
) -> std::result::Result<Json<ActivationResponse>, ApiError>
where
    N: RealtimeServer + 'static,
{
    let Json(request) = body.map_err(|err| bad_request(err.body_text()))?;
    let index = request.index.ok_or_else(|| bad_request("index is required"))?;
    broadcast(&state, index).await
}

async fn trigger<N>(
    State(state): State<AppState<N>>,
    params: std::result::Result<Query<TriggerParams>, QueryRejection>,
) -> std::result::Result<Json<ActivationResponse>, ApiError>
where
    N: RealtimeServer + 'static,
{
    let Query(params) = params.map_err(|err| bad_request(err.body_text()))?;
    let index = params.nfc.ok_or_else(|| bad_request("nfc is required"))?;
    broadcast(&state, index).await
}

async fn broadcast<N>(
    state: &AppState<N>,
    index: i64,
) -> std::result::Result<Json<ActivationResponse>, ApiError>
where
    N: RealtimeServer + 'static,
{
    let report = state.coordinator.activate(index).await?;
    Ok(Json(ActivationResponse {
        status: "ok",
        index,
        report,
    }))
}

async fn create_event<N>(
    State(state): State<AppState<N>>,
    body: std::result::Result<Json<NfcEventPayload>, JsonRejection>,
) -> std::result::Result<Json<CreatedResponse>, ApiError>
where
    N: RealtimeServer + 'static,
{
    let Json(payload) = body.map_err(|err| bad_request(err.body_text()))?;
    let stored = state.coordinator.record_snapshot(payload).await?;
    Ok(Json(CreatedResponse {
        success: true,
        id: stored.id,
        size: stored.size,
    }))
}

async fn list_events<N>(
    State(state): State<AppState<N>>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> std::result::Result<Json<Vec<NfcEvent>>, ApiError>
where
    N: RealtimeServer + 'static,
{
    let Query(params) = params.map_err(|err| bad_request(err.body_text()))?;
    let events = state
        .coordinator
        .list_events(params.limit, params.nfc_index)
        .await?;
    Ok(Json(events))
}

async fn overview<N>(
    State(state): State<AppState<N>>,
) -> std::result::Result<Json<AnalyticsOverview>, ApiError>
where
    N: RealtimeServer + 'static,
{
    Ok(Json(state.coordinator.overview().await?))
}

async fn nfc_stats<N>(
    State(state): State<AppState<N>>,
    Path(index): Path<i64>,
) -> std::result::Result<Json<NfcStats>, ApiError>
where
    N: RealtimeServer + 'static,
{
    Ok(Json(state.coordinator.nfc_stats(index).await?))
}
