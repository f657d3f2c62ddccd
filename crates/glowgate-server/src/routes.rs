//! HTTP surface of the gateway.
//!
//! | Method | Path | Success | Failure |
//! |---|---|---|---|
//! | GET | `/scan` | – | 200 `NotImplemented` |
//! | POST | `/connect` | 200 | 405 (restart on `ScanFailed`) |
//! | POST | `/disconnect` | 200 | 405 |
//! | POST | `/event` | 200 | 400 validation, 405 device |
//! | POST | `/write-tngl` | 200 | 400 `NoTnglSpecified`, 500 |
//! | GET | `/tngl-fingerprint` | – | 501 |
//! | GET | `/emit-history` | 200 | 400 |
//! | POST | `/notifier` | 200 | 400 validation, 405 device |
//! | POST | `/upload-fw` | 200 | 405 |
//! | GET | `/owner` | 200 | 200 `{error}` |
//! | GET | `/variable` | 200 | 400 / 404 |
//! | POST | `/variables` | 200 | 400 / 500 |
//! | GET | `/status` | 200 | – |
//! | GET | `/events` `/local-events` `/connection` `/ota-progress` | SSE | – |
//! | GET | `/` `/assets/control` | 302 → `/control` | – |
//!
//! Command responses use the envelope `{"status": "success", "result": …}` or
//! `{"status": "error", "error": "<code>"}`.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use glowgate_kernel::SessionSnapshot;
use glowgate_middleware::{RelayBus, Topic};
use glowgate_runtime::RestartTrigger;
use glowgate_types::{DeviceError, DeviceEvent, ErrorClass, GatewayError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::gateway::{ConnectRequest, Gateway, VariableQuery};

/// Default interval between SSE keep-alive comments.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub bus: Arc<RelayBus>,
    pub restart: RestartTrigger,
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, bus: Arc<RelayBus>, restart: RestartTrigger) -> Self {
        Self {
            gateway,
            bus,
            restart,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }
}

/// Build the router with every route, CORS and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(redirect_to_control))
        .route("/assets/control", get(redirect_to_control))
        .route("/scan", get(scan))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/event", post(emit_event))
        .route("/write-tngl", post(write_tngl))
        .route("/tngl-fingerprint", get(tngl_fingerprint))
        .route("/emit-history", get(emit_history))
        .route("/notifier", post(notifier))
        .route("/upload-fw", post(upload_firmware))
        .route("/owner", get(owner))
        .route("/variable", get(read_variable))
        .route("/variables", post(read_variables))
        .route("/status", get(status))
        .route("/events", get(events))
        .route("/local-events", get(local_events))
        .route("/connection", get(connection))
        .route("/ota-progress", get(ota_progress))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelopes
// ─────────────────────────────────────────────────────────────────────────────

fn success(result: impl Serialize) -> Response {
    Json(json!({ "status": "success", "result": result })).into_response()
}

fn failure(status: StatusCode, err: &GatewayError) -> Response {
    debug!(code = %err.code(), status = status.as_u16(), "request failed");
    (status, Json(json!({ "status": "error", "error": err.code() }))).into_response()
}

/// Shared by `/event` and `/notifier`: a missing label is reported under
/// `result`, other validation errors under `error`, device failures as 405.
fn event_failure(err: &GatewayError) -> Response {
    match err {
        GatewayError::NoEventLabelSpecified => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "result": err.code() })),
        )
            .into_response(),
        e if e.class() == ErrorClass::Validation => failure(StatusCode::BAD_REQUEST, e),
        e => failure(StatusCode::METHOD_NOT_ALLOWED, e),
    }
}

fn plain_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Run a guarded operation on its own task. Dropping the handler future when
/// the client disconnects then neither aborts the device call nor releases
/// its guard early.
async fn detached<T, F>(operation: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, GatewayError>> + Send + 'static,
{
    tokio::spawn(operation).await.unwrap_or_else(|e| {
        error!(error = %e, "guarded operation task failed");
        Err(GatewayError::Device(DeviceError::Other("OperationAborted".into())))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

async fn scan() -> Response {
    failure(StatusCode::OK, &GatewayError::NotImplemented)
}

/// An empty body connects to the first controller an unfiltered scan finds.
async fn connect(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.is_empty() {
        ConnectRequest::default()
    } else {
        match serde_json::from_slice::<ConnectRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return plain_error(StatusCode::BAD_REQUEST, format!("invalid connect body: {e}"));
            }
        }
    };
    let gateway = Arc::clone(&state.gateway);
    let restart = state.restart.clone();
    let outcome = detached(async move {
        let outcome = gateway.connect(&request).await;
        if let Err(e) = &outcome
            && e.class() == ErrorClass::Fatal
        {
            restart.request_restart(e.code());
        }
        outcome
    })
    .await;
    match outcome {
        Ok(result) => success(result),
        Err(e) => failure(StatusCode::METHOD_NOT_ALLOWED, &e),
    }
}

async fn disconnect(State(state): State<AppState>) -> Response {
    match state.gateway.disconnect().await {
        Ok(result) => success(result),
        Err(e) => failure(StatusCode::METHOD_NOT_ALLOWED, &e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

async fn emit_event(State(state): State<AppState>, Json(event): Json<DeviceEvent>) -> Response {
    match state.gateway.emit_event(&event).await {
        Ok(result) => success(result),
        Err(e) => event_failure(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct NotifierBody {
    #[serde(default)]
    message: String,
}

async fn notifier(State(state): State<AppState>, Json(body): Json<NotifierBody>) -> Response {
    match state.gateway.notify(&body.message).await {
        Ok(result) => success(result),
        Err(e) => event_failure(&e),
    }
}

async fn emit_history(State(state): State<AppState>) -> Response {
    match state.gateway.emit_history().await {
        Ok(()) => success("success"),
        Err(e) => failure(StatusCode::BAD_REQUEST, &e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Program & firmware
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct TnglBody {
    #[serde(default)]
    tngl: Option<String>,
}

async fn write_tngl(State(state): State<AppState>, Json(body): Json<TnglBody>) -> Response {
    match state.gateway.write_tngl(body.tngl.as_deref()).await {
        Ok(result) => success(result),
        Err(e @ GatewayError::NoTnglSpecified) => failure(StatusCode::BAD_REQUEST, &e),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn tngl_fingerprint() -> Response {
    failure(StatusCode::NOT_IMPLEMENTED, &GatewayError::NotImplemented)
}

async fn upload_firmware(State(state): State<AppState>) -> Response {
    let gateway = Arc::clone(&state.gateway);
    match detached(async move { gateway.upload_firmware().await }).await {
        Ok(result) => success(result),
        Err(e) => failure(StatusCode::METHOD_NOT_ALLOWED, &e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────────────────────────

async fn owner(State(state): State<AppState>) -> Response {
    match state.gateway.owner().await {
        Ok(info) => Json(info).into_response(),
        // Read failures are reported inside a 200 body.
        Err(e) => plain_error(StatusCode::OK, e.code()),
    }
}

async fn read_variable(
    State(state): State<AppState>,
    Query(query): Query<VariableQuery>,
) -> Response {
    match state.gateway.read_variable(&query).await {
        Ok(value) => Json(json!({ "value": value })).into_response(),
        Err(e) if e.class() == ErrorClass::Validation => {
            plain_error(StatusCode::BAD_REQUEST, e.code())
        }
        Err(e) => plain_error(StatusCode::NOT_FOUND, e.code()),
    }
}

async fn read_variables(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(items) = body.get("variables").and_then(Value::as_array) else {
        error!("variables body is not an array");
        return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong");
    };
    match state.gateway.read_variables(items).await {
        Ok(batch) => Json(batch).into_response(),
        Err(e) if e.class() == ErrorClass::Validation => {
            plain_error(StatusCode::BAD_REQUEST, e.code())
        }
        Err(e) => {
            error!(error = %e, "batch variable read failed");
            plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriberCounts {
    events: usize,
    local_events: usize,
    connection: usize,
    ota_progress: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    #[serde(flatten)]
    session: SessionSnapshot,
    subscribers: SubscriberCounts,
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let bus = &state.bus;
    Json(StatusReport {
        session: state.gateway.session().snapshot(),
        subscribers: SubscriberCounts {
            events: bus.subscriber_count(Topic::Events),
            local_events: bus.subscriber_count(Topic::LocalEvents),
            connection: bus.subscriber_count(Topic::Connection),
            ota_progress: bus.subscriber_count(Topic::OtaProgress),
        },
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Server-sent events
// ─────────────────────────────────────────────────────────────────────────────

/// Subscribe to `topic` now and stream every following frame. The
/// subscription ends when the client goes away and the stream is dropped.
fn relay(
    state: &AppState,
    topic: Topic,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + use<>> {
    debug!(topic = ?topic, "relay subscriber connected");
    let stream = state.bus.subscribe(topic).into_stream().map(|message| {
        Ok::<_, Infallible>(Event::default().id(message.id.to_string()).data(message.data))
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive))
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    relay(&state, Topic::Events)
}

async fn local_events(State(state): State<AppState>) -> impl IntoResponse {
    relay(&state, Topic::LocalEvents)
}

async fn connection(State(state): State<AppState>) -> impl IntoResponse {
    relay(&state, Topic::Connection)
}

async fn ota_progress(State(state): State<AppState>) -> impl IntoResponse {
    relay(&state, Topic::OtaProgress)
}

async fn redirect_to_control() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/control")]).into_response()
}
