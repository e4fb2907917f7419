//! ---
//! vatio_section: "06-networking-external-interfaces"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "REST API surface for ingestion, relay, sessions, and tariffs."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! The REST surface the sensing node and controller talk to: measurement
//! ingestion with boundary validation, the relay command slot, the shared
//! active-session record, completed sessions, and simulated tariff queries.
//! State is in-memory; durability is an external collaborator.

use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use vatio_common::AppConfig;
use vatio_relay::{CommandSlot, RelayState};
use vatio_session::{ActiveSession, CompletedSession, PriceSchedule};
use vatio_sync::{SessionStore, StoreError};

/// One stored reading: the ingested measurement plus the server-derived
/// power figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub current_a: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibration: Option<f64>,
    pub power_w: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
}

/// A finalized session as stored, with its server-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCompletedSession {
    pub id: Uuid,
    #[serde(flatten)]
    pub session: CompletedSession,
}

/// Payload rejections at the ingestion boundary, before core state is
/// touched.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("current must be a finite, non-negative number")]
    InvalidCurrent,
    #[error("vibration must be a finite number")]
    InvalidVibration,
    #[error("total_cost must be a finite, non-negative number")]
    InvalidCost,
    #[error("relay request must carry either a command or a status")]
    EmptyRelayRequest,
    #[error("invalid date, expected YYYY-MM-DD")]
    InvalidDate,
    #[error("no completed session with id {0}")]
    UnknownSession(Uuid),
}

impl BoundaryError {
    fn status(&self) -> StatusCode {
        match self {
            BoundaryError::UnknownSession(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Shared API state exposed to handlers.
#[derive(Debug)]
pub struct ApiState {
    readings: RwLock<VecDeque<Reading>>,
    relay: CommandSlot,
    active_session: RwLock<Option<ActiveSession>>,
    completed: RwLock<Vec<StoredCompletedSession>>,
    mains_voltage_v: f64,
    reading_retention: usize,
    price_seed: u64,
}

impl ApiState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            readings: RwLock::new(VecDeque::new()),
            relay: CommandSlot::new(config.relay.command_expiry),
            active_session: RwLock::new(None),
            completed: RwLock::new(Vec::new()),
            mains_voltage_v: config.metering.mains_voltage_v,
            reading_retention: config.api.reading_retention.max(1),
            price_seed: config.simulation.seed,
        }
    }

    /// Validate and append a measurement; the server assigns the timestamp
    /// when the node omitted one.
    pub fn ingest(
        &self,
        request: IngestRequest,
        now: DateTime<Utc>,
    ) -> std::result::Result<Reading, BoundaryError> {
        if !request.current.is_finite() || request.current < 0.0 {
            return Err(BoundaryError::InvalidCurrent);
        }
        if let Some(vibration) = request.vibration {
            if !vibration.is_finite() {
                return Err(BoundaryError::InvalidVibration);
            }
        }

        let reading = Reading {
            timestamp: request.timestamp.unwrap_or(now),
            current_a: request.current,
            vibration: request.vibration,
            power_w: request.current * self.mains_voltage_v,
            equipment: request.equipment,
        };

        let mut readings = self.readings.write();
        readings.push_front(reading.clone());
        readings.truncate(self.reading_retention);
        Ok(reading)
    }

    /// Most-recent-first readings, optionally filtered by equipment.
    pub fn recent_readings(&self, limit: usize, equipment: Option<&str>) -> Vec<Reading> {
        self.readings
            .read()
            .iter()
            .filter(|reading| match equipment {
                Some(tag) => reading.equipment.as_deref() == Some(tag),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Latest derived power sample, if any reading has arrived yet.
    pub fn latest_power_w(&self) -> Option<f64> {
        self.readings.read().front().map(|reading| reading.power_w)
    }

    pub fn relay(&self) -> &CommandSlot {
        &self.relay
    }

    pub fn active_session(&self) -> Option<ActiveSession> {
        self.active_session.read().clone()
    }

    /// Create/overwrite the shared active-session record (session start).
    pub fn set_active_session(&self, session: ActiveSession) {
        info!(start_time = %session.start_time, "active session record written");
        *self.active_session.write() = Some(session);
    }

    /// Update the shared record. For a matching `start_time` the cost is
    /// max-merged so unordered concurrent writers cannot move it backwards;
    /// a different `start_time` replaces the record outright.
    pub fn update_active_session(&self, update: ActiveSession) -> ActiveSession {
        let mut guard = self.active_session.write();
        match guard.as_mut() {
            Some(existing) if existing.start_time == update.start_time => {
                existing.total_cost = existing.total_cost.max(update.total_cost);
                existing.equipment = update.equipment;
                existing.clone()
            }
            _ => {
                *guard = Some(update.clone());
                update
            }
        }
    }

    pub fn clear_active_session(&self) -> bool {
        self.active_session.write().take().is_some()
    }

    /// Record a finalized session, newest first.
    pub fn record_completed(&self, session: CompletedSession) -> StoredCompletedSession {
        let stored = StoredCompletedSession {
            id: Uuid::new_v4(),
            session,
        };
        self.completed.write().insert(0, stored.clone());
        stored
    }

    pub fn completed_sessions(&self, equipment: Option<&str>) -> Vec<StoredCompletedSession> {
        self.completed
            .read()
            .iter()
            .filter(|stored| match equipment {
                Some(tag) => stored.session.equipment.as_deref() == Some(tag),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn delete_completed(&self, id: Uuid) -> std::result::Result<(), BoundaryError> {
        let mut completed = self.completed.write();
        let before = completed.len();
        completed.retain(|stored| stored.id != id);
        if completed.len() == before {
            return Err(BoundaryError::UnknownSession(id));
        }
        Ok(())
    }

    pub fn price_schedule(&self, date: NaiveDate) -> PriceSchedule {
        vatio_sim::simulated_schedule(date, self.price_seed)
    }

    fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            readings_count: self.readings.read().len(),
            relay_status: self.relay.last_status(),
            session_active: self.active_session.read().is_some(),
        }
    }
}

/// The API's active-session record doubles as the shared store the
/// synchronizer reconciles against.
impl SessionStore for ApiState {
    fn fetch_active(&self) -> std::result::Result<Option<ActiveSession>, StoreError> {
        Ok(self.active_session())
    }

    fn put_active(&self, session: &ActiveSession) -> std::result::Result<(), StoreError> {
        self.update_active_session(session.clone());
        Ok(())
    }

    fn clear_active(&self) -> std::result::Result<(), StoreError> {
        self.clear_active_session();
        Ok(())
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// The actually bound address (port 0 requests resolve here).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the REST router over shared state. Binaries may merge additional
/// routes (controller surfaces) before serving.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/readings", get(get_readings).post(post_reading))
        .route("/api/relay", get(get_relay).post(post_relay))
        .route(
            "/api/session/active",
            get(get_active_session)
                .post(post_active_session)
                .put(put_active_session)
                .delete(delete_active_session),
        )
        .route(
            "/api/sessions",
            get(get_completed_sessions).post(post_completed_session),
        )
        .route("/api/sessions/:id", axum::routing::delete(delete_completed_session))
        .route("/api/prices", get(get_prices))
        .with_state(state)
}

/// Spawn the REST API on `addr` with graceful shutdown.
pub fn spawn_api_server(router: Router, addr: SocketAddr) -> Result<ApiServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let bound_addr = listener
        .local_addr()
        .context("failed to resolve bound API address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let router = router.layer(TraceLayer::new_for_http());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %bound_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: bound_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    readings_count: usize,
    relay_status: RelayState,
    session_active: bool,
}

/// Measurement ingestion payload from the sensing node.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub current: f64,
    #[serde(default)]
    pub vibration: Option<f64>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ReadingsQuery {
    limit: Option<usize>,
    equipment: Option<String>,
}

/// Relay slot view returned to the polling node.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelayPollResponse {
    pub command: Option<RelayState>,
    pub status: RelayState,
}

/// Either half may be present: `command` is a controller request,
/// `status` a device report.
#[derive(Debug, Deserialize)]
pub struct RelayPostRequest {
    #[serde(default)]
    pub command: Option<RelayState>,
    #[serde(default)]
    pub status: Option<RelayState>,
}

#[derive(Debug, Serialize)]
struct RelayAck {
    command: Option<RelayState>,
    status: RelayState,
}

#[derive(Debug, Serialize)]
struct ClearAck {
    cleared: bool,
}

#[derive(Debug, Deserialize)]
struct SessionsQuery {
    equipment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PricesQuery {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<BoundaryError> for ApiError {
    fn from(err: BoundaryError) -> Self {
        Self::new(err.status(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(state.health())
}

async fn post_reading(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<IngestRequest>,
) -> std::result::Result<Json<Reading>, ApiError> {
    let reading = state.ingest(payload, Utc::now())?;
    Ok(Json(reading))
}

async fn get_readings(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ReadingsQuery>,
) -> Json<Vec<Reading>> {
    let limit = query.limit.unwrap_or(50);
    Json(state.recent_readings(limit, query.equipment.as_deref()))
}

async fn get_relay(State(state): State<Arc<ApiState>>) -> Json<RelayPollResponse> {
    let command = state.relay().take(Utc::now());
    Json(RelayPollResponse {
        command,
        status: state.relay().last_status(),
    })
}

async fn post_relay(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<RelayPostRequest>,
) -> std::result::Result<Json<RelayAck>, ApiError> {
    match (payload.command, payload.status) {
        (None, Some(status)) => state.relay().report_status(status),
        (Some(command), _) => state.relay().request(command, Utc::now()),
        (None, None) => return Err(BoundaryError::EmptyRelayRequest.into()),
    }
    let (pending, status) = state.relay().peek();
    Ok(Json(RelayAck {
        command: pending,
        status,
    }))
}

async fn get_active_session(State(state): State<Arc<ApiState>>) -> Json<Option<ActiveSession>> {
    Json(state.active_session())
}

fn validate_cost(session: &ActiveSession) -> std::result::Result<(), BoundaryError> {
    if !session.total_cost.is_finite() || session.total_cost < 0.0 {
        return Err(BoundaryError::InvalidCost);
    }
    Ok(())
}

async fn post_active_session(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<ActiveSession>,
) -> std::result::Result<Json<ActiveSession>, ApiError> {
    validate_cost(&payload)?;
    state.set_active_session(payload.clone());
    Ok(Json(payload))
}

async fn put_active_session(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<ActiveSession>,
) -> std::result::Result<Json<ActiveSession>, ApiError> {
    validate_cost(&payload)?;
    Ok(Json(state.update_active_session(payload)))
}

async fn delete_active_session(State(state): State<Arc<ApiState>>) -> Json<ClearAck> {
    Json(ClearAck {
        cleared: state.clear_active_session(),
    })
}

async fn post_completed_session(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<CompletedSession>,
) -> std::result::Result<Json<StoredCompletedSession>, ApiError> {
    if !payload.total_cost.is_finite() || payload.total_cost < 0.0 {
        return Err(BoundaryError::InvalidCost.into());
    }
    Ok(Json(state.record_completed(payload)))
}

async fn get_completed_sessions(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SessionsQuery>,
) -> Json<Vec<StoredCompletedSession>> {
    Json(state.completed_sessions(query.equipment.as_deref()))
}

async fn delete_completed_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<ClearAck>, ApiError> {
    state.delete_completed(id)?;
    Ok(Json(ClearAck { cleared: true }))
}

async fn get_prices(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PricesQuery>,
) -> std::result::Result<Json<PriceSchedule>, ApiError> {
    let date = match query.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| ApiError::from(BoundaryError::InvalidDate))?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(state.price_schedule(date)))
}
