//! ---
//! vatio_section: "01-core-functionality"
//! vatio_subsection: "binary"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Session lifecycle controller for the vatio daemon."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Session lifecycle on top of the API state: manual start/stop routes, the
//! periodic metering tick, and the reconciliation tick. The controller holds
//! the only `CostAccumulator`; the API state is both the read side (latest
//! power) and the shared session store it reconciles against.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vatio_api::{ApiState, StoredCompletedSession};
use vatio_common::AppConfig;
use vatio_relay::RelayState;
use vatio_session::{ActiveSession, CompletedSession, CostAccumulator, TickOutcome};
use vatio_sync::SessionSynchronizer;

pub struct Controller {
    api: Arc<ApiState>,
    accumulator: Mutex<CostAccumulator>,
    synchronizer: SessionSynchronizer,
}

#[derive(Debug, Deserialize, Default)]
pub struct StartRequest {
    #[serde(default)]
    pub equipment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ControllerStatus {
    pub active: Option<ActiveSession>,
    pub last_completed: Option<CompletedSession>,
    pub relay_status: RelayState,
}

#[derive(Debug)]
pub enum ControllerError {
    AlreadyActive,
    NoActiveSession,
}

impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ControllerError::AlreadyActive => {
                (StatusCode::CONFLICT, "a session is already active")
            }
            ControllerError::NoActiveSession => {
                (StatusCode::CONFLICT, "no session is active")
            }
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

impl Controller {
    pub fn new(api: Arc<ApiState>, config: &AppConfig) -> Self {
        Self {
            api,
            accumulator: Mutex::new(CostAccumulator::new(config.metering.clone())),
            synchronizer: SessionSynchronizer::from_config(&config.sync),
        }
    }

    /// Startup reconciliation: adopt a fresh shared session left behind by
    /// another device or a previous run.
    pub fn adopt_on_startup(&self, now: DateTime<Utc>) {
        let mut accumulator = self.accumulator.lock();
        if let Err(err) = self
            .synchronizer
            .adopt_on_startup(&mut accumulator, &*self.api, now)
        {
            warn!(error = %err, "startup session adoption failed");
        }
    }

    /// Begin a session: start cost accumulation, publish the shared record,
    /// and request the relay on.
    pub fn start_session(
        &self,
        now: DateTime<Utc>,
        equipment: Option<String>,
    ) -> Result<ActiveSession, ControllerError> {
        let mut accumulator = self.accumulator.lock();
        if accumulator.is_active() {
            return Err(ControllerError::AlreadyActive);
        }
        accumulator.start(now, equipment);
        let session = accumulator
            .session()
            .cloned()
            .ok_or(ControllerError::NoActiveSession)?;
        self.api.set_active_session(session.clone());
        self.api.relay().request(RelayState::On, now);
        Ok(session)
    }

    /// Stop the running session, record it, clear the shared record, and
    /// request the relay off.
    pub fn stop_session(
        &self,
        now: DateTime<Utc>,
    ) -> Result<StoredCompletedSession, ControllerError> {
        let completed = {
            let mut accumulator = self.accumulator.lock();
            accumulator
                .stop(now)
                .ok_or(ControllerError::NoActiveSession)?
        };
        Ok(self.finish(completed, now))
    }

    /// One metering tick: integrate the latest power sample into the running
    /// cost, publish the updated record, and react to automatic stop.
    pub fn metering_tick(&self, now: DateTime<Utc>) {
        let power_w = self.api.latest_power_w().unwrap_or(0.0);
        let prices = self.api.price_schedule(now.date_naive());
        let outcome = {
            let mut accumulator = self.accumulator.lock();
            let outcome = accumulator.tick(now, power_w, &prices);
            if let TickOutcome::Accrued { .. } = outcome {
                if let Some(session) = accumulator.session() {
                    self.api.update_active_session(session.clone());
                }
            }
            outcome
        };
        if let TickOutcome::AutoStopped(completed) = outcome {
            self.finish(completed, now);
        }
    }

    /// One reconciliation tick against the shared store.
    pub fn reconcile_tick(&self) {
        let mut accumulator = self.accumulator.lock();
        if let Err(err) = self.synchronizer.reconcile(&mut accumulator, &*self.api) {
            warn!(error = %err, "session reconciliation failed");
        }
    }

    pub fn status(&self) -> ControllerStatus {
        let accumulator = self.accumulator.lock();
        ControllerStatus {
            active: accumulator.session().cloned(),
            last_completed: accumulator.last_completed().cloned(),
            relay_status: self.api.relay().last_status(),
        }
    }

    fn finish(&self, completed: CompletedSession, now: DateTime<Utc>) -> StoredCompletedSession {
        self.api.clear_active_session();
        self.api.relay().request(RelayState::Off, now);
        let stored = self.api.record_completed(completed);
        info!(
            id = %stored.id,
            total_cost = stored.session.total_cost,
            "session finalized"
        );
        stored
    }
}

/// Controller routes, merged with the REST API router before serving.
pub fn router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/api/session/start", post(post_start))
        .route("/api/session/stop", post(post_stop))
        .route("/api/session/status", get(get_status))
        .with_state(controller)
}

async fn post_start(
    State(controller): State<Arc<Controller>>,
    payload: Option<Json<StartRequest>>,
) -> Result<Json<ActiveSession>, ControllerError> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let session = controller.start_session(Utc::now(), request.equipment)?;
    Ok(Json(session))
}

async fn post_stop(
    State(controller): State<Arc<Controller>>,
) -> Result<Json<StoredCompletedSession>, ControllerError> {
    let stored = controller.stop_session(Utc::now())?;
    Ok(Json(stored))
}

async fn get_status(State(controller): State<Arc<Controller>>) -> Json<ControllerStatus> {
    Json(controller.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use vatio_api::IngestRequest;

    fn setup() -> (Arc<ApiState>, Controller) {
        let config = AppConfig::default();
        let api = Arc::new(ApiState::new(&config));
        let controller = Controller::new(api.clone(), &config);
        (api, controller)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap()
    }

    #[test]
    fn start_publishes_record_and_requests_relay_on() {
        let (api, controller) = setup();
        let session = controller
            .start_session(t0(), Some("washer".into()))
            .unwrap();
        assert_eq!(api.active_session().unwrap().start_time, session.start_time);
        assert_eq!(api.relay().take(t0()), Some(RelayState::On));
        assert!(matches!(
            controller.start_session(t0(), None),
            Err(ControllerError::AlreadyActive)
        ));
    }

    #[test]
    fn stop_records_completed_and_clears_shared_record() {
        let (api, controller) = setup();
        controller.start_session(t0(), Some("washer".into())).unwrap();
        api.relay().take(t0());

        let end = t0() + ChronoDuration::minutes(20);
        let stored = controller.stop_session(end).unwrap();
        assert_eq!(stored.session.end_time, end);
        assert!(api.active_session().is_none());
        assert_eq!(api.relay().take(end), Some(RelayState::Off));
        assert_eq!(api.completed_sessions(None).len(), 1);
        assert!(matches!(
            controller.stop_session(end),
            Err(ControllerError::NoActiveSession)
        ));
    }

    #[test]
    fn metering_tick_accrues_from_latest_reading() {
        let (api, controller) = setup();
        controller.start_session(t0(), None).unwrap();
        api.ingest(
            IngestRequest {
                current: 8.0,
                vibration: None,
                equipment: None,
                timestamp: None,
            },
            t0(),
        )
        .unwrap();

        controller.metering_tick(t0() + ChronoDuration::seconds(7));
        let shared = api.active_session().unwrap();
        assert!(shared.total_cost > 0.0);
        assert_eq!(
            controller.status().active.unwrap().total_cost,
            shared.total_cost
        );
    }

    #[test]
    fn sustained_idle_auto_stops_and_cleans_up() {
        let (api, controller) = setup();
        controller.start_session(t0(), None).unwrap();
        api.relay().take(t0());

        // No readings at all: latest power defaults to zero, which is idle.
        // Guard period is 10 s; ticks land every 7 s.
        for n in 1..=4 {
            controller.metering_tick(t0() + ChronoDuration::seconds(7 * n));
        }
        assert!(controller.status().active.is_none());
        assert!(api.active_session().is_none());
        assert_eq!(api.completed_sessions(None).len(), 1);
        assert_eq!(
            api.relay().take(t0() + ChronoDuration::seconds(28)),
            Some(RelayState::Off)
        );
    }

    #[test]
    fn startup_adopts_fresh_shared_session() {
        let (api, controller) = setup();
        let shared = ActiveSession {
            start_time: t0() - ChronoDuration::hours(1),
            equipment: Some("dryer".into()),
            total_cost: 0.42,
        };
        api.set_active_session(shared.clone());

        controller.adopt_on_startup(t0());
        let active = controller.status().active.unwrap();
        assert_eq!(active.start_time, shared.start_time);
        assert_eq!(active.total_cost, 0.42);
    }

    #[test]
    fn reconcile_pushes_local_record_back_after_store_loss() {
        let (api, controller) = setup();
        controller.start_session(t0(), None).unwrap();
        api.clear_active_session();

        controller.reconcile_tick();
        assert!(api.active_session().is_some());
    }
}
