use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use floodsim::{
    FloodZone, RunReport, Scenario, SimError, SimulationPoint, SimulationStatus, list_flood_zones,
};

const DEFAULT_CHUNK_STEPS: usize = 16;
/// Request limits. The library accepts larger runs; the server does not.
const MAX_GRID_SIZE: usize = 512;
const MAX_STEPS: f64 = 10_000.0;
/// Finished runs kept around for status queries.
const MAX_FINISHED_RUNS: usize = 64;

struct RunSlot {
    cancel: Arc<AtomicBool>,
    status: SimulationStatus,
    finished: bool,
}

/// Every run gets its own cancel flag and status slot, keyed by run id.
#[derive(Default)]
struct Runs {
    next_id: u64,
    slots: HashMap<u64, RunSlot>,
    finished: VecDeque<u64>,
}

impl Runs {
    /// Register a run. `requested` lets a client pick the id up front so it
    /// can poll or cancel while the request is still open. None if that id
    /// is taken by a run still in progress.
    fn start(&mut self, requested: Option<u64>) -> Option<(u64, Arc<AtomicBool>)> {
        let id = match requested {
            Some(id) => {
                if self.slots.get(&id).is_some_and(|s| !s.finished) {
                    return None;
                }
                self.finished.retain(|&f| f != id);
                id
            }
            None => {
                while self.slots.contains_key(&self.next_id) {
                    self.next_id = self.next_id.wrapping_add(1);
                }
                self.next_id
            }
        };
        self.next_id = self.next_id.max(id).wrapping_add(1);

        let cancel = Arc::new(AtomicBool::new(false));
        self.slots.insert(
            id,
            RunSlot {
                cancel: cancel.clone(),
                status: SimulationStatus {
                    is_running: true,
                    ..SimulationStatus::default()
                },
                finished: false,
            },
        );
        Some((id, cancel))
    }

    fn update(&mut self, id: u64, status: SimulationStatus) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.status = status;
        }
    }

    /// Mark a run done. `status` is the final status when the run returned
    /// one; otherwise the last chunk status is kept.
    fn finish(&mut self, id: u64, status: Option<SimulationStatus>) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if let Some(status) = status {
            slot.status = status;
        }
        slot.status.is_running = false;
        if !slot.finished {
            slot.finished = true;
            self.finished.push_back(id);
        }
        while self.finished.len() > MAX_FINISHED_RUNS {
            if let Some(old) = self.finished.pop_front() {
                self.slots.remove(&old);
            }
        }
    }

    fn status(&self, id: u64) -> Option<SimulationStatus> {
        self.slots.get(&id).map(|s| s.status)
    }

    /// False if the id is unknown.
    fn cancel(&self, id: u64) -> bool {
        match self.slots.get(&id) {
            Some(slot) => {
                slot.cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn list(&self) -> Vec<RunInfo> {
        let mut out: Vec<RunInfo> = self
            .slots
            .iter()
            .map(|(&run_id, s)| RunInfo {
                run_id,
                finished: s.finished,
                status: s.status,
            })
            .collect();
        out.sort_by_key(|r| r.run_id);
        out
    }
}

#[derive(Clone, Default)]
struct AppState {
    runs: Arc<Mutex<Runs>>,
}

impl AppState {
    fn runs(&self) -> MutexGuard<'_, Runs> {
        lock_runs(&self.runs)
    }
}

fn lock_runs(runs: &Mutex<Runs>) -> MutexGuard<'_, Runs> {
    runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Finalizes a run's slot when dropped, including when the run panics.
struct RunGuard {
    runs: Arc<Mutex<Runs>>,
    id: u64,
    final_status: Option<SimulationStatus>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock_runs(&self.runs).finish(self.id, self.final_status);
    }
}

#[derive(Deserialize)]
struct SimulateRequest {
    seed: Option<u64>,
    chunk_steps: Option<usize>,
    run_id: Option<u64>,
    #[serde(flatten)]
    scenario: Scenario,
}

#[derive(Serialize)]
struct SimulateResponse {
    run_id: u64,
    terrain_seed: u64,
    status: SimulationStatus,
    report: RunReport,
    trace: Vec<SimulationPoint>,
    timings: Vec<TimingEntry>,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

#[derive(Serialize)]
struct RunInfo {
    run_id: u64,
    finished: bool,
    status: SimulationStatus,
}

enum ApiError {
    Sim(SimError),
    Limit(String),
    Conflict(u64),
    NotFound(u64),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            ApiError::Sim(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Limit(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Conflict(id) => (StatusCode::CONFLICT, format!("run {id} is still in progress")),
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("no run with id {id}")),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

/// Reject scenarios too large to serve before any work is scheduled.
fn check_limits(scenario: &Scenario) -> Result<(), String> {
    if scenario.grid_size > MAX_GRID_SIZE {
        return Err(format!(
            "grid size {} exceeds the server limit of {MAX_GRID_SIZE}",
            scenario.grid_size
        ));
    }
    let steps = (scenario.total_time / scenario.time_step).floor();
    if !(steps <= MAX_STEPS) {
        return Err(format!(
            "total_time / time_step gives {steps} steps, over the server limit of {MAX_STEPS}"
        ));
    }
    Ok(())
}

async fn simulate_handler(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    let seed = req.seed.unwrap_or_else(rand::random);
    let chunk_steps = req.chunk_steps.unwrap_or(DEFAULT_CHUNK_STEPS);
    let scenario = req.scenario;

    if let Err(msg) = check_limits(&scenario) {
        warn!(grid_size = scenario.grid_size, "Simulation rejected: {msg}");
        return Err(ApiError::Limit(msg));
    }

    let (run_id, cancel) = state
        .runs()
        .start(req.run_id)
        .ok_or(ApiError::Conflict(req.run_id.unwrap_or_default()))?;

    info!(run_id, seed, grid_size = scenario.grid_size, "Simulation requested");

    let runs = state.runs.clone();
    let output = tokio::task::spawn_blocking(move || {
        let mut guard = RunGuard {
            runs: runs.clone(),
            id: run_id,
            final_status: None,
        };
        let result =
            floodsim::simulate_cancellable(seed, &scenario, chunk_steps, &cancel, |status| {
                lock_runs(&runs).update(run_id, *status);
            });
        if let Ok(out) = &result {
            guard.final_status = Some(out.status);
        }
        result
    })
    .await
    .map_err(|e| {
        error!(run_id, "simulation task failed: {e}");
        ApiError::Internal(e.to_string())
    })?
    .map_err(ApiError::Sim)?;

    let timings = output
        .timings
        .iter()
        .map(|t| TimingEntry {
            name: t.name.to_string(),
            ms: t.ms,
        })
        .collect();

    Ok(Json(SimulateResponse {
        run_id,
        terrain_seed: output.terrain_seed,
        status: output.status,
        report: output.report,
        trace: output.trace,
        timings,
    }))
}

async fn runs_handler(State(state): State<AppState>) -> Json<Vec<RunInfo>> {
    Json(state.runs().list())
}

async fn status_handler(
    State(state): State<AppState>,
    Path(run_id): Path<u64>,
) -> Result<Json<SimulationStatus>, ApiError> {
    state
        .runs()
        .status(run_id)
        .map(Json)
        .ok_or(ApiError::NotFound(run_id))
}

async fn cancel_handler(
    State(state): State<AppState>,
    Path(run_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    if !state.runs().cancel(run_id) {
        return Err(ApiError::NotFound(run_id));
    }
    info!(run_id, "Cancellation requested");
    Ok(StatusCode::ACCEPTED)
}

async fn zones_handler() -> Json<&'static [FloodZone]> {
    Json(list_flood_zones())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Router::new()
        .route("/api/simulate", post(simulate_handler))
        .route("/api/runs", get(runs_handler))
        .route("/api/status/{run_id}", get(status_handler))
        .route("/api/cancel/{run_id}", post(cancel_handler))
        .route("/api/zones", get(zones_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState::default());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("floodsim server at http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("server error: {e}");
    }
}
