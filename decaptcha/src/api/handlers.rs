use axum::extract::State;
use axum::Json;
use tracing::warn;

use super::dto::{HealthData, SolveRequest, SolveResponse};
use super::extractors::AppJson;
use super::state::AppState;

/// `POST /` and `POST /solve`
pub async fn solve(
    State(state): State<AppState>,
    AppJson(request): AppJson<SolveRequest>,
) -> Json<SolveResponse> {
    let Some(captcha) = request.captcha.filter(|c| !c.trim().is_empty()) else {
        warn!("Missing captcha field");
        return Json(SolveResponse::empty());
    };

    Json(SolveResponse::new(state.solver.solve(&captcha).await))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    let table = state.solver.table();
    let engine = if state.solver.engine_available() {
        "available"
    } else {
        "unavailable"
    };

    Json(HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine.to_string(),
        strategies: table.len(),
        table_version: table.version,
    })
}
