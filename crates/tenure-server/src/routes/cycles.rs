use axum::extract::{Path, State};
use axum::Json;
use tenure_core::cycle::CycleReport;
use tenure_core::types::CommunityId;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/cycles: latest report per community, in community id order.
pub async fn list_cycles(State(app): State<AppState>) -> Json<serde_json::Value> {
    let reports: Vec<CycleReport> = app.reports.borrow().values().cloned().collect();
    Json(serde_json::json!({
        "started_at": app.started_at,
        "reports": reports,
    }))
}

/// GET /api/cycles/{community}: latest report for one community.
pub async fn get_cycle(
    State(app): State<AppState>,
    Path(community): Path<String>,
) -> Result<Json<CycleReport>, AppError> {
    let id: CommunityId = community
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid community id '{community}'")))?;
    let report = app.reports.borrow().get(&id).cloned();
    report
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no cycle has run for community {id}")))
}
