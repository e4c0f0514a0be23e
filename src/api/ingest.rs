//! Sync trigger and status endpoints.

use crate::api::ApiResult;
use crate::db::sync_status::{self, SyncStatus};
use crate::sync::SourceReport;
use crate::AppState;
use axum::extract::State;
use axum::Json;

/// POST /api/sync
pub async fn run_sync(State(state): State<AppState>) -> ApiResult<Json<Vec<SourceReport>>> {
    let reports = state.reconciler.run().await?;
    Ok(Json(reports))
}

/// GET /api/sync/status
pub async fn sync_statuses(State(state): State<AppState>) -> ApiResult<Json<Vec<SyncStatus>>> {
    Ok(Json(
        sync_status::list_sync_statuses(state.store.pool()).await?,
    ))
}
