use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use statsync_core::types::{LeaderboardKey, LeaderboardRow};

use crate::infra::{app_state::AppState, errors::{AppError, AppResult}};

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub scope: String,
    pub stat: String,
    pub rows: Vec<LeaderboardRow>,
}

/// Cached board for `(scope, stat)`. Only a first load waits on the
/// provider; stale boards are served while a refresh runs in the background.
pub async fn get_leaderboard_handler(
    State(state): State<AppState>,
    Path((scope, stat)): Path<(String, String)>,
) -> AppResult<Json<LeaderboardResponse>> {
    if scope.trim().is_empty() || stat.trim().is_empty() {
        return Err(AppError::bad_request("scope and stat must not be empty"));
    }

    let key = LeaderboardKey::new(stat.clone(), scope.clone());
    let rows = state.leaderboards.get(&key).await?;

    Ok(Json(LeaderboardResponse { scope, stat, rows }))
}
