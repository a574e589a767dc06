use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use statsync_core::types::{SubjectId, TextureHistoryItem, TextureSlot};

use crate::infra::{app_state::AppState, errors::{AppError, AppResult}};

#[derive(Debug, Serialize)]
pub struct TextureHistoryResponse {
    pub subject_id: SubjectId,
    pub slot: TextureSlot,
    /// Newest first, one entry per distinct URL.
    pub history: Vec<TextureHistoryItem>,
}

pub async fn texture_history_handler(
    State(state): State<AppState>,
    Path((id, slot)): Path<(String, String)>,
) -> AppResult<Json<TextureHistoryResponse>> {
    let subject_id = SubjectId::parse(&id)?;
    let slot: TextureSlot = slot
        .parse()
        .map_err(|_| AppError::not_found(format!("unknown texture slot '{slot}'")))?;

    let history = state.snapshots.history(&subject_id, slot).await?.collect();

    Ok(Json(TextureHistoryResponse {
        subject_id,
        slot,
        history,
    }))
}
