use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use super::ApiState;
use crate::api::Result;

#[derive(Deserialize, Default)]
pub struct SessionTotalsQuery {
    /// Wait for a fresh poll instead of returning the previous one.
    #[serde(default)]
    refresh: bool,
}

pub async fn h_history_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.api.api_get_history_status())
}

pub async fn h_session_totals(
    State(state): State<ApiState>,
    Query(q): Query<SessionTotalsQuery>,
) -> Result<impl IntoResponse> {
    if q.refresh {
        return Ok(Json(state.api.adapter().refresh_session_totals().await?));
    }
    Ok(Json(state.api.api_get_session_totals()))
}
