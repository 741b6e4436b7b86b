use axum::{Json, extract::State, response::IntoResponse};

use super::ApiState;

pub async fn h_torrents_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.api.api_get_torrents_info())
}

pub async fn h_active_torrents_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.api.api_get_active_torrents_info())
}
