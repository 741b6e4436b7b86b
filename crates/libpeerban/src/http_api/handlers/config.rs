use axum::{Json, extract::State, response::IntoResponse};
use serde_json::{Map, Value};

use super::ApiState;
use crate::api::Result;

pub async fn h_get_config(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.api.api_get_config())
}

pub async fn h_set_config(
    State(state): State<ApiState>,
    Json(config): Json<Map<String, Value>>,
) -> Result<impl IntoResponse> {
    state.api.api_set_config(config).await.map(Json)
}
