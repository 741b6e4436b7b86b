use axum::{Json, extract::State, response::IntoResponse};

use super::ApiState;
use crate::api::{IpsRequest, Result};

pub async fn h_get_blocklist(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.api.api_get_blocklist())
}

pub async fn h_replace_blocklist(
    State(state): State<ApiState>,
    Json(req): Json<IpsRequest>,
) -> Result<impl IntoResponse> {
    state.api.api_replace_blocklist(req.ips).map(Json)
}

pub async fn h_ban_ips(
    State(state): State<ApiState>,
    Json(req): Json<IpsRequest>,
) -> Result<impl IntoResponse> {
    state.api.api_ban_ips(req.ips).map(Json)
}

pub async fn h_unban_ips(
    State(state): State<ApiState>,
    Json(req): Json<IpsRequest>,
) -> Result<impl IntoResponse> {
    state.api.api_unban_ips(req.ips).map(Json)
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use serde_json::json;

    use super::*;
    use crate::http_api::handlers::test_helpers::{body_json, state};

    fn ips(v: &[&str]) -> Json<IpsRequest> {
        Json(IpsRequest {
            ips: v.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn test_ban_and_list() {
        let (t, state) = state(false).await;
        let (status, v) = body_json(
            h_ban_ips(State(state.clone()), ips(&["10.0.0.1", "10.0.0.2"]))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(v, json!({}));

        h_unban_ips(State(state.clone()), ips(&["10.0.0.2"]))
            .await
            .unwrap();

        let (_, v) = body_json(h_get_blocklist(State(state.clone())).await).await;
        assert_eq!(v, json!({"size": 1, "ips": ["10.0.0.1"]}));
        assert!(t.engine.is_blocked("10.0.0.1".parse::<IpAddr>().unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_address_is_bad_request() {
        let (_t, state) = state(false).await;
        let err = match h_replace_blocklist(State(state), ips(&["1.2.3.4", "1.2.3"])).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        let (status, v) = body_json(err).await;
        assert_eq!(status, 400);
        assert_eq!(v["error_kind"], "invalid_address");
    }
}
