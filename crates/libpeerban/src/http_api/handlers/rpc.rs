use axum::{Json, extract::State, response::IntoResponse};

use super::ApiState;
use crate::{
    ApiError,
    api::{Api, Result, RpcRequest},
};

/// Method-name dispatch, for callers that speak the client's RPC dialect.
pub async fn h_rpc(
    State(state): State<ApiState>,
    Json(req): Json<RpcRequest>,
) -> Result<impl IntoResponse> {
    if state.opts.read_only && Api::is_mutating_method(&req.method) {
        return Err(ApiError::read_only(&req.method));
    }
    let result = state.api.api_dispatch(&req.method, req.params).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http_api::handlers::test_helpers::{body_json, state};

    fn rpc(v: serde_json::Value) -> Json<RpcRequest> {
        Json(serde_json::from_value(v).unwrap())
    }

    async fn call(state: &ApiState, v: serde_json::Value) -> (http::StatusCode, serde_json::Value) {
        match h_rpc(State(state.clone()), rpc(v)).await {
            Ok(r) => body_json(r).await,
            Err(e) => body_json(e).await,
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let (_t, state) = state(false).await;
        let (status, v) = call(
            &state,
            json!({"method": "peerbanhelperadapter.ban_ips", "params": [["10.0.0.5"]]}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(v, json!({}));

        let (_, v) = call(&state, json!({"method": "get_config"})).await;
        assert_eq!(v, json!({"blocklist": ["10.0.0.5"]}));

        let (_, v) = call(&state, json!({"method": "get_torrents_info"})).await;
        assert_eq!(v, json!([]));

        let (status, v) = call(&state, json!({"method": "get_session_totals"})).await;
        assert_eq!(status, 200);
        assert_eq!(v["total_upload"], 0);
    }

    #[tokio::test]
    async fn test_bad_calls() {
        let (_t, state) = state(false).await;
        let (status, v) = call(&state, json!({"method": "shutdown"})).await;
        assert_eq!(status, 404);
        assert_eq!(v["error_kind"], "unknown_method");

        let (status, _) = call(&state, json!({"method": "ban_ips"})).await;
        assert_eq!(status, 400);

        let (status, _) = call(&state, json!({"method": "ban_ips", "params": ["10.0.0.1"]})).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_read_only_refuses_mutations() {
        let (t, state) = state(true).await;
        let (status, v) = call(
            &state,
            json!({"method": "replace_blocklist", "params": [["10.0.0.1"]]}),
        )
        .await;
        assert_eq!(status, 403);
        assert_eq!(v["error_kind"], "read_only");
        assert_eq!(t.adapter.filter().snapshot().size, 0);

        let (status, _) = call(&state, json!({"method": "get_blocklist"})).await;
        assert_eq!(status, 200);
    }
}
