mod blocklist;
mod config;
mod rpc;
mod stats;
mod torrents;

use std::sync::Arc;

use axum::{
    Router,
    response::IntoResponse,
    routing::{get, post},
};

use super::HttpApi;
type ApiState = Arc<HttpApi>;

async fn h_api_root() -> impl IntoResponse {
    let json = serde_json::json!({
        "apis": {
            "GET /": "list all available APIs",
            "GET /config": "Adapter config",
            "POST /config": "Merge the posted JSON object into the persisted config",
            "GET /blocklist": "Currently banned addresses",
            "POST /blocklist/replace": "Ban exactly the posted addresses: {\"ips\": [...]}",
            "POST /blocklist/ban": "Ban the posted addresses: {\"ips\": [...]}",
            "POST /blocklist/unban": "Lift bans on the posted addresses: {\"ips\": [...]}",
            "GET /stats/history": "Traffic totals of finished sessions",
            "GET /stats/session": "History plus the running session. Pass ?refresh=true to wait for a fresh poll",
            "GET /torrents": "All torrents",
            "GET /torrents/active": "Torrents with traffic, with their connected peers",
            "POST /rpc": "Call a method by name: {\"method\": \"ban_ips\", \"params\": [[\"1.2.3.4\"]]}",
        },
        "server": "peerban",
        "version": env!("CARGO_PKG_VERSION"),
    });

    ([("Content-Type", "application/json")], axum::Json(json)).into_response()
}

pub fn make_api_router(state: ApiState) -> Router {
    let mut api_router = Router::new()
        .route("/", get(h_api_root))
        .route("/config", get(config::h_get_config))
        .route("/blocklist", get(blocklist::h_get_blocklist))
        .route("/stats/history", get(stats::h_history_status))
        .route("/stats/session", get(stats::h_session_totals))
        .route("/torrents", get(torrents::h_torrents_info))
        .route("/torrents/active", get(torrents::h_active_torrents_info))
        .route("/rpc", post(rpc::h_rpc));

    if !state.opts.read_only {
        api_router = api_router
            .route("/config", post(config::h_set_config))
            .route("/blocklist/replace", post(blocklist::h_replace_blocklist))
            .route("/blocklist/ban", post(blocklist::h_ban_ips))
            .route("/blocklist/unban", post(blocklist::h_unban_ips));
    }

    api_router.with_state(state)
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;

    use axum::response::IntoResponse;

    use super::ApiState;
    use crate::{
        api::Api,
        config::AdapterConfig,
        http_api::{HttpApi, HttpApiOptions},
        tests::test_util::{TestAdapter, start_adapter},
    };

    pub async fn state(read_only: bool) -> (TestAdapter, ApiState) {
        let t = start_adapter(AdapterConfig::default()).await;
        let api = Api::new(t.adapter.clone());
        let state = Arc::new(HttpApi::new(
            api,
            Some(HttpApiOptions {
                read_only,
                basic_auth: None,
            }),
        ));
        (t, state)
    }

    pub async fn body_json(r: impl IntoResponse) -> (http::StatusCode, serde_json::Value) {
        let r = r.into_response();
        let status = r.status();
        let bytes = axum::body::to_bytes(r.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}
