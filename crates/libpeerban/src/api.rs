use std::sync::Arc;

use anyhow::Context;
use http::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    adapter::Adapter,
    api_error::{ApiError, ApiErrorExt},
    blocklist::BlocklistSnapshot,
    stats::{PersistenceStatus, SessionStatus},
    torrents::{ActiveTorrent, Torrent},
};

pub type Result<T> = std::result::Result<T, ApiError>;

/// Methods that change state. Hidden when the API is read-only.
pub const MUTATING_METHODS: [&str; 4] =
    ["set_config", "replace_blocklist", "ban_ips", "unban_ips"];

/// Prefix under which the methods are registered in the client's RPC namespace.
const METHOD_NAMESPACE: &str = "peerbanhelperadapter.";

#[derive(Serialize, Deserialize, Default)]
pub struct EmptyJsonResponse {}

#[derive(Serialize, Debug)]
pub struct ConfigResponse {
    pub blocklist: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct IpsRequest {
    pub ips: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Library API for use in different web frameworks.
/// Contains all methods you might want to expose with (de)serializable inputs/outputs.
#[derive(Clone)]
pub struct Api {
    adapter: Arc<Adapter>,
}

fn param<T: DeserializeOwned>(params: &mut Vec<Value>, name: &str) -> Result<T> {
    if params.is_empty() {
        return Err(ApiError::new_from_anyhow(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("missing parameter {name:?}"),
        ));
    }
    serde_json::from_value(params.remove(0))
        .with_context(|| format!("invalid parameter {name:?}"))
        .with_error_status_code(StatusCode::BAD_REQUEST)
}

fn to_value<T: Serialize>(v: T) -> Result<Value> {
    Ok(serde_json::to_value(v).context("error serializing response")?)
}

impl Api {
    pub fn new(adapter: Arc<Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    pub fn api_get_config(&self) -> ConfigResponse {
        ConfigResponse {
            blocklist: self.adapter.filter().ips(),
        }
    }

    pub async fn api_set_config(&self, config: Map<String, Value>) -> Result<EmptyJsonResponse> {
        self.adapter.set_config(config).await?;
        Ok(Default::default())
    }

    pub fn api_get_blocklist(&self) -> BlocklistSnapshot {
        self.adapter.filter().snapshot()
    }

    pub fn api_replace_blocklist(&self, ips: Vec<String>) -> Result<EmptyJsonResponse> {
        self.adapter.filter().replace(ips)?;
        Ok(Default::default())
    }

    pub fn api_ban_ips(&self, ips: Vec<String>) -> Result<EmptyJsonResponse> {
        self.adapter.filter().ban(ips)?;
        Ok(Default::default())
    }

    pub fn api_unban_ips(&self, ips: Vec<String>) -> Result<EmptyJsonResponse> {
        self.adapter.filter().unban(ips)?;
        Ok(Default::default())
    }

    pub fn api_get_history_status(&self) -> PersistenceStatus {
        self.adapter.history_status()
    }

    /// Returns the totals as of the previous poll and schedules a new one.
    pub fn api_get_session_totals(&self) -> SessionStatus {
        self.adapter.session_totals()
    }

    pub fn api_get_torrents_info(&self) -> Vec<Torrent> {
        self.adapter
            .engine()
            .torrents()
            .iter()
            .map(Torrent::from)
            .collect()
    }

    pub fn api_get_active_torrents_info(&self) -> Vec<ActiveTorrent> {
        self.adapter
            .engine()
            .torrents()
            .iter()
            .filter(|t| t.is_active())
            .map(ActiveTorrent::from)
            .collect()
    }

    /// Call a method by its RPC name with positional parameters. Names may
    /// carry the `peerbanhelperadapter.` prefix.
    pub async fn api_dispatch(&self, method: &str, mut params: Vec<Value>) -> Result<Value> {
        let name = method.strip_prefix(METHOD_NAMESPACE).unwrap_or(method);
        debug!(method = name, params = params.len(), "dispatching rpc");
        match name {
            "get_config" => to_value(self.api_get_config()),
            "set_config" => {
                let config = param(&mut params, "config")?;
                to_value(self.api_set_config(config).await?)
            }
            "get_blocklist" => to_value(self.api_get_blocklist()),
            "replace_blocklist" => {
                to_value(self.api_replace_blocklist(param(&mut params, "ips")?)?)
            }
            "ban_ips" => to_value(self.api_ban_ips(param(&mut params, "ips")?)?),
            "unban_ips" => to_value(self.api_unban_ips(param(&mut params, "ips")?)?),
            "get_history_status" => to_value(self.api_get_history_status()),
            "get_session_totals" => to_value(self.api_get_session_totals()),
            "get_torrents_info" => to_value(self.api_get_torrents_info()),
            "get_active_torrents_info" => to_value(self.api_get_active_torrents_info()),
            _ => Err(ApiError::unknown_method(method)),
        }
    }

    pub fn is_mutating_method(method: &str) -> bool {
        let name = method.strip_prefix(METHOD_NAMESPACE).unwrap_or(method);
        MUTATING_METHODS.contains(&name)
    }
}
