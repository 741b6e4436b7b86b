//! Peer banning and traffic statistics for a BitTorrent engine.
//!
//! The [`Adapter`] keeps a blocklist in sync with the engine's IP filter and
//! turns the engine's cumulative traffic counters into rates and totals that
//! survive restarts. [`Api`] exposes it all, and with the `http-api` feature
//! [`http_api::HttpApi`] serves it over HTTP.

#[macro_use]
mod stat_gen;

pub mod adapter;
pub mod api;
mod api_error;
pub mod blocklist;
pub mod config;
pub mod engine;
mod error;
#[cfg(feature = "http-api")]
pub mod http_api;
pub mod spawn_utils;
pub mod stats;
pub mod torrents;
#[cfg(feature = "tracing-subscriber-utils")]
pub mod tracing_subscriber_config_utils;

pub use adapter::{Adapter, AdapterOptions};
pub use api::Api;
pub use api_error::ApiError;
pub use error::{Error, Result};

#[cfg(test)]
mod tests;

/// The cargo version of libpeerban.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
