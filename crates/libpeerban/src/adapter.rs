use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    Result,
    blocklist::IpFilterManager,
    config::{ConfigStore, PersistentConfig},
    engine::NetworkEngine,
    stats::{PersistenceStatus, SessionStatus, StatsAccumulator, StatsPoller},
};

#[derive(Debug, Default, Clone)]
pub struct AdapterOptions {
    /// Poll the engine on this interval in addition to on-demand polls.
    pub stats_poll_interval: Option<Duration>,
}

/// The adapter attached to one engine: the blocklist, the traffic statistics
/// and the persisted document behind them.
pub struct Adapter {
    engine: Arc<dyn NetworkEngine>,
    config: Arc<PersistentConfig>,
    filter: IpFilterManager,
    stats: Arc<parking_lot::Mutex<StatsAccumulator>>,
    poller: StatsPoller,
    disabled: tokio::sync::Mutex<bool>,
}

impl Adapter {
    /// Load the persisted document, recover from an unclean shutdown, put the
    /// persisted bans back into the engine and start collecting statistics.
    pub async fn enable(
        engine: Arc<dyn NetworkEngine>,
        store: Arc<dyn ConfigStore>,
        opts: AdapterOptions,
    ) -> Result<Arc<Self>> {
        let config = Arc::new(PersistentConfig::load(store).await?);
        let (history, crash_snapshot, blocklist) = config
            .read(|c| (c.history_status, c.session_status, c.blocklist.clone()))
            .await;

        let (accumulator, recovered) =
            StatsAccumulator::recover(history, crash_snapshot, Utc::now());
        if recovered {
            let history = *accumulator.history();
            config
                .update(|c| {
                    c.history_status = history;
                    c.session_status = None;
                    Ok(())
                })
                .await?;
        }

        let filter = IpFilterManager::new(engine.clone());
        filter.restore(&blocklist)?;

        let stats = Arc::new(parking_lot::Mutex::new(accumulator));
        let poller = StatsPoller::start(
            engine.clone(),
            stats.clone(),
            config.clone(),
            opts.stats_poll_interval,
        );

        info!(
            banned = filter.snapshot().size,
            recovered, "peerban adapter enabled"
        );
        Ok(Arc::new(Self {
            engine,
            config,
            filter,
            stats,
            poller,
            disabled: tokio::sync::Mutex::new(false),
        }))
    }

    /// Stop collecting statistics, fold this session into history and save
    /// everything. Calling it again after it succeeded does nothing.
    pub async fn disable(&self) -> Result<()> {
        let mut disabled = self.disabled.lock().await;
        if *disabled {
            return Ok(());
        }
        self.poller.stop().await;

        let blocklist = self.filter.ips();
        let history = self.stats.lock().finish();
        self.config
            .update(|c| {
                c.blocklist = blocklist;
                c.history_status = history;
                c.session_status = None;
                Ok(())
            })
            .await
            .inspect_err(|e| warn!("error saving state on disable: {e:#}"))?;

        *disabled = true;
        info!(
            total_download = history.total_download,
            total_upload = history.total_upload,
            "peerban adapter disabled"
        );
        Ok(())
    }

    pub fn engine(&self) -> &Arc<dyn NetworkEngine> {
        &self.engine
    }

    pub fn config(&self) -> &PersistentConfig {
        &self.config
    }

    pub fn filter(&self) -> &IpFilterManager {
        &self.filter
    }

    /// Merge arbitrary keys into the persisted document.
    pub async fn set_config(&self, patch: Map<String, Value>) -> Result<()> {
        self.config.update(|c| c.merge(patch)).await
    }

    pub fn history_status(&self) -> PersistenceStatus {
        *self.stats.lock().history()
    }

    /// History plus the session as of the last completed poll. A new poll is
    /// requested, its result shows up in the next call.
    pub fn session_totals(&self) -> SessionStatus {
        let view = self.stats.lock().combined_view();
        self.poller.request_poll();
        view
    }

    /// Like [`Self::session_totals`], but waits for a fresh poll first.
    pub async fn refresh_session_totals(&self) -> Result<SessionStatus> {
        self.poller.refresh_now().await?;
        Ok(self.stats.lock().combined_view())
    }
}
