use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, trace, warn};

use super::{
    RefreshOutcome, SESSION_METRIC_NAMES, accumulator::StatsAccumulator,
    counters::CumulativeCounters, status::SessionStatus,
};
use crate::{
    Result, config::PersistentConfig, engine::NetworkEngine, spawn_utils::spawn_with_cancel,
};

type Responder = oneshot::Sender<Result<SessionStatus>>;

struct PollRequest {
    respond_to: Option<Responder>,
}

/// Feeds engine counters into the accumulator.
///
/// There is exactly one task applying snapshots. Requests are served in the
/// order they were sent; a request that arrives while a poll is in flight is
/// served after it, against the newer state.
pub struct StatsPoller {
    tx: mpsc::UnboundedSender<PollRequest>,
    cancel: CancellationToken,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

struct PollerTask {
    engine: Arc<dyn NetworkEngine>,
    accumulator: Arc<parking_lot::Mutex<StatsAccumulator>>,
    config: Arc<PersistentConfig>,
}

impl StatsPoller {
    pub fn start(
        engine: Arc<dyn NetworkEngine>,
        accumulator: Arc<parking_lot::Mutex<StatsAccumulator>>,
        config: Arc<PersistentConfig>,
        poll_interval: Option<Duration>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = PollerTask {
            engine,
            accumulator,
            config,
        };

        if let Some(interval) = poll_interval {
            let tx = tx.clone();
            spawn_with_cancel(
                debug_span!("stats_ticker", ?interval),
                cancel.clone(),
                async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        tx.send(PollRequest { respond_to: None })
                            .context("stats poller is gone")?;
                    }
                },
            );
        }

        let handle = spawn_with_cancel(
            debug_span!("stats_poller"),
            cancel.clone(),
            task.run(rx),
        );

        Self {
            tx,
            cancel,
            task: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Ask for a poll without waiting for it.
    pub fn request_poll(&self) {
        if self.tx.send(PollRequest { respond_to: None }).is_err() {
            debug!("stats poller stopped, dropping poll request");
        }
    }

    /// Poll now and wait for the refreshed live session.
    pub async fn refresh_now(&self) -> Result<SessionStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PollRequest {
                respond_to: Some(tx),
            })
            .context("stats poller stopped")?;
        rx.await.context("stats poller stopped")?
    }

    /// Stop polling. Requests already queued are dropped.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error=?e, "stats poller task failed");
            }
        }
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PollerTask {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PollRequest>) -> anyhow::Result<()> {
        while let Some(req) = rx.recv().await {
            let r = self.poll_once().await;
            if let Err(e) = &r {
                warn!("error refreshing session stats: {e:#}");
            }
            if let Some(respond_to) = req.respond_to {
                let _ = respond_to.send(r);
            }
        }
        Ok(())
    }

    async fn poll_once(&self) -> Result<SessionStatus> {
        let metrics = self
            .engine
            .session_metrics(&SESSION_METRIC_NAMES)
            .await
            .context("error fetching session metrics")?;
        let counters = CumulativeCounters::from_metrics(&metrics, Utc::now())?;

        let (outcome, session) = {
            let mut acc = self.accumulator.lock();
            let outcome = acc.refresh(&counters)?;
            (outcome, acc.session().clone())
        };

        match outcome {
            RefreshOutcome::Skipped => trace!("snapshot skipped"),
            RefreshOutcome::Applied { checkpoint: None } => {}
            RefreshOutcome::Applied {
                checkpoint: Some(checkpoint),
            } => {
                debug!(
                    total_download = checkpoint.total_download,
                    total_upload = checkpoint.total_upload,
                    "writing session checkpoint"
                );
                if let Err(e) = self
                    .config
                    .update(|c| {
                        c.session_status = Some(checkpoint);
                        Ok(())
                    })
                    .await
                {
                    error!("error writing session checkpoint: {e:#}");
                    return Err(e);
                }
            }
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::{config::MemoryConfigStore, engine::local::LocalEngine, stats::PersistenceStatus};

    async fn setup() -> (Arc<LocalEngine>, Arc<parking_lot::Mutex<StatsAccumulator>>, StatsPoller) {
        let engine = Arc::new(LocalEngine::default());
        let config = Arc::new(
            PersistentConfig::load(Arc::new(MemoryConfigStore::default()))
                .await
                .unwrap(),
        );
        let accumulator = Arc::new(parking_lot::Mutex::new(StatsAccumulator::new(
            PersistenceStatus::default(),
            Utc::now() - TimeDelta::seconds(1),
        )));
        let poller = StatsPoller::start(engine.clone(), accumulator.clone(), config, None);
        (engine, accumulator, poller)
    }

    #[tokio::test]
    async fn test_refresh_now_applies_engine_counters() {
        crate::tests::test_util::setup_test_logging();
        let (engine, accumulator, poller) = setup().await;
        engine.counters.recv_bytes(1000);
        engine.counters.recv_ip_overhead_bytes(24);
        engine.counters.sent_payload_bytes(7);

        let session = poller.refresh_now().await.unwrap();
        assert_eq!(session.totals.total_download, 1024);
        assert_eq!(session.totals.total_payload_upload, 7);
        assert!(session.rates.download_rate > 0f64);
        assert_eq!(accumulator.lock().session(), &session);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_requests_are_served_in_order() {
        let (engine, accumulator, poller) = setup().await;
        engine.counters.sent_bytes(10);
        poller.request_poll();
        poller.request_poll();
        // Answered only after the two requests before it.
        let session = poller.refresh_now().await.unwrap();
        assert_eq!(session.totals.total_upload, 10);

        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.counters.sent_bytes(5);
        let session = poller.refresh_now().await.unwrap();
        assert_eq!(session.totals.total_upload, 15);
        assert_eq!(accumulator.lock().session().totals.total_upload, 15);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_poller_refuses_requests() {
        let (_engine, _accumulator, poller) = setup().await;
        poller.stop().await;
        poller.stop().await;
        poller.request_poll();
        assert!(poller.refresh_now().await.is_err());
    }

    #[tokio::test]
    async fn test_periodic_polling() {
        let (engine, accumulator, poller) = {
            let engine = Arc::new(LocalEngine::default());
            let config = Arc::new(
                PersistentConfig::load(Arc::new(MemoryConfigStore::default()))
                    .await
                    .unwrap(),
            );
            let accumulator = Arc::new(parking_lot::Mutex::new(StatsAccumulator::new(
                Default::default(),
                Utc::now() - TimeDelta::seconds(1),
            )));
            let poller = StatsPoller::start(
                engine.clone(),
                accumulator.clone(),
                config,
                Some(Duration::from_millis(10)),
            );
            (engine, accumulator, poller)
        };
        engine.counters.dht_bytes_in(3);
        tokio::time::timeout(Duration::from_secs(5), async {
            while accumulator.lock().session().totals.dht_download != 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        poller.stop().await;
    }
}
