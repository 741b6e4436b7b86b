use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, trace, warn};

use super::{
    counters::CumulativeCounters,
    status::{PersistenceStatus, SessionRates, SessionStatus, persistable_view},
};
use crate::{Error, Result};

/// Upper bound on how much traffic an unclean shutdown can lose.
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshOutcome {
    /// The snapshot was not newer than the last one, nothing changed.
    Skipped,
    /// The snapshot was applied. `checkpoint` is set when the session totals
    /// are due to be persisted.
    Applied {
        checkpoint: Option<PersistenceStatus>,
    },
}

/// Turns cumulative engine counters into rates and keeps them merged with the
/// totals of earlier runs.
///
/// Owned by a single writer. Nothing here does I/O: checkpoints are handed
/// back to the caller to persist.
///
/// A counter going backwards means the engine was reset under us. Every
/// snapshot after that is refused too, since the session totals would
/// otherwise double count, so traffic after the reset is lost to this
/// session.
#[derive(Debug)]
pub struct StatsAccumulator {
    session: SessionStatus,
    history: PersistenceStatus,
    /// Raw engine counters of the last applied snapshot.
    last_counters: CumulativeCounters,
    last_checkpoint: DateTime<Utc>,
    regressed: bool,
    finished: bool,
}

impl StatsAccumulator {
    pub fn new(history: PersistenceStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            session: SessionStatus::new(started_at),
            history,
            last_counters: CumulativeCounters::zero(started_at),
            last_checkpoint: started_at,
            regressed: false,
            finished: false,
        }
    }

    /// Start a session, first folding in the checkpoint of a run that didn't
    /// shut down cleanly. Returns whether a checkpoint was merged, in which
    /// case the caller must persist the new history and clear the checkpoint.
    pub fn recover(
        history: PersistenceStatus,
        crash_snapshot: Option<PersistenceStatus>,
        started_at: DateTime<Utc>,
    ) -> (Self, bool) {
        match crash_snapshot {
            Some(snapshot) => {
                warn!(
                    total_download = snapshot.total_download,
                    total_upload = snapshot.total_upload,
                    "previous run didn't shut down cleanly, merging its last checkpoint"
                );
                (Self::new(history + snapshot, started_at), true)
            }
            None => (Self::new(history, started_at), false),
        }
    }

    pub fn session(&self) -> &SessionStatus {
        &self.session
    }

    pub fn history(&self) -> &PersistenceStatus {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn refresh(&mut self, counters: &CumulativeCounters) -> Result<RefreshOutcome> {
        if self.finished {
            debug!("session already finished, ignoring counters");
            return Ok(RefreshOutcome::Skipped);
        }

        let elapsed = counters.timestamp - self.session.last_timestamp;
        let secs = elapsed.num_milliseconds() as f64 / 1000f64;
        if secs <= 0f64 {
            trace!(?elapsed, "stale counters snapshot, skipping");
            return Ok(RefreshOutcome::Skipped);
        }

        let raw = self
            .last_counters
            .byte_counters()
            .into_iter()
            .zip(counters.byte_counters());
        for ((name, previous), (_, current)) in raw {
            if current < previous {
                if self.regressed {
                    debug!(name, previous, current, "counter still behind, refusing snapshot");
                } else {
                    error!(
                        name,
                        previous, current, "cumulative counter went backwards, refusing snapshot"
                    );
                    self.regressed = true;
                }
                return Err(Error::CounterRegression {
                    name,
                    previous,
                    current,
                });
            }
        }

        let prev = self.session.totals;
        let current = PersistenceStatus::from(counters);

        let rate = |previous: u64, current: u64| (current - previous) as f64 / secs;
        self.session.rates = SessionRates {
            payload_download_rate: rate(
                prev.total_payload_download,
                current.total_payload_download,
            ),
            payload_upload_rate: rate(prev.total_payload_upload, current.total_payload_upload),
            download_rate: rate(prev.total_download, current.total_download),
            upload_rate: rate(prev.total_upload, current.total_upload),
            ip_overhead_download_rate: rate(
                prev.ip_overhead_download,
                current.ip_overhead_download,
            ),
            ip_overhead_upload_rate: rate(prev.ip_overhead_upload, current.ip_overhead_upload),
            dht_download_rate: rate(prev.dht_download, current.dht_download),
            dht_upload_rate: rate(prev.dht_upload, current.dht_upload),
            tracker_download_rate: rate(prev.tracker_download, current.tracker_download),
            tracker_upload_rate: rate(prev.tracker_upload, current.tracker_upload),
        };
        self.session.totals = current;
        self.session.gauges = counters.into();
        self.session.last_timestamp = counters.timestamp;
        self.last_counters = *counters;

        let since_checkpoint = counters.timestamp - self.last_checkpoint;
        let checkpoint = if since_checkpoint
            .to_std()
            .is_ok_and(|d| d > CHECKPOINT_INTERVAL)
        {
            self.last_checkpoint = counters.timestamp;
            Some(persistable_view(&self.session))
        } else {
            None
        };
        Ok(RefreshOutcome::Applied { checkpoint })
    }

    /// Session totals plus history. Rates and gauges come from the session only.
    pub fn combined_view(&self) -> SessionStatus {
        self.session.with_history(&self.history)
    }

    /// Merge the session into history and end it. Calling it again returns
    /// the same history without merging twice.
    pub fn finish(&mut self) -> PersistenceStatus {
        if !self.finished {
            self.history += persistable_view(&self.session);
            self.finished = true;
        }
        self.history
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn at(secs: i64) -> CumulativeCounters {
        CumulativeCounters::zero(t0() + TimeDelta::seconds(secs))
    }

    #[test]
    fn test_upload_rate() {
        let mut acc = StatsAccumulator::new(Default::default(), t0());
        let mut c = at(0);
        c.sent_bytes = 100;
        // Same timestamp as the session start: nothing to divide by.
        assert_eq!(acc.refresh(&c).unwrap(), RefreshOutcome::Skipped);

        acc.session.totals.total_upload = 100;
        let mut c = at(10);
        c.sent_bytes = 550;
        c.sent_ip_overhead_bytes = 50;
        assert_eq!(
            acc.refresh(&c).unwrap(),
            RefreshOutcome::Applied { checkpoint: None }
        );
        assert_eq!(acc.session().totals.total_upload, 600);
        assert_eq!(acc.session().rates.upload_rate, 50f64);
        assert_eq!(acc.session().rates.ip_overhead_upload_rate, 5f64);
    }

    #[test]
    fn test_same_timestamp_is_noop() {
        let mut acc = StatsAccumulator::new(Default::default(), t0());
        let mut c = at(5);
        c.recv_payload_bytes = 500;
        c.peers_connected = 4;
        acc.refresh(&c).unwrap();
        let before = acc.session().clone();

        let mut again = at(5);
        again.recv_payload_bytes = 900;
        again.peers_connected = 9;
        assert_eq!(acc.refresh(&again).unwrap(), RefreshOutcome::Skipped);
        assert_eq!(acc.refresh(&again).unwrap(), RefreshOutcome::Skipped);
        assert_eq!(acc.session(), &before);

        // Older snapshots are skipped too.
        assert_eq!(acc.refresh(&at(1)).unwrap(), RefreshOutcome::Skipped);
        assert_eq!(acc.session(), &before);
    }

    #[test]
    fn test_regression_is_reported_and_state_kept() {
        let mut acc = StatsAccumulator::new(Default::default(), t0());
        let mut c = at(1);
        c.recv_bytes = 1000;
        c.sent_bytes = 10;
        acc.refresh(&c).unwrap();
        let before = acc.session().clone();

        let mut c = at(2);
        c.recv_bytes = 900;
        c.sent_bytes = 20;
        match acc.refresh(&c) {
            Err(Error::CounterRegression {
                name,
                previous,
                current,
            }) => {
                assert_eq!(name, "net.recv_bytes");
                assert_eq!(previous, 1000);
                assert_eq!(current, 900);
            }
            other => panic!("expected regression, got {other:?}"),
        }
        assert_eq!(acc.session(), &before);
        assert!(acc.regressed);

        // Still behind on the next poll: refused again, nothing applied.
        let mut c = at(3);
        c.recv_bytes = 950;
        c.sent_bytes = 30;
        assert!(matches!(
            acc.refresh(&c),
            Err(Error::CounterRegression { .. })
        ));
        assert_eq!(acc.session(), &before);
    }

    #[test]
    fn test_regression_hidden_by_derived_totals() {
        let mut acc = StatsAccumulator::new(Default::default(), t0());
        let mut c = at(1);
        c.recv_bytes = 1000;
        c.recv_redundant_bytes = 500;
        acc.refresh(&c).unwrap();
        let before = acc.session().clone();

        // total_download and total_wasted both grow, the raw counters don't.
        let mut c = at(2);
        c.recv_bytes = 900;
        c.recv_ip_overhead_bytes = 200;
        c.recv_redundant_bytes = 100;
        c.recv_failed_bytes = 600;
        match acc.refresh(&c) {
            Err(Error::CounterRegression {
                name,
                previous,
                current,
            }) => {
                assert_eq!(name, "net.recv_bytes");
                assert_eq!(previous, 1000);
                assert_eq!(current, 900);
            }
            other => panic!("expected regression, got {other:?}"),
        }
        assert_eq!(acc.session(), &before);

        let mut acc = StatsAccumulator::new(Default::default(), t0());
        let mut c = at(1);
        c.recv_redundant_bytes = 500;
        acc.refresh(&c).unwrap();
        let mut c = at(2);
        c.recv_redundant_bytes = 100;
        c.recv_failed_bytes = 600;
        assert!(matches!(
            acc.refresh(&c),
            Err(Error::CounterRegression {
                name: "net.recv_redundant_bytes",
                ..
            })
        ));
    }

    #[test]
    fn test_combined_view_is_history_plus_deltas() {
        let history = PersistenceStatus {
            total_download: 1000,
            total_payload_upload: 7,
            total_wasted: 11,
            ..Default::default()
        };
        let mut acc = StatsAccumulator::new(history, t0());

        let deltas: [(u64, u64, u64); 4] = [(10, 5, 0), (0, 0, 3), (250, 1, 0), (7, 100, 2)];
        let mut c = at(0);
        let (mut sum_recv, mut sum_payload_up, mut sum_wasted) = (0, 0, 0);
        for (i, (recv, payload_up, failed)) in deltas.into_iter().enumerate() {
            c.timestamp = t0() + TimeDelta::seconds(i as i64 + 1);
            c.recv_bytes += recv;
            c.sent_payload_bytes += payload_up;
            c.recv_failed_bytes += failed;
            sum_recv += recv;
            sum_payload_up += payload_up;
            sum_wasted += failed;
            acc.refresh(&c).unwrap();
        }

        let view = acc.combined_view();
        assert_eq!(view.totals.total_download, 1000 + sum_recv);
        assert_eq!(view.totals.total_payload_upload, 7 + sum_payload_up);
        assert_eq!(view.totals.total_wasted, 11 + sum_wasted);
        assert_eq!(view.totals.total_upload, 0);
        // Last interval was one second long.
        assert_eq!(view.rates.download_rate, 7f64);
        assert_eq!(view.rates.payload_upload_rate, 100f64);
        // History itself is untouched until the session finishes.
        assert_eq!(acc.history(), &history);
    }

    #[test]
    fn test_checkpoint_every_30_minutes() {
        let mut acc = StatsAccumulator::new(Default::default(), t0());
        let mut c = at(60);
        c.recv_bytes = 1;
        assert_eq!(
            acc.refresh(&c).unwrap(),
            RefreshOutcome::Applied { checkpoint: None }
        );

        let mut c = at(1801);
        c.recv_bytes = 2;
        let expected = PersistenceStatus {
            total_download: 2,
            ..Default::default()
        };
        assert_eq!(
            acc.refresh(&c).unwrap(),
            RefreshOutcome::Applied {
                checkpoint: Some(expected)
            }
        );

        // Next checkpoint is measured from the last one, not from the last poll.
        let mut c = at(3000);
        c.recv_bytes = 3;
        assert_eq!(
            acc.refresh(&c).unwrap(),
            RefreshOutcome::Applied { checkpoint: None }
        );
        let c = at(3602);
        assert!(matches!(
            acc.refresh(&CumulativeCounters { recv_bytes: 4, ..c }).unwrap(),
            RefreshOutcome::Applied {
                checkpoint: Some(_)
            }
        ));
    }

    #[test]
    fn test_recover_merges_crash_snapshot() {
        let history = PersistenceStatus {
            total_download: 1000,
            ..Default::default()
        };
        let crash = PersistenceStatus {
            total_download: 500,
            ..Default::default()
        };
        let (acc, recovered) = StatsAccumulator::recover(history, Some(crash), t0());
        assert!(recovered);
        assert_eq!(acc.history().total_download, 1500);

        let (acc, recovered) = StatsAccumulator::recover(*acc.history(), None, t0());
        assert!(!recovered);
        assert_eq!(acc.history().total_download, 1500);
    }

    #[test]
    fn test_finish_is_terminal() {
        let history = PersistenceStatus {
            total_upload: 10,
            ..Default::default()
        };
        let mut acc = StatsAccumulator::new(history, t0());
        let mut c = at(3);
        c.sent_bytes = 90;
        acc.refresh(&c).unwrap();

        assert_eq!(acc.finish().total_upload, 100);
        assert_eq!(acc.finish().total_upload, 100);
        assert!(acc.is_finished());

        let mut c = at(4);
        c.sent_bytes = 1000;
        assert_eq!(acc.refresh(&c).unwrap(), RefreshOutcome::Skipped);
        assert_eq!(acc.history().total_upload, 100);
    }
}
