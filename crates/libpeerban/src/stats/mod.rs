mod accumulator;
mod counters;
mod poller;
mod status;

pub use accumulator::{CHECKPOINT_INTERVAL, RefreshOutcome, StatsAccumulator};
pub use counters::{CumulativeCounters, SESSION_METRIC_NAMES};
pub use poller::StatsPoller;
pub use status::{PersistenceStatus, SessionGauges, SessionRates, SessionStatus, persistable_view};
