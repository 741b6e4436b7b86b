#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "cumulative counter {name} went backwards ({previous} -> {current}), engine was probably restarted"
    )]
    CounterRegression {
        name: &'static str,
        previous: u64,
        current: u64,
    },

    #[error("engine did not report metric {0:?}")]
    MissingMetric(&'static str),

    #[error("invalid IP address {0:?}")]
    InvalidAddress(String),

    #[error("ip filter rule {first}-{last} mixes address families")]
    MixedAddressFamilies {
        first: std::net::IpAddr,
        last: std::net::IpAddr,
    },

    #[error("ip filter rule {first}-{last} is reversed")]
    ReversedRange {
        first: std::net::IpAddr,
        last: std::net::IpAddr,
    },

    #[error("engine rejected ip filter update: {0:#}")]
    FilterSync(#[source] anyhow::Error),

    #[error("error persisting config: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("invalid config: {0:#}")]
    InvalidConfig(#[source] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
