use std::io::LineWriter;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

const DEFAULT_LOG_FILE_RUST_LOG: &str = "info,libpeerban=debug";

#[derive(Default)]
pub struct InitLoggingOptions<'a> {
    pub default_rust_log_value: Option<&'a str>,
    /// Write stderr logs as JSON lines.
    pub json: bool,
    pub log_file: Option<&'a str>,
    pub log_file_rust_log: Option<&'a str>,
}

#[inline(never)]
pub fn init_logging(opts: InitLoggingOptions) -> anyhow::Result<()> {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(
            opts.default_rust_log_value
                .unwrap_or("info")
                .parse()
                .context("can't parse provided rust_log value")?,
        )
        .from_env()
        .context("invalid RUST_LOG value")?;

    let stderr_layer = if opts.json {
        fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_filter(stderr_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(stderr_filter)
            .boxed()
    };

    let file_layer = match opts.log_file {
        Some(log_file) => {
            let writer = std::sync::Mutex::new(LineWriter::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_file)
                    .with_context(|| format!("error opening log file {log_file:?}"))?,
            ));
            let filter = EnvFilter::builder()
                .parse(opts.log_file_rust_log.unwrap_or(DEFAULT_LOG_FILE_RUST_LOG))
                .context("can't parse log-file-rust-log")?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("can't init logging")?;
    Ok(())
}
