use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use libpeerban::{
    Adapter, AdapterOptions, Api,
    config::{ConfigStore, DEFAULT_CONFIG_FILENAME, JsonConfigStore, MemoryConfigStore},
    engine::local::{LocalEngine, LocalEngineOptions},
    http_api::{HttpApi, HttpApiOptions},
    spawn_utils::spawn,
    tracing_subscriber_config_utils::{InitLoggingOptions, init_logging},
};
use tracing::{error_span, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Parser)]
#[command(version, author, about)]
struct Opts {
    /// The console loglevel
    #[arg(value_enum, short = 'v', env = "PEERBAN_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// The log filename to also write to in addition to the console.
    #[arg(long = "log-file", env = "PEERBAN_LOG_FILE")]
    log_file: Option<String>,

    /// The value for RUST_LOG in the log file
    #[arg(
        long = "log-file-rust-log",
        default_value = "info,libpeerban=debug",
        env = "PEERBAN_LOG_FILE_RUST_LOG"
    )]
    log_file_rust_log: String,

    /// Write console logs as JSON lines.
    #[arg(long = "log-json", env = "PEERBAN_LOG_JSON")]
    log_json: bool,

    /// Where the blocklist and traffic history are kept. Defaults to the
    /// user's configuration directory.
    #[arg(long = "config-file", env = "PEERBAN_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Don't read or write the config file. Everything is lost on exit.
    #[arg(long = "no-persistence", env = "PEERBAN_NO_PERSISTENCE")]
    no_persistence: bool,

    /// The listen address for HTTP API
    #[arg(
        long = "http-api-listen-addr",
        default_value = "127.0.0.1:3031",
        env = "PEERBAN_HTTP_API_LISTEN_ADDR"
    )]
    http_api_listen_addr: SocketAddr,

    /// Only expose methods that don't change state.
    #[arg(long = "http-api-read-only", env = "PEERBAN_HTTP_API_READ_ONLY")]
    read_only: bool,

    /// Enable HTTP basic auth for the API, in the form "user:password".
    #[arg(long = "http-basic-auth", env = "PEERBAN_HTTP_BASIC_AUTH_USERPASS")]
    http_basic_auth: Option<String>,

    /// Also poll traffic counters on this interval, e.g. 10s. By default
    /// they are only polled when session totals are requested.
    #[arg(
        long = "stats-poll-interval",
        value_parser = parse_duration::parse,
        env = "PEERBAN_STATS_POLL_INTERVAL"
    )]
    stats_poll_interval: Option<Duration>,

    /// Refuse filter tables with more rules than this.
    #[arg(long = "max-filter-rules", env = "PEERBAN_MAX_FILTER_RULES")]
    max_filter_rules: Option<usize>,

    /// Set this flag if you want to use tokio's single threaded runtime.
    #[arg(short, long)]
    single_thread_runtime: bool,

    /// How many threads to spawn for the executor.
    #[arg(short = 't', long)]
    worker_threads: Option<usize>,
}

fn default_config_file() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "peerban", "peerban-adapter")
        .context("can't determine the configuration directory")?;
    Ok(dirs.config_dir().join(DEFAULT_CONFIG_FILENAME))
}

fn parse_basic_auth(userpass: &str) -> anyhow::Result<(String, String)> {
    let (user, pass) = userpass
        .split_once(':')
        .context("basic auth credentials should be in format \"user:password\"")?;
    Ok((user.to_owned(), pass.to_owned()))
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).context("error installing SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("error waiting for ctrl-c")?,
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("error waiting for ctrl-c")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let mut rt_builder = match opts.single_thread_runtime {
        true => tokio::runtime::Builder::new_current_thread(),
        false => {
            let mut b = tokio::runtime::Builder::new_multi_thread();
            if let Some(e) = opts.worker_threads {
                b.worker_threads(e);
            }
            b
        }
    };

    let rt = rt_builder.enable_time().enable_io().build()?;

    rt.block_on(async_main(opts))
}

async fn async_main(opts: Opts) -> anyhow::Result<()> {
    init_logging(InitLoggingOptions {
        default_rust_log_value: Some(match opts.log_level.unwrap_or(LogLevel::Info) {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }),
        json: opts.log_json,
        log_file: opts.log_file.as_deref(),
        log_file_rust_log: Some(&opts.log_file_rust_log),
    })?;

    let store: Arc<dyn ConfigStore> = if opts.no_persistence {
        warn!("persistence disabled, the blocklist and traffic history will be lost on exit");
        Arc::new(MemoryConfigStore::default())
    } else {
        let filename = match opts.config_file.clone() {
            Some(f) => f,
            None => default_config_file()?,
        };
        let store = JsonConfigStore::new(filename).await?;
        info!(filename=?store.filename(), "using config file");
        Arc::new(store)
    };

    let engine = Arc::new(LocalEngine::new(LocalEngineOptions {
        max_filter_rules: opts.max_filter_rules,
    }));

    let adapter = Adapter::enable(
        engine,
        store,
        AdapterOptions {
            stats_poll_interval: opts.stats_poll_interval,
        },
    )
    .await
    .context("error enabling adapter")?;

    let basic_auth = opts
        .http_basic_auth
        .as_deref()
        .map(parse_basic_auth)
        .transpose()?;

    let listener = tokio::net::TcpListener::bind(opts.http_api_listen_addr)
        .await
        .with_context(|| format!("error binding to {}", opts.http_api_listen_addr))?;
    info!("HTTP API listening on http://{}", opts.http_api_listen_addr);

    let http_api = HttpApi::new(
        Api::new(adapter.clone()),
        Some(HttpApiOptions {
            read_only: opts.read_only,
            basic_auth,
        }),
    );
    let server = spawn(
        error_span!("http_api"),
        http_api.make_http_api_and_run(listener),
    );

    wait_for_shutdown().await?;
    info!("shutting down");
    server.abort();

    adapter.disable().await.context("error disabling adapter")?;
    Ok(())
}
