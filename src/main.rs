use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quotagate::config::{GateConfig, Strategy};
use quotagate::ratelimit::{
    Clock, OptimisticRateLimiter, RateLimiter, RateLimiterBackend, SystemClock,
};
use quotagate::storage::{InMemoryRateStore, TimeoutStore};

/// Replay admission decisions for requests read from stdin.
///
/// Each input line is `<key> [request_time_ms]`; each output line is the
/// resulting rate state as JSON.
#[derive(Parser, Debug)]
#[command(name = "quotagate", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name of the policy to apply (falls back to the default policy)
    #[arg(short, long)]
    policy: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting Quotagate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => GateConfig::load(path)?,
        None => GateConfig::default(),
    };
    config.validate()?;

    let Some(policy) = config.policy(cli.policy.as_deref()).cloned() else {
        bail!("no policy named {:?} and no default_policy configured", cli.policy);
    };
    info!(
        strategy = ?config.limiter.strategy,
        limit = ?policy.limit,
        quota = ?policy.quota,
        refresh_interval = policy.refresh_interval,
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryRateStore::new());
    let limiter = build_limiter(&config, store.clone());
    let purger = spawn_purger(store, config.storage.purge_interval_secs);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    loop {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = &mut shutdown => break,
        };
        let Some(line) = line else {
            info!("Input closed");
            break;
        };
        let line = line.context("failed to read request line")?;

        let (key, request_time) = match parse_request(&line) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping malformed request line");
                continue;
            }
        };

        match limiter.consume(&policy, &key, request_time).await {
            Ok(state) => println!("{}", serde_json::to_string(&state)?),
            Err(e) => {
                error!(key = %key, error = %e, "Consume failed");
                println!("{}", serde_json::json!({ "key": key, "error": e.to_string() }));
            }
        }
    }

    if let Some(purger) = purger {
        purger.abort();
    }
    info!("Quotagate stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_limiter(
    config: &GateConfig,
    store: Arc<InMemoryRateStore>,
) -> Arc<dyn RateLimiterBackend> {
    let store = TimeoutStore::new(store, Duration::from_millis(config.storage.timeout_ms));
    match config.limiter.strategy {
        Strategy::Striped => Arc::new(RateLimiter::with_clock(
            store,
            SystemClock,
            config.limiter.lock_stripes,
        )),
        Strategy::Optimistic => Arc::new(OptimisticRateLimiter::with_clock(
            store,
            SystemClock,
            config.limiter.max_attempts,
        )),
    }
}

/// Periodically evict expired windows from the store.
fn spawn_purger(
    store: Arc<InMemoryRateStore>,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            store.purge_expired(SystemClock.now());
        }
    }))
}

/// Parse `<key> [request_time_ms]`; blank lines yield `None`.
fn parse_request(line: &str) -> anyhow::Result<Option<(String, Option<u64>)>> {
    let mut parts = line.split_whitespace();
    let Some(key) = parts.next() else {
        return Ok(None);
    };
    let request_time = parts
        .next()
        .map(|raw| raw.parse::<u64>())
        .transpose()
        .with_context(|| format!("invalid request time in {:?}", line))?;
    if parts.next().is_some() {
        bail!("unexpected trailing fields in {:?}", line);
    }
    Ok(Some((key.to_string(), request_time)))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        assert_eq!(
            parse_request("userA").unwrap(),
            Some(("userA".to_string(), None))
        );
        assert_eq!(
            parse_request("  userA   250 ").unwrap(),
            Some(("userA".to_string(), Some(250)))
        );
        assert_eq!(parse_request("   ").unwrap(), None);
        assert!(parse_request("userA soon").is_err());
        assert!(parse_request("userA 1 2").is_err());
    }

    #[test]
    fn test_build_limiter_for_each_strategy() {
        let mut config = GateConfig::default();
        let _striped = build_limiter(&config, Arc::new(InMemoryRateStore::new()));

        config.limiter.strategy = Strategy::Optimistic;
        let _optimistic = build_limiter(&config, Arc::new(InMemoryRateStore::new()));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::parse_from(["quotagate", "--config", "gate.yaml", "-p", "api", "--log-json"]);
        assert_eq!(cli.config, Some(PathBuf::from("gate.yaml")));
        assert_eq!(cli.policy.as_deref(), Some("api"));
        assert!(cli.log_json);
    }
}
