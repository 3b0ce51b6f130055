// Sales leaderboard entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open the override store
// 4. Create channels and the shutdown signal
// 5. Spawn the CORS proxy task (if enabled)
// 6. Spawn the poller task
// 7. Spawn the celebration engine task
// 8. Operator console on stdin (blocks until quit)
// 9. Signal shutdown and wait for tasks (with timeout)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{error, info, warn};

use salesboard::celebration::{run_engine, CelebrationSequencer, NullAudioPlayer};
use salesboard::config;
use salesboard::display::{DisplaySurface, LogDisplay};
use salesboard::feed::HttpFeed;
use salesboard::poller::Poller;
use salesboard::proxy;
use salesboard::reveal::RevealingDisplay;
use salesboard::sim::Simulator;
use salesboard::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Sales leaderboard starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: feed={}, poll every {}s, celebration {}s",
        config.feed.url, config.feed.poll_interval_secs, config.celebration.display_secs
    );

    // 3. Open the override store
    let store = Arc::new(Store::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Create channels and the shutdown signal
    let (celebration_tx, celebration_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_now = Arc::new(Notify::new());

    // The reveal surface wraps the actual display so polled team totals
    // count up instead of jumping.
    let reveal_display = Arc::new(RevealingDisplay::new(
        Arc::new(LogDisplay),
        config.reveal.duration(),
    ));
    let reveal_handle = tokio::spawn(reveal_display.clone().run(shutdown_rx.clone()));
    let display: Arc<dyn DisplaySurface> = reveal_display;

    // 5. Spawn the CORS proxy task (if enabled)
    let proxy_handle = if config.proxy.enabled {
        let proxy_config = config.proxy.clone();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = proxy::run(proxy_config, shutdown).await {
                error!("Proxy error: {e:#}");
            }
        }))
    } else {
        info!("Proxy disabled, polling the upstream directly");
        None
    };

    // 6. Spawn the poller task
    let feed = Arc::new(HttpFeed::new(config.feed.url.clone()));
    let poller = Poller::new(
        feed,
        store.clone(),
        display.clone(),
        celebration_tx,
        config.feed.clone(),
    );
    let poller_handle = tokio::spawn(poller.run(poll_now.clone(), shutdown_rx.clone()));

    // 7. Spawn the celebration engine task
    let sequencer = CelebrationSequencer::new(
        NullAudioPlayer::default(),
        config.celebration.clone(),
        store.clone(),
        display.clone(),
    );
    let engine_handle = tokio::spawn(run_engine(
        celebration_rx,
        sequencer,
        config.celebration.settle(),
        shutdown_rx,
    ));

    // 8. Operator console on stdin (blocks until quit)
    let simulator = Simulator::new(store, poll_now);
    info!("Application ready");
    run_console(&simulator).await;

    // 9. Signal shutdown and wait for tasks (with timeout)
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = poller_handle.await;
        let _ = engine_handle.await;
        let _ = reveal_handle.await;
        if let Some(handle) = proxy_handle {
            let _ = handle.await;
        }
    })
    .await;

    info!("Sales leaderboard shut down cleanly");
    Ok(())
}

/// Minimal operator console: inject test sales, inspect and clear pending
/// ones, force a poll. Returns when the operator quits or stdin closes.
async fn run_console(simulator: &Simulator) {
    println!("commands: sale <agent> <amount> | list | clear | poll | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("stdin error: {e}");
                break;
            }
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["sale", rest @ .., amount] if !rest.is_empty() => {
                let name = rest.join(" ");
                match amount.parse::<f64>() {
                    Ok(amount) if amount > 0.0 => {
                        if let Err(e) = simulator.simulate_sale(&name, amount) {
                            error!("failed to inject sale: {e:#}");
                        } else {
                            println!("injected: {name} ${amount}");
                        }
                    }
                    _ => println!("amount must be a positive number"),
                }
            }
            ["list"] => match simulator.pending() {
                Ok(pending) if pending.is_empty() => println!("no pending test sales"),
                Ok(pending) => {
                    for sale in pending {
                        println!("  {} ${} ({})", sale.agent_name, sale.amount, sale.timestamp);
                    }
                }
                Err(e) => error!("failed to list pending sales: {e:#}"),
            },
            ["clear"] => {
                if let Err(e) = simulator.clear() {
                    error!("failed to clear pending sales: {e:#}");
                } else {
                    println!("cleared");
                }
            }
            ["poll"] => {
                simulator.poll_now();
                println!("poll requested");
            }
            ["quit"] | ["exit"] => break,
            [] => {}
            _ => {
                warn!("unknown console command: {line}");
                println!("commands: sale <agent> <amount> | list | clear | poll | quit");
            }
        }
    }
}

/// Initialize tracing to log to a file (the terminal hosts the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("salesboard.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("salesboard=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
