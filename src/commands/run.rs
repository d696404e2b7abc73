//! Run Command
//!
//! Starts one grid session per configured (user, symbol) and keeps them
//! polling until Ctrl+C, then stops every session and waits for the tasks to
//! finish. In paper mode orders go to an in-memory venue priced from the live
//! Binance ticker, so no credentials are needed.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use spot_grid::binance::{BinanceClient, BinanceFactory};
use spot_grid::exchange::{ClientFactory, Credentials, PaperExchange, PaperFactory};
use spot_grid::grid::LogSink;
use spot_grid::session::SessionSupervisor;
use spot_grid::Config;

pub fn run(config_path: String, paper_mode: bool) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    if config.sessions.is_empty() {
        bail!("No sessions configured in {}", config_path);
    }

    info!("Configuration loaded from {}", config_path);
    info!(
        "Mode: {}",
        if paper_mode { "PAPER TRADING" } else { "LIVE TRADING" }
    );
    for session in &config.sessions {
        let grid = config.grid_for(session);
        info!(
            "  {}: drop={}% rise={}% investment={} poll={}ms{}",
            session.label(),
            grid.percentage_drop,
            grid.percentage_rise,
            grid.investment_amount,
            grid.poll_interval_ms,
            if grid.buys_enabled() { "" } else { " (no buys)" }
        );
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run_sessions(config, paper_mode))
}

async fn run_sessions(config: Config, paper_mode: bool) -> Result<()> {
    let client_config = config.exchange.client_config();

    let factory: Arc<dyn ClientFactory> = if paper_mode {
        let market = BinanceClient::public(client_config)?;
        Arc::new(PaperFactory::new(Arc::new(PaperExchange::with_market(
            Arc::new(market),
        ))))
    } else {
        warn!("LIVE TRADING MODE - REAL MONEY AT RISK");
        Arc::new(BinanceFactory::new(client_config))
    };

    let supervisor = SessionSupervisor::new(factory);
    let mut started = 0usize;

    for session in &config.sessions {
        let credentials = if paper_mode {
            config
                .credentials_for(session)
                .unwrap_or_else(|_| Credentials::new(session.user.clone(), "paper"))
        } else {
            match config.credentials_for(session) {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!("Skipping {}: {:#}", session.label(), e);
                    continue;
                }
            }
        };

        let sink = Arc::new(LogSink::new(session.label()));
        match supervisor
            .start(
                session.user.clone(),
                credentials,
                session.symbol.clone(),
                config.grid_for(session),
                sink,
            )
            .await
        {
            Ok(handle) => {
                info!("Session {} running", handle.key());
                started += 1;
            }
            Err(e) => error!("Failed to start {}: {:#}", session.label(), e),
        }
    }

    if started == 0 {
        bail!("No grid session could be started");
    }

    info!("{} session(s) running, press Ctrl+C to stop", started);
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating shutdown..."),
        Err(e) => error!("Error setting up signal handler: {}", e),
    }

    for (key, result) in supervisor.stop_all().await {
        match result {
            Ok(()) => info!("Session {} stopped", key),
            Err(e) => warn!("Session {} did not stop cleanly: {}", key, e),
        }
    }

    info!("Grid bot shut down.");
    Ok(())
}
