// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Grid Bot - ERC-20 grid trading with trailing stops and a portfolio
//! circuit breaker.

mod config;
mod exec;
mod grid;
mod notifier;
mod risk;
mod storage;
mod strategy;

use config::Config;
use exec::{create_provider, AlloyChainClient, ChainlinkPriceSource, GasStrategy, HttpQuoteClient};
use notifier::TelegramNotifier;
use risk::{CircuitBreaker, CircuitBreakerConfig, TrailingStopConfig};
use storage::{JsonFileStore, StateStore};
use strategy::{CycleScheduler, StrategyEngine};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grid-bot", about = "ERC-20 grid trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trading loop (default).
    Run,
    /// Sell every holding position, then exit.
    Liquidate,
    /// Clear a triggered circuit breaker, then exit.
    ResetBreaker,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(anyhow::Error::msg)?;

    info!("🚀 Grid Bot starting...");
    info!("📡 RPC: {}", config.rpc_url);
    info!("👛 Wallet: {:?}", config.wallet_address);
    info!(
        "📊 Strategy '{}': {} positions on {:?}",
        config.strategy.name, config.strategy.num_positions, config.strategy.token_address
    );

    let provider = create_provider(&config.rpc_url, &config.private_key)?;
    info!("✅ Connected to RPC");

    let quote_client = HttpQuoteClient::new(config.quote_api_url.clone(), config.quote_api_key.clone());
    let chain = AlloyChainClient::new(
        provider.clone(),
        config.wallet_address,
        config.gas_limit,
        GasStrategy::from_multiplier(config.gas_multiplier),
    )
    .await?;
    let oracle = ChainlinkPriceSource::new(provider, config.price_feed_address);

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("Failed to create state dir {}", config.state_dir))?;
    let store = JsonFileStore::new(config.state_dir.clone());

    let telegram = TelegramNotifier::new(
        config.telegram_token.clone(),
        config.telegram_chat_id.clone(),
    );

    let breaker_config = CircuitBreakerConfig {
        max_daily_loss_pct: config.max_daily_loss_pct,
        max_total_loss_pct: config.max_total_loss_pct,
        cooldown_minutes: config.breaker_cooldown_minutes,
        auto_reset_at_midnight: config.auto_reset_at_midnight,
        ..CircuitBreakerConfig::default()
    };
    let breaker = match store.load_breaker()? {
        Some(state) => {
            info!("📂 Restored circuit breaker state (triggered={})", state.triggered);
            CircuitBreaker::with_state(breaker_config, state, telegram.clone())
        }
        None => CircuitBreaker::new(breaker_config, telegram.clone()),
    };
    let breaker = Arc::new(Mutex::new(breaker));
    let ledger = Arc::new(Mutex::new(strategy::PortfolioLedger::default()));

    let trailing = config.trailing_enabled.then(|| TrailingStopConfig {
        activation_pct: config.trailing_activation_pct,
        trail_pct: config.trailing_pct,
        steps: Vec::new(),
    });

    let mut engine = StrategyEngine::new(
        config.strategy.clone(),
        config.wallet_address,
        config.min_price_confidence,
        trailing,
        quote_client,
        chain,
        oracle,
        store.clone(),
        telegram.clone(),
        breaker.clone(),
        ledger,
    );

    if let Some(snapshot) = store
        .load_strategies()?
        .into_iter()
        .find(|s| s.name == config.strategy.name)
    {
        engine.restore(snapshot);
        let stats = grid::calculate_grid_stats(engine.positions());
        info!(
            "📊 Grid: {} positions ({} empty, {} holding, {} sold), invested {:.6} ETH, realized {:.6} ETH",
            stats.total,
            stats.empty,
            stats.holding,
            stats.sold,
            exec::wei_to_eth(stats.total_invested_wei),
            exec::wei_to_eth(stats.total_profit_wei)
        );
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Liquidate => {
            let outcome = engine.liquidate_all().await;
            info!(
                "🧹 Liquidation done: {}/{} sold, {} failed, {:+.6} ETH realized",
                outcome.sold, outcome.attempted, outcome.failed, outcome.realized_eth
            );
            flush_notifications().await;
            return Ok(());
        }
        Command::ResetBreaker => {
            let mut guard = breaker.lock().await;
            guard.reset();
            store.save_breaker(guard.state())?;
            info!("✅ Circuit breaker reset");
            flush_notifications().await;
            return Ok(());
        }
        Command::Run => {}
    }

    telegram.send_message("🚀 Grid Bot launching...".to_string());

    let mut scheduler = CycleScheduler::new(vec![engine]);
    let mut heartbeat = tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms));

    info!(
        "✅ Grid Bot ready, heartbeat every {}ms",
        config.heartbeat_interval_ms
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("🛑 Shutdown signal received, saving state...");
                save_all(&scheduler, &store, &breaker).await;
                telegram.send_message("🛑 Grid Bot shutting down gracefully...".to_string());
                break;
            }

            _ = heartbeat.tick() => {
                if let Some(summary) = scheduler.advance().await {
                    debug!(
                        "[{}] cycle @ {:.10}: {} buys, {} sells, {} gated, {} errors",
                        summary.strategy,
                        summary.price,
                        summary.buys_executed,
                        summary.sells_executed,
                        summary.sell_candidates_skipped,
                        summary.errors
                    );
                }
                if scheduler.all_stopped() {
                    warn!("🛑 All strategies stopped, shutting down");
                    save_all(&scheduler, &store, &breaker).await;
                    telegram.send_message("🛑 Grid Bot stopped: no running strategies.".to_string());
                    break;
                }
            }
        }
    }

    flush_notifications().await;
    Ok(())
}

async fn save_all<Q, C, P, S, N>(
    scheduler: &CycleScheduler<Q, C, P, S, N>,
    store: &JsonFileStore,
    breaker: &Arc<Mutex<CircuitBreaker<N>>>,
) where
    Q: exec::QuoteClient,
    C: exec::ChainClient,
    P: exec::PriceSource,
    S: StateStore,
    N: notifier::Notifier,
{
    for engine in scheduler.engines() {
        if let Err(e) = store.save_strategy(&engine.snapshot()) {
            error!("❌ Failed to save strategy '{}': {:#}", engine.name(), e);
        }
    }
    let guard = breaker.lock().await;
    if let Err(e) = store.save_breaker(guard.state()) {
        error!("❌ Failed to save breaker state: {:#}", e);
    }
    info!("✅ State saved");
}

/// Notification sends are detached tasks; give them a moment before the
/// runtime is torn down.
async fn flush_notifications() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}
