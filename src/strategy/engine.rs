// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The per-strategy decision loop.
//!
//! One `tick` is one heartbeat: refresh the price, lazily build the
//! grid, feed the circuit breaker, then attempt at most one buy and any
//! due sells. Trade failures are counted; too many in a row stop the
//! strategy. All collaborator failures are contained here, a tick never
//! propagates an error to the scheduler.

use crate::config::StrategyConfig;
use crate::exec::{eth_to_wei, wei_to_eth, ChainClient, PriceSource, QuoteClient};
use crate::grid::{self, GridPosition, PositionStatus};
use crate::notifier::{Notifier, NotifyEvent, TradeSide};
use crate::risk::{CircuitBreaker, TrailingStopConfig, TrailingStopTracker};
use crate::storage::{StateStore, StrategySnapshot};
use crate::strategy::PortfolioLedger;
use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// ETH spent on the reference quote used as a price fallback.
const PRICE_PROBE_ETH: f64 = 0.01;

/// Returned when every price source fails and no price was ever seen.
const SENTINEL_MIN_PRICE: f64 = 1e-18;

/// What one heartbeat did.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub strategy: String,
    pub price: f64,
    pub buys_executed: usize,
    pub sells_executed: usize,
    /// Sell candidates held back by the profitability gate.
    pub sell_candidates_skipped: usize,
    pub errors: usize,
    pub stopped: bool,
}

impl CycleSummary {
    fn new(strategy: &str, price: f64) -> Self {
        Self {
            strategy: strategy.to_string(),
            price,
            buys_executed: 0,
            sells_executed: 0,
            sell_candidates_skipped: 0,
            errors: 0,
            stopped: false,
        }
    }
}

/// Result of `liquidate_all`.
#[derive(Debug, Clone)]
pub struct LiquidationOutcome {
    pub attempted: usize,
    pub sold: usize,
    pub failed: usize,
    /// Signed PnL realized by this liquidation, in ETH.
    pub realized_eth: f64,
}

enum SellOutcome {
    Sold,
    GateFailed,
    /// Nothing to do: no quote, zero size, or state raced away.
    Skipped,
}

pub struct StrategyEngine<Q, C, P, S, N>
where
    Q: QuoteClient,
    C: ChainClient,
    P: PriceSource,
    S: StateStore,
    N: Notifier,
{
    config: StrategyConfig,
    wallet: Address,
    min_price_confidence: f64,

    positions: Vec<GridPosition>,
    trailing: TrailingStopTracker,
    trailing_enabled: bool,
    /// Position ids with a buy currently in flight.
    buying: HashSet<usize>,

    running: bool,
    consecutive_errors: u32,
    buy_count: u64,
    sell_count: u64,
    /// Sum of clamped per-position profits, never decreases.
    total_profit_wei: U256,
    /// Signed realized PnL in ETH, feeds the circuit breaker.
    realized_pnl_eth: f64,
    last_price: f64,

    quote_client: Q,
    chain: C,
    oracle: P,
    store: S,
    notifier: N,
    breaker: Arc<Mutex<CircuitBreaker<N>>>,
    ledger: Arc<Mutex<PortfolioLedger>>,
}

impl<Q, C, P, S, N> StrategyEngine<Q, C, P, S, N>
where
    Q: QuoteClient,
    C: ChainClient,
    P: PriceSource,
    S: StateStore,
    N: Notifier,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: StrategyConfig,
        wallet: Address,
        min_price_confidence: f64,
        trailing: Option<TrailingStopConfig>,
        quote_client: Q,
        chain: C,
        oracle: P,
        store: S,
        notifier: N,
        breaker: Arc<Mutex<CircuitBreaker<N>>>,
        ledger: Arc<Mutex<PortfolioLedger>>,
    ) -> Self {
        Self {
            config,
            wallet,
            min_price_confidence,
            positions: Vec::new(),
            trailing_enabled: trailing.is_some(),
            trailing: TrailingStopTracker::new(trailing.unwrap_or_default()),
            buying: HashSet::new(),
            running: true,
            consecutive_errors: 0,
            buy_count: 0,
            sell_count: 0,
            total_profit_wei: U256::ZERO,
            realized_pnl_eth: 0.0,
            last_price: 0.0,
            quote_client,
            chain,
            oracle,
            store,
            notifier,
            breaker,
            ledger,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn positions(&self) -> &[GridPosition] {
        &self.positions
    }

    /// Restore from a persisted snapshot.
    pub fn restore(&mut self, snapshot: StrategySnapshot) {
        info!(
            "📂 [{}] restored {} positions (buys={}, sells={}, running={})",
            snapshot.name,
            snapshot.positions.len(),
            snapshot.buy_count,
            snapshot.sell_count,
            snapshot.running
        );
        self.positions = snapshot.positions;
        self.buy_count = snapshot.buy_count;
        self.sell_count = snapshot.sell_count;
        self.total_profit_wei = snapshot.total_profit_wei;
        self.realized_pnl_eth = snapshot.realized_pnl_eth;
        self.last_price = snapshot.last_price;
        self.running = snapshot.running;
        self.trailing.restore(snapshot.trailing);
    }

    pub fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            name: self.config.name.clone(),
            positions: self.positions.clone(),
            buy_count: self.buy_count,
            sell_count: self.sell_count,
            total_profit_wei: self.total_profit_wei,
            realized_pnl_eth: self.realized_pnl_eth,
            last_price: self.last_price,
            running: self.running,
            trailing: self.trailing.snapshot(),
        }
    }

    /// Run one heartbeat.
    pub async fn tick(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::new(&self.config.name, self.last_price);
        if !self.running {
            summary.stopped = true;
            return summary;
        }

        let price = self.refresh_price().await;
        summary.price = price;
        self.last_price = price;

        if self.positions.is_empty() && !self.build_grid(price) {
            summary.stopped = true;
            return summary;
        }

        // The balance only sizes buys and values the portfolio for the
        // breaker; a failed query skips those, exits still run below.
        match self.chain.eth_balance(self.wallet).await {
            Ok(eth_balance) => {
                let buys_blocked = self.update_breaker(price, eth_balance).await;

                if self.config.buys_enabled
                    && !buys_blocked
                    && grid::count_active_positions(&self.positions)
                        < self.config.max_active_positions
                {
                    if let Some(idx) = grid::find_buy_position(&self.positions, price, None) {
                        match self.try_buy(idx, eth_balance).await {
                            Ok(true) => summary.buys_executed += 1,
                            Ok(false) => {}
                            Err(e) => {
                                self.record_error(&format!("buy failed: {:#}", e));
                                summary.errors += 1;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    "[{}] balance query failed, skipping buys this cycle: {:#}",
                    self.config.name, e
                );
            }
        }

        if self.config.sells_enabled {
            let mut candidates = grid::find_sell_positions(&self.positions, price);
            if self.trailing_enabled {
                for (idx, pos) in self.positions.iter().enumerate() {
                    if pos.status != PositionStatus::Holding {
                        continue;
                    }
                    // Worst-case entry is the slot's upper bound.
                    let update = self.trailing.update(pos.id, pos.buy_max, price);
                    if update.triggered && !candidates.contains(&idx) {
                        candidates.push(idx);
                    }
                }
            }

            for idx in candidates {
                match self.execute_sell(idx, price).await {
                    Ok(SellOutcome::Sold) => summary.sells_executed += 1,
                    Ok(SellOutcome::GateFailed) => summary.sell_candidates_skipped += 1,
                    Ok(SellOutcome::Skipped) => {}
                    Err(e) => {
                        self.record_error(&format!("sell failed: {:#}", e));
                        summary.errors += 1;
                    }
                }
            }
        }

        self.persist().await;
        summary.stopped = !self.running;
        summary
    }

    /// Sell every holding position regardless of grid triggers. The
    /// profitability gate still applies; gated positions count as
    /// failed and remain holding.
    pub async fn liquidate_all(&mut self) -> LiquidationOutcome {
        let holding: Vec<usize> = self
            .positions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.status == PositionStatus::Holding)
            .map(|(idx, _)| idx)
            .collect();

        info!(
            "🧹 [{}] liquidating {} holding positions",
            self.config.name,
            holding.len()
        );

        let pnl_before = self.realized_pnl_eth;
        let mut sold = 0;
        let mut failed = 0;
        for idx in &holding {
            match self.execute_sell(*idx, self.last_price).await {
                Ok(SellOutcome::Sold) => sold += 1,
                Ok(_) => failed += 1,
                Err(e) => {
                    error!("[{}] liquidation sell failed: {:#}", self.config.name, e);
                    failed += 1;
                }
            }
        }

        let outcome = LiquidationOutcome {
            attempted: holding.len(),
            sold,
            failed,
            realized_eth: self.realized_pnl_eth - pnl_before,
        };
        self.notifier.notify(NotifyEvent::LiquidationReport {
            strategy: self.config.name.clone(),
            attempted: outcome.attempted,
            sold: outcome.sold,
            failed: outcome.failed,
            total_profit_eth: outcome.realized_eth,
        });
        self.persist().await;
        outcome
    }

    /// Oracle first, reference quote second, last observed price third,
    /// sentinel minimum last. Always yields a usable price.
    async fn refresh_price(&self) -> f64 {
        if let Some(point) = self.oracle.price(self.config.token_address).await {
            if point.confidence >= self.min_price_confidence {
                return point.price;
            }
            warn!(
                "[{}] oracle confidence {:.2} below {:.2}, falling back",
                self.config.name, point.confidence, self.min_price_confidence
            );
        }

        if let Some(quote) = self
            .quote_client
            .buy_quote(
                self.config.token_address,
                eth_to_wei(PRICE_PROBE_ETH),
                self.wallet,
            )
            .await
        {
            if quote.price > 0.0 {
                return quote.price;
            }
        }

        if self.last_price > 0.0 {
            warn!(
                "[{}] no fresh price, reusing last observed {:.10}",
                self.config.name, self.last_price
            );
            return self.last_price;
        }

        warn!("[{}] every price source failed, using sentinel", self.config.name);
        SENTINEL_MIN_PRICE
    }

    /// Returns false and stops the strategy on an invalid grid shape.
    fn build_grid(&mut self, price: f64) -> bool {
        match grid::generate_grid(price, &self.config) {
            Ok(positions) => {
                info!(
                    "📊 [{}] grid generated: {} positions over [{:.10}, {:.10}]",
                    self.config.name,
                    positions.len(),
                    positions.first().map(|p| p.buy_min).unwrap_or(0.0),
                    positions.last().map(|p| p.buy_max).unwrap_or(0.0)
                );
                self.positions = positions;
                self.trailing.clear();
                true
            }
            Err(e) => {
                let reason = format!("invalid grid configuration: {:#}", e);
                error!("🛑 [{}] {}", self.config.name, reason);
                self.running = false;
                self.notifier.notify(NotifyEvent::StrategyStopped {
                    strategy: self.config.name.clone(),
                    reason,
                });
                false
            }
        }
    }

    /// Record this strategy's book and ask the breaker whether new buys
    /// are blocked portfolio-wide.
    async fn update_breaker(&self, price: f64, eth_balance: U256) -> bool {
        let holdings_eth: f64 = self
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Holding)
            .map(|p| p.tokens_received.map(wei_to_eth).unwrap_or(0.0) * price)
            .sum();
        let value = wei_to_eth(eth_balance) + holdings_eth;

        let (total_value, total_pnl) = {
            let mut ledger = self.ledger.lock().await;
            ledger.record(&self.config.name, value, self.realized_pnl_eth);
            ledger.totals()
        };
        self.breaker.lock().await.check(total_value, total_pnl)
    }

    /// Buy with a per-position re-entrancy guard: a position id with a
    /// buy already in flight is left alone.
    async fn try_buy(&mut self, idx: usize, eth_balance: U256) -> Result<bool> {
        let id = self.positions[idx].id;
        if !self.buying.insert(id) {
            debug!("[{}] buy already in flight for position {}", self.config.name, id);
            return Ok(false);
        }
        let result = self.execute_buy(idx, eth_balance).await;
        self.buying.remove(&id);
        result
    }

    async fn execute_buy(&mut self, idx: usize, eth_balance: U256) -> Result<bool> {
        // Status may have changed since the candidate was picked.
        if self.positions[idx].status != PositionStatus::Empty {
            return Ok(false);
        }
        let id = self.positions[idx].id;

        let amount_wei = self.buy_size(eth_balance);
        if amount_wei.is_zero() || amount_wei < eth_to_wei(self.config.min_buy_eth) {
            debug!(
                "[{}] buy size {:.6} ETH below minimum, skipping",
                self.config.name,
                wei_to_eth(amount_wei)
            );
            return Ok(false);
        }

        let quote = match self
            .quote_client
            .buy_quote(self.config.token_address, amount_wei, self.wallet)
            .await
        {
            Some(q) => q,
            None => {
                debug!("[{}] no buy quote for position {}", self.config.name, id);
                return Ok(false);
            }
        };

        let outcome = self
            .chain
            .execute_swap(&quote)
            .await
            .context("buy swap failed")?;
        if !outcome.success {
            bail!("buy transaction reverted: {}", outcome.tx_hash);
        }

        self.positions[idx].mark_bought(
            outcome.tx_hash.clone(),
            quote.amount_out_wei,
            amount_wei,
            now_ts(),
        );
        self.buy_count += 1;
        self.consecutive_errors = 0;

        info!(
            "🟢 [{}] BUY position {} for {:.6} ETH ({} tokens) tx={}",
            self.config.name,
            id,
            wei_to_eth(amount_wei),
            quote.amount_out_wei,
            outcome.tx_hash
        );
        self.notifier.notify(NotifyEvent::TradeExecuted {
            strategy: self.config.name.clone(),
            side: TradeSide::Buy,
            position_id: id,
            token: self.config.token_address,
            tx_hash: outcome.tx_hash,
            amount_eth: wei_to_eth(amount_wei),
        });
        Ok(true)
    }

    /// Fixed size, or balance minus the gas reserve spread over the
    /// empty slots net of currently-active ones.
    fn buy_size(&self, eth_balance: U256) -> U256 {
        if let Some(fixed) = self.config.buy_amount_eth {
            return eth_to_wei(fixed);
        }
        let spendable = eth_balance.saturating_sub(eth_to_wei(self.config.gas_reserve_eth));
        let empty = self
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Empty)
            .count();
        let active = grid::count_active_positions(&self.positions);
        spendable / U256::from(empty.saturating_sub(active).max(1))
    }

    async fn execute_sell(&mut self, idx: usize, price: f64) -> Result<SellOutcome> {
        let (id, tokens, entry) = {
            let pos = &self.positions[idx];
            if pos.status != PositionStatus::Holding {
                return Ok(SellOutcome::Skipped);
            }
            match (pos.tokens_received, pos.entry_cost_wei) {
                (Some(t), Some(e)) => (pos.id, t, e),
                _ => {
                    warn!(
                        "[{}] position {} holding without execution record",
                        self.config.name, pos.id
                    );
                    return Ok(SellOutcome::Skipped);
                }
            }
        };

        // Moon bag: retain a fraction of the tokens on every sell.
        let keep_bps = (self.config.moon_bag_pct * 100.0) as u64;
        let sell_tokens =
            tokens * U256::from(10_000u64.saturating_sub(keep_bps)) / U256::from(10_000u64);
        if sell_tokens.is_zero() {
            return Ok(SellOutcome::Skipped);
        }

        let quote = match self
            .quote_client
            .sell_quote(self.config.token_address, sell_tokens, self.wallet)
            .await
        {
            Some(q) => q,
            None => {
                debug!("[{}] no sell quote for position {}", self.config.name, id);
                return Ok(SellOutcome::Skipped);
            }
        };

        let proceeds = quote.amount_out_wei;
        let est_gas = quote.gas_cost_wei();
        if !self.sell_gate_passes(entry, est_gas, proceeds) {
            debug!(
                "💤 [{}] position {} gated: proceeds={} entry={} gas={}",
                self.config.name, id, proceeds, entry, est_gas
            );
            return Ok(SellOutcome::GateFailed);
        }

        self.chain
            .ensure_allowance(self.config.token_address, quote.allowance_target, sell_tokens)
            .await
            .context("approval failed")?;
        let outcome = self
            .chain
            .execute_swap(&quote)
            .await
            .context("sell swap failed")?;
        if !outcome.success {
            bail!("sell transaction reverted: {}", outcome.tx_hash);
        }

        let profit_wei = proceeds
            .saturating_sub(outcome.gas_cost_wei)
            .saturating_sub(entry);
        let pnl_eth = wei_to_eth(proceeds) - wei_to_eth(outcome.gas_cost_wei) - wei_to_eth(entry);
        let profit_pct = if entry > U256::ZERO {
            pnl_eth / wei_to_eth(entry) * 100.0
        } else {
            0.0
        };

        let moon_bag = tokens - sell_tokens;
        self.positions[idx].mark_sold(
            outcome.tx_hash.clone(),
            proceeds,
            profit_wei,
            profit_pct,
            now_ts(),
        );
        self.total_profit_wei += profit_wei;
        self.realized_pnl_eth += pnl_eth;
        self.sell_count += 1;
        self.consecutive_errors = 0;
        self.trailing.remove_position(id);

        info!(
            "🔴 [{}] SELL position {} at {:.10} for {:.6} ETH (pnl {:+.6} ETH, {:.2}%) tx={}",
            self.config.name,
            id,
            price,
            wei_to_eth(proceeds),
            pnl_eth,
            profit_pct,
            outcome.tx_hash
        );
        if moon_bag > U256::ZERO {
            info!("🌙 [{}] keeping {} tokens from position {}", self.config.name, moon_bag, id);
        }

        self.notifier.notify(NotifyEvent::TradeExecuted {
            strategy: self.config.name.clone(),
            side: TradeSide::Sell,
            position_id: id,
            token: self.config.token_address,
            tx_hash: outcome.tx_hash,
            amount_eth: wei_to_eth(proceeds),
        });
        self.notifier.notify(NotifyEvent::ProfitRealized {
            strategy: self.config.name.clone(),
            position_id: id,
            profit_eth: pnl_eth,
            profit_pct,
        });
        Ok(SellOutcome::Sold)
    }

    /// Strict mode: proceeds must cover cost plus gas with a 2% margin,
    /// integer math, no exceptions. Legacy mode: net profit must reach
    /// `min_profit_pct` of the entry cost.
    fn sell_gate_passes(&self, entry: U256, gas: U256, proceeds: U256) -> bool {
        if self.config.strict_profit_gate {
            proceeds >= (entry + gas) * U256::from(102u64) / U256::from(100u64)
        } else {
            let net = proceeds.saturating_sub(gas).saturating_sub(entry);
            let required_bps = (self.config.min_profit_pct * 100.0) as u64;
            net >= entry * U256::from(required_bps) / U256::from(10_000u64)
        }
    }

    fn record_error(&mut self, context: &str) {
        self.consecutive_errors += 1;
        warn!(
            "⚠️ [{}] error {}/{}: {}",
            self.config.name, self.consecutive_errors, self.config.max_consecutive_errors, context
        );
        if self.consecutive_errors >= self.config.max_consecutive_errors {
            let reason = format!(
                "{} consecutive errors, last: {}",
                self.consecutive_errors, context
            );
            error!("🛑 [{}] stopping: {}", self.config.name, reason);
            self.running = false;
            self.notifier.notify(NotifyEvent::StrategyStopped {
                strategy: self.config.name.clone(),
                reason,
            });
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save_strategy(&self.snapshot()) {
            warn!("[{}] failed to persist strategy state: {:#}", self.config.name, e);
        }
        let breaker = self.breaker.lock().await;
        if let Err(e) = self.store.save_breaker(breaker.state()) {
            warn!("[{}] failed to persist breaker state: {:#}", self.config.name, e);
        }
    }
}

fn now_ts() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
