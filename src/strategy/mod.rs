// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Grid strategy decision loop and scheduling.

pub mod engine;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{CycleSummary, LiquidationOutcome, StrategyEngine};
pub use scheduler::CycleScheduler;

use std::collections::HashMap;

/// Per-strategy book entries aggregated for the circuit breaker.
///
/// Every strategy records its own portfolio value and signed realized
/// PnL (both in ETH) each cycle; the breaker sees the totals.
#[derive(Debug, Default)]
pub struct PortfolioLedger {
    entries: HashMap<String, (f64, f64)>,
}

impl PortfolioLedger {
    pub fn record(&mut self, strategy: &str, value_eth: f64, realized_pnl_eth: f64) {
        self.entries
            .insert(strategy.to_string(), (value_eth, realized_pnl_eth));
    }

    /// `(total_value_eth, total_realized_pnl_eth)` across strategies.
    pub fn totals(&self) -> (f64, f64) {
        self.entries
            .values()
            .fold((0.0, 0.0), |(v, p), (value, pnl)| (v + value, p + pnl))
    }
}
