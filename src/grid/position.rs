// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Grid position data model and lifecycle state machine.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Lifecycle of a grid position.
///
/// `Empty -> Holding -> Sold`, no other transitions. `Sold` is terminal
/// for a given id; only a full grid regeneration may reuse an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Empty,
    Holding,
    Sold,
}

/// A single grid position: a contiguous buy-trigger price range with an
/// associated profit target and optional stop-loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridPosition {
    /// Stable index within the grid, assigned at generation, never reused.
    pub id: usize,
    /// Lower bound of the buy-trigger range.
    pub buy_min: f64,
    /// Upper bound of the buy-trigger range. Adjacent positions share
    /// boundaries: `positions[i].buy_max == positions[i+1].buy_min`.
    pub buy_max: f64,
    /// Take-profit target, derived from `buy_max` (worst-case entry).
    pub sell_price: f64,
    /// Stop-loss price derived from `buy_min`, 0.0 when disabled.
    pub stop_loss_price: f64,
    pub status: PositionStatus,

    // Buy-side execution fields, set on Empty -> Holding.
    pub buy_tx_hash: Option<String>,
    pub buy_time: Option<u64>,
    pub tokens_received: Option<U256>,
    pub entry_cost_wei: Option<U256>,

    // Sell-side execution fields, set on Holding -> Sold.
    pub sell_tx_hash: Option<String>,
    pub sell_time: Option<u64>,
    pub eth_received_wei: Option<U256>,
    pub realized_profit_wei: Option<U256>,
    pub realized_profit_pct: Option<f64>,
}

impl GridPosition {
    /// Create a fresh empty position covering `[buy_min, buy_max]`.
    pub fn new(id: usize, buy_min: f64, buy_max: f64, sell_price: f64, stop_loss_price: f64) -> Self {
        Self {
            id,
            buy_min,
            buy_max,
            sell_price,
            stop_loss_price,
            status: PositionStatus::Empty,
            buy_tx_hash: None,
            buy_time: None,
            tokens_received: None,
            entry_cost_wei: None,
            sell_tx_hash: None,
            sell_time: None,
            eth_received_wei: None,
            realized_profit_wei: None,
            realized_profit_pct: None,
        }
    }

    /// Width of the buy-trigger range.
    pub fn width(&self) -> f64 {
        self.buy_max - self.buy_min
    }

    /// Transition `Empty -> Holding`, recording buy execution details.
    pub fn mark_bought(&mut self, tx_hash: String, tokens: U256, cost_wei: U256, time: u64) {
        self.status = PositionStatus::Holding;
        self.buy_tx_hash = Some(tx_hash);
        self.buy_time = Some(time);
        self.tokens_received = Some(tokens);
        self.entry_cost_wei = Some(cost_wei);
    }

    /// Transition `Holding -> Sold`, recording sell execution details.
    pub fn mark_sold(
        &mut self,
        tx_hash: String,
        eth_received: U256,
        profit_wei: U256,
        profit_pct: f64,
        time: u64,
    ) {
        self.status = PositionStatus::Sold;
        self.sell_tx_hash = Some(tx_hash);
        self.sell_time = Some(time);
        self.eth_received_wei = Some(eth_received);
        self.realized_profit_wei = Some(profit_wei);
        self.realized_profit_pct = Some(profit_pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_position_is_empty() {
        let pos = GridPosition::new(3, 0.0001, 0.0002, 0.000216, 0.0);
        assert_eq!(pos.status, PositionStatus::Empty);
        assert_eq!(pos.id, 3);
        assert!(pos.tokens_received.is_none());
        assert!(pos.entry_cost_wei.is_none());
    }

    #[test]
    fn test_buy_then_sell_transitions() {
        let mut pos = GridPosition::new(0, 1.0, 2.0, 2.2, 0.9);

        pos.mark_bought("0xabc".to_string(), U256::from(1000u64), U256::from(5u64), 42);
        assert_eq!(pos.status, PositionStatus::Holding);
        assert_eq!(pos.tokens_received, Some(U256::from(1000u64)));
        assert_eq!(pos.buy_time, Some(42));

        pos.mark_sold("0xdef".to_string(), U256::from(7u64), U256::from(2u64), 40.0, 43);
        assert_eq!(pos.status, PositionStatus::Sold);
        assert_eq!(pos.eth_received_wei, Some(U256::from(7u64)));
        assert_eq!(pos.realized_profit_pct, Some(40.0));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut pos = GridPosition::new(1, 0.5, 1.0, 1.08, 0.45);
        pos.mark_bought("0x1".to_string(), U256::from(5u64), U256::from(9u64), 1);

        let json = serde_json::to_string(&pos).unwrap();
        let back: GridPosition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, PositionStatus::Holding);
        assert_eq!(back.entry_cost_wei, Some(U256::from(9u64)));
    }
}
