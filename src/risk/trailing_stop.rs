// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-position trailing stop-loss.
//!
//! The stop price ratchets: it only ever moves up as price makes new
//! highs, never down. One state per open position id; states are
//! removed when the position is sold.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// A dynamic trail step: once profit reaches `profit_pct`, trail by
/// `trail_pct` instead of the base percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailStep {
    pub profit_pct: f64,
    pub trail_pct: f64,
}

/// Trailing stop-loss configuration.
#[derive(Debug, Clone)]
pub struct TrailingStopConfig {
    /// Profit percentage at which the trail activates.
    pub activation_pct: f64,
    /// Base percentage drop from the highest price that sets the stop.
    pub trail_pct: f64,
    /// Optional dynamic steps; the highest satisfied step wins.
    pub steps: Vec<TrailStep>,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            activation_pct: 3.0,
            trail_pct: 5.0,
            steps: Vec::new(),
        }
    }
}

/// Trailing state for one open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStopState {
    pub highest_price: f64,
    /// Monotonically non-decreasing for the life of the position.
    pub current_stop_price: f64,
    pub activated: bool,
    pub activated_at: Option<u64>,
}

/// Result of a single trailing-stop update.
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopUpdate {
    pub activated: bool,
    pub triggered: bool,
    pub stop_price: f64,
}

/// Tracks trailing stop state per position id.
#[derive(Debug, Default)]
pub struct TrailingStopTracker {
    config: TrailingStopConfig,
    states: HashMap<usize, TrailingStopState>,
}

impl TrailingStopTracker {
    pub fn new(config: TrailingStopConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Observe a new price for a holding position.
    ///
    /// Creates the state on first observation. Activation is
    /// irreversible; the stop price only moves up.
    pub fn update(&mut self, position_id: usize, entry_price: f64, current_price: f64) -> TrailingStopUpdate {
        let state = self.states.entry(position_id).or_insert(TrailingStopState {
            highest_price: current_price,
            current_stop_price: 0.0,
            activated: false,
            activated_at: None,
        });

        let profit_pct = if entry_price > 0.0 {
            (current_price - entry_price) / entry_price * 100.0
        } else {
            0.0
        };

        if !state.activated && profit_pct >= self.config.activation_pct {
            state.activated = true;
            state.activated_at = Some(chrono::Utc::now().timestamp() as u64);
            info!(
                "📈 Trailing stop activated for position {} at {:.2}% profit",
                position_id, profit_pct
            );
        }

        if current_price > state.highest_price {
            state.highest_price = current_price;
        }

        if state.activated {
            let trail_pct = Self::effective_trail_pct(&self.config, profit_pct);
            let candidate_stop = state.highest_price * (1.0 - trail_pct / 100.0);
            if candidate_stop > state.current_stop_price {
                debug!(
                    "Position {} stop ratchets {} -> {}",
                    position_id, state.current_stop_price, candidate_stop
                );
                state.current_stop_price = candidate_stop;
            }
        }

        let triggered = state.activated && current_price <= state.current_stop_price;
        if triggered {
            info!(
                "📉 Trailing stop triggered for position {} at {} (stop {})",
                position_id, current_price, state.current_stop_price
            );
        }

        TrailingStopUpdate {
            activated: state.activated,
            triggered,
            stop_price: state.current_stop_price,
        }
    }

    /// Trail percentage for the current profit level: the highest
    /// satisfied dynamic step, or the fixed base value.
    fn effective_trail_pct(config: &TrailingStopConfig, profit_pct: f64) -> f64 {
        config
            .steps
            .iter()
            .filter(|s| profit_pct >= s.profit_pct)
            .max_by(|a, b| a.profit_pct.total_cmp(&b.profit_pct))
            .map(|s| s.trail_pct)
            .unwrap_or(config.trail_pct)
    }

    pub fn get(&self, position_id: usize) -> Option<&TrailingStopState> {
        self.states.get(&position_id)
    }

    /// Drop the state for a position that was sold.
    pub fn remove_position(&mut self, position_id: usize) {
        self.states.remove(&position_id);
    }

    /// Drop all states (strategy reset / grid regeneration).
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Plain id -> state map for persistence.
    pub fn snapshot(&self) -> HashMap<usize, TrailingStopState> {
        self.states.clone()
    }

    /// Restore from a persisted id -> state map.
    pub fn restore(&mut self, states: HashMap<usize, TrailingStopState>) {
        self.states = states;
    }
}
