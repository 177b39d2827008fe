// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Round-robin heartbeat scheduler.
//!
//! Each call to `advance` visits exactly one strategy and moves the
//! cursor, so one slow strategy delays but never starves the others. A
//! strategy with `skip_heartbeats = N` only runs on every N-th visit.

use crate::exec::{ChainClient, PriceSource, QuoteClient};
use crate::notifier::Notifier;
use crate::storage::StateStore;
use crate::strategy::engine::{CycleSummary, StrategyEngine};
use tracing::debug;

pub struct CycleScheduler<Q, C, P, S, N>
where
    Q: QuoteClient,
    C: ChainClient,
    P: PriceSource,
    S: StateStore,
    N: Notifier,
{
    strategies: Vec<StrategyEngine<Q, C, P, S, N>>,
    cursor: usize,
    /// Visit counter per strategy, drives the skip factor.
    beats: Vec<u64>,
}

impl<Q, C, P, S, N> CycleScheduler<Q, C, P, S, N>
where
    Q: QuoteClient,
    C: ChainClient,
    P: PriceSource,
    S: StateStore,
    N: Notifier,
{
    pub fn new(strategies: Vec<StrategyEngine<Q, C, P, S, N>>) -> Self {
        let beats = vec![0; strategies.len()];
        Self {
            strategies,
            cursor: 0,
            beats,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn engines(&self) -> &[StrategyEngine<Q, C, P, S, N>] {
        &self.strategies
    }

    pub fn all_stopped(&self) -> bool {
        self.strategies.iter().all(|s| !s.is_running())
    }

    /// Visit the next strategy in turn. Returns `None` when the visit
    /// was skipped (stopped strategy or skip factor) or the scheduler
    /// is empty.
    pub async fn advance(&mut self) -> Option<CycleSummary> {
        if self.strategies.is_empty() {
            return None;
        }

        let idx = self.cursor;
        self.cursor = (self.cursor + 1) % self.strategies.len();
        let beat = self.beats[idx];
        self.beats[idx] += 1;

        let engine = &mut self.strategies[idx];
        if !engine.is_running() {
            return None;
        }
        let skip = u64::from(engine.config().skip_heartbeats.max(1));
        if beat % skip != 0 {
            debug!("[{}] skipping heartbeat {} (factor {})", engine.name(), beat, skip);
            return None;
        }

        Some(engine.tick().await)
    }
}
