// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! JSON-file persistence for strategy and circuit-breaker state.
//!
//! Best-effort from the decision loop's perspective: a failed save is
//! logged and retried on the next cycle, never surfaced as a trade
//! failure.

use crate::grid::GridPosition;
use crate::risk::{CircuitBreakerState, TrailingStopState};
use alloy::primitives::U256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STRATEGIES_FILE: &str = "strategies.json";
const BREAKER_FILE: &str = "circuit_breaker.json";

/// Everything a strategy needs to resume after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub name: String,
    pub positions: Vec<GridPosition>,
    pub buy_count: u64,
    pub sell_count: u64,
    pub total_profit_wei: U256,
    /// Signed realized PnL in ETH; unlike `total_profit_wei` this goes
    /// negative on losing sells and feeds the circuit breaker.
    #[serde(default)]
    pub realized_pnl_eth: f64,
    pub last_price: f64,
    pub running: bool,
    #[serde(default)]
    pub trailing: HashMap<usize, TrailingStopState>,
}

/// Persistence boundary consumed by the decision loop.
pub trait StateStore {
    fn save_strategy(&self, snapshot: &StrategySnapshot) -> Result<()>;
    fn load_strategies(&self) -> Result<Vec<StrategySnapshot>>;
    fn save_breaker(&self, state: &CircuitBreakerState) -> Result<()>;
    fn load_breaker(&self) -> Result<Option<CircuitBreakerState>>;
}

/// Pretty-JSON files under a state directory.
#[derive(Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn strategies_path(&self) -> PathBuf {
        self.dir.join(STRATEGIES_FILE)
    }

    fn breaker_path(&self) -> PathBuf {
        self.dir.join(BREAKER_FILE)
    }

    fn read_strategy_map(&self) -> HashMap<String, StrategySnapshot> {
        let path = self.strategies_path();
        if !path.exists() {
            return HashMap::new();
        }
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Failed to parse {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }

    fn write_json(path: &Path, json: String) -> Result<()> {
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl StateStore for JsonFileStore {
    fn save_strategy(&self, snapshot: &StrategySnapshot) -> Result<()> {
        let mut map = self.read_strategy_map();
        map.insert(snapshot.name.clone(), snapshot.clone());
        let json = serde_json::to_string_pretty(&map).context("Failed to serialize strategies")?;
        Self::write_json(&self.strategies_path(), json)?;
        debug!("Saved strategy '{}' ({} positions)", snapshot.name, snapshot.positions.len());
        Ok(())
    }

    fn load_strategies(&self) -> Result<Vec<StrategySnapshot>> {
        let map = self.read_strategy_map();
        if map.is_empty() {
            info!("No persisted strategies found, starting fresh");
        } else {
            info!("Loaded {} persisted strategies", map.len());
        }
        Ok(map.into_values().collect())
    }

    fn save_breaker(&self, state: &CircuitBreakerState) -> Result<()> {
        let json =
            serde_json::to_string_pretty(state).context("Failed to serialize breaker state")?;
        Self::write_json(&self.breaker_path(), json)
    }

    fn load_breaker(&self) -> Result<Option<CircuitBreakerState>> {
        let path = self.breaker_path();
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::grid;

    fn snapshot(name: &str) -> StrategySnapshot {
        let config = StrategyConfig {
            num_positions: 3,
            floor_price: Some(1.0),
            ceiling_price: Some(2.0),
            ..StrategyConfig::default()
        };
        StrategySnapshot {
            name: name.to_string(),
            positions: grid::generate_grid(1.5, &config).unwrap(),
            buy_count: 2,
            sell_count: 1,
            total_profit_wei: U256::from(42u64),
            realized_pnl_eth: 0.000042,
            last_price: 1.5,
            running: true,
            trailing: HashMap::new(),
        }
    }

    #[test]
    fn test_save_and_load_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.save_strategy(&snapshot("alpha")).unwrap();
        store.save_strategy(&snapshot("beta")).unwrap();

        let mut loaded = store.load_strategies().unwrap();
        loaded.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "alpha");
        assert_eq!(loaded[0].positions.len(), 3);
        assert_eq!(loaded[0].total_profit_wei, U256::from(42u64));
    }

    #[test]
    fn test_resave_overwrites_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.save_strategy(&snapshot("alpha")).unwrap();
        let mut updated = snapshot("alpha");
        updated.buy_count = 9;
        store.save_strategy(&updated).unwrap();

        let loaded = store.load_strategies().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].buy_count, 9);
    }

    #[test]
    fn test_breaker_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.load_breaker().unwrap().is_none());

        let state = CircuitBreakerState {
            triggered: true,
            reason: Some("Daily loss limit reached: test".to_string()),
            daily_start_value: 1.5,
            ..CircuitBreakerState::default()
        };
        store.save_breaker(&state).unwrap();

        let loaded = store.load_breaker().unwrap().unwrap();
        assert!(loaded.triggered);
        assert_eq!(loaded.reason.as_deref(), Some("Daily loss limit reached: test"));
        assert!((loaded.daily_start_value - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_corrupt_strategies_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STRATEGIES_FILE), "not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_strategies().unwrap().is_empty());
    }
}
