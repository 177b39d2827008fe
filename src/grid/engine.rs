// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pure grid functions: range partitioning and buy/sell classification.
//!
//! Everything here is stateless; the owning strategy passes its
//! position array and config in and mutates nothing through this
//! module.

use crate::config::StrategyConfig;
use crate::grid::position::{GridPosition, PositionStatus};
use alloy::primitives::U256;
use anyhow::{bail, Result};

/// Fraction of a position's width used as boundary comparison tolerance.
const BOUNDARY_TOLERANCE_FRACTION: f64 = 0.001;

/// Partition `[floor, ceiling]` into `num_positions` equal-width
/// contiguous buy ranges.
///
/// Floor and ceiling come from the config, or default to
/// `[current_price / 10, current_price * 4]`. The final position's
/// upper bound is clamped exactly to the ceiling so float drift cannot
/// leave a gap at the top. `sell_price` is derived from `buy_max`, the
/// worst-case entry within the range, so a filled position reaching its
/// target is profitable no matter where in the range it was bought.
pub fn generate_grid(current_price: f64, config: &StrategyConfig) -> Result<Vec<GridPosition>> {
    if config.num_positions == 0 {
        bail!("grid requires at least one position");
    }

    let floor = config.floor_price.unwrap_or(current_price / 10.0);
    let ceiling = config.ceiling_price.unwrap_or(current_price * 4.0);

    if floor <= 0.0 {
        bail!("grid floor must be positive, got {}", floor);
    }
    if ceiling <= floor {
        bail!("grid ceiling {} must exceed floor {}", ceiling, floor);
    }

    let n = config.num_positions;
    let total_range = ceiling - floor;
    let stop_loss_pct = if config.stop_loss_enabled {
        config.stop_loss_pct.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let mut positions = Vec::with_capacity(n);
    for i in 0..n {
        let buy_min = floor + total_range * i as f64 / n as f64;
        let buy_max = if i == n - 1 {
            ceiling
        } else {
            floor + total_range * (i + 1) as f64 / n as f64
        };
        let sell_price = buy_max * (1.0 + config.take_profit_pct / 100.0);
        let stop_loss_price = if config.stop_loss_enabled {
            buy_min * (1.0 - stop_loss_pct / 100.0)
        } else {
            0.0
        };
        positions.push(GridPosition::new(i, buy_min, buy_max, sell_price, stop_loss_price));
    }

    Ok(positions)
}

/// Find the first `Empty` position whose range contains `current_price`.
///
/// Iteration order is array order, which is creation order (ascending
/// price), so the lowest matching range always wins. `tolerance`
/// widens the boundary comparison; it defaults to 0.1% of each
/// position's width to absorb float noise at shared boundaries.
pub fn find_buy_position(
    positions: &[GridPosition],
    current_price: f64,
    tolerance: Option<f64>,
) -> Option<usize> {
    for (idx, pos) in positions.iter().enumerate() {
        if pos.status != PositionStatus::Empty {
            continue;
        }
        let tol = tolerance.unwrap_or(pos.width() * BOUNDARY_TOLERANCE_FRACTION);
        if current_price >= pos.buy_min - tol && current_price <= pos.buy_max + tol {
            return Some(idx);
        }
    }
    None
}

/// Find every `Holding` position that should be sold at `current_price`.
///
/// A position matches when price has reached its take-profit target, or
/// when a stop-loss is configured and price has fallen to it.
/// Take-profit is checked first and short-circuits the stop-loss check.
pub fn find_sell_positions(positions: &[GridPosition], current_price: f64) -> Vec<usize> {
    positions
        .iter()
        .enumerate()
        .filter(|(_, pos)| {
            pos.status == PositionStatus::Holding
                && (current_price >= pos.sell_price
                    || (pos.stop_loss_price > 0.0 && current_price <= pos.stop_loss_price))
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Number of positions currently holding tokens.
pub fn count_active_positions(positions: &[GridPosition]) -> usize {
    positions
        .iter()
        .filter(|p| p.status == PositionStatus::Holding)
        .count()
}

/// Aggregate statistics over a grid, used for summary logs.
#[derive(Debug, Clone, Default)]
pub struct GridStats {
    pub total: usize,
    pub empty: usize,
    pub holding: usize,
    pub sold: usize,
    pub total_invested_wei: U256,
    pub total_received_wei: U256,
    pub total_profit_wei: U256,
}

pub fn calculate_grid_stats(positions: &[GridPosition]) -> GridStats {
    let mut stats = GridStats {
        total: positions.len(),
        ..Default::default()
    };
    for pos in positions {
        match pos.status {
            PositionStatus::Empty => stats.empty += 1,
            PositionStatus::Holding => stats.holding += 1,
            PositionStatus::Sold => stats.sold += 1,
        }
        if let Some(cost) = pos.entry_cost_wei {
            stats.total_invested_wei += cost;
        }
        if let Some(received) = pos.eth_received_wei {
            stats.total_received_wei += received;
        }
        if let Some(profit) = pos.realized_profit_wei {
            stats.total_profit_wei += profit;
        }
    }
    stats
}

/// Diagnostic invariant check: sorted by `buy_min`, each adjacent pair
/// must share a boundary within 0.1% of the position width.
pub fn validate_continuous_coverage(positions: &[GridPosition]) -> bool {
    if positions.len() < 2 {
        return true;
    }
    let mut sorted: Vec<&GridPosition> = positions.iter().collect();
    sorted.sort_by(|a, b| a.buy_min.total_cmp(&b.buy_min));

    sorted.windows(2).all(|pair| {
        let tol = pair[0].width() * BOUNDARY_TOLERANCE_FRACTION;
        (pair[0].buy_max - pair[1].buy_min).abs() <= tol
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;

    fn grid_config(n: usize, floor: f64, ceiling: f64, tp: f64) -> StrategyConfig {
        StrategyConfig {
            num_positions: n,
            floor_price: Some(floor),
            ceiling_price: Some(ceiling),
            take_profit_pct: tp,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn test_generate_grid_example_values() {
        // 10 positions over [0.0001, 0.001] with 8% take profit.
        let config = grid_config(10, 0.0001, 0.001, 8.0);
        let grid = generate_grid(0.0005, &config).unwrap();

        assert_eq!(grid.len(), 10);
        assert!((grid[0].buy_min - 0.0001).abs() < 1e-12);
        assert!((grid[0].buy_max - 0.00019).abs() < 1e-9);
        assert!((grid[0].sell_price - 0.0002052).abs() < 1e-9);
        assert!((grid[9].buy_max - 0.001).abs() < 1e-15);
        assert!(grid.iter().all(|p| p.status == PositionStatus::Empty));
    }

    #[test]
    fn test_generate_grid_continuous_coverage() {
        for n in [1, 2, 7, 10, 50] {
            let config = grid_config(n, 0.0001, 0.001, 8.0);
            let grid = generate_grid(0.0005, &config).unwrap();
            assert!(validate_continuous_coverage(&grid), "n={}", n);
            assert!((grid[0].buy_min - 0.0001).abs() < 1e-12);
            assert!((grid[n - 1].buy_max - 0.001).abs() < 1e-15);
        }
    }

    #[test]
    fn test_generate_grid_auto_bounds() {
        let config = StrategyConfig {
            num_positions: 4,
            floor_price: None,
            ceiling_price: None,
            ..StrategyConfig::default()
        };
        let grid = generate_grid(0.002, &config).unwrap();
        assert!((grid[0].buy_min - 0.0002).abs() < 1e-12);
        assert!((grid[3].buy_max - 0.008).abs() < 1e-12);
    }

    #[test]
    fn test_generate_grid_rejects_zero_positions() {
        let config = grid_config(0, 0.0001, 0.001, 8.0);
        assert!(generate_grid(0.0005, &config).is_err());
    }

    #[test]
    fn test_generate_grid_rejects_bad_bounds() {
        assert!(generate_grid(0.0005, &grid_config(5, 0.0, 0.001, 8.0)).is_err());
        assert!(generate_grid(0.0005, &grid_config(5, 0.001, 0.0001, 8.0)).is_err());
    }

    #[test]
    fn test_stop_loss_clamped_and_derived_from_buy_min() {
        let mut config = grid_config(2, 1.0, 2.0, 8.0);
        config.stop_loss_enabled = true;
        config.stop_loss_pct = 250.0; // clamped to 100
        let grid = generate_grid(1.5, &config).unwrap();
        assert!((grid[0].stop_loss_price - 0.0).abs() < 1e-12);

        config.stop_loss_pct = 10.0;
        let grid = generate_grid(1.5, &config).unwrap();
        assert!((grid[0].stop_loss_price - 0.9).abs() < 1e-12);
        assert!((grid[1].stop_loss_price - 1.35).abs() < 1e-12);
    }

    #[test]
    fn test_find_buy_position_returns_owning_range() {
        let mut grid = generate_grid(0.0005, &grid_config(10, 0.0001, 0.001, 8.0)).unwrap();

        // Price strictly inside position 0's range.
        assert_eq!(find_buy_position(&grid, 0.00015, None), Some(0));

        // A non-empty position is skipped; the price no longer matches anything.
        grid[0].status = PositionStatus::Holding;
        assert_eq!(find_buy_position(&grid, 0.00015, None), None);

        // Price inside position 5's range.
        assert_eq!(find_buy_position(&grid, 0.0006, None), Some(5));
    }

    #[test]
    fn test_find_buy_position_spec_example() {
        let pos = GridPosition::new(0, 0.000001, 0.0000012, 0.0000013, 0.0);
        let grid = vec![pos];
        assert_eq!(find_buy_position(&grid, 0.0000011, None), Some(0));
    }

    #[test]
    fn test_find_buy_position_boundary_tolerance() {
        let grid = generate_grid(0.0005, &grid_config(10, 0.0001, 0.001, 8.0)).unwrap();
        let width = grid[0].width();

        // Just below buy_min but within 0.1% of width still matches.
        let eps = width * 0.0005;
        assert_eq!(find_buy_position(&grid, grid[0].buy_min - eps, None), Some(0));

        // Well outside any tolerance matches nothing.
        assert_eq!(find_buy_position(&grid, grid[0].buy_min - width, None), None);
    }

    #[test]
    fn test_find_sell_positions_take_profit_and_stop_loss() {
        let mut config = grid_config(4, 1.0, 2.0, 10.0);
        config.stop_loss_enabled = true;
        config.stop_loss_pct = 10.0;
        let mut grid = generate_grid(1.5, &config).unwrap();

        grid[0].status = PositionStatus::Holding; // sell at 1.25 * 1.1 = 1.375, stop at 0.9
        grid[2].status = PositionStatus::Holding; // sell at 1.75 * 1.1 = 1.925, stop at 1.35

        // Take-profit for position 0 only.
        assert_eq!(find_sell_positions(&grid, 1.5), vec![0]);
        // Both hit take-profit.
        assert_eq!(find_sell_positions(&grid, 2.0), vec![0, 2]);
        // Stop-loss for position 2, position 0 still above its stop.
        assert_eq!(find_sell_positions(&grid, 1.3), vec![2]);
        // Stop-loss for both.
        assert_eq!(find_sell_positions(&grid, 0.8), vec![0, 2]);
    }

    #[test]
    fn test_find_sell_positions_never_returns_empty_or_sold() {
        let mut grid = generate_grid(1.5, &grid_config(3, 1.0, 2.0, 5.0)).unwrap();
        grid[1].status = PositionStatus::Sold;
        // Price above every sell target, still only non-existent Holding matches.
        assert!(find_sell_positions(&grid, 10.0).is_empty());
    }

    #[test]
    fn test_count_active_and_stats() {
        let mut grid = generate_grid(1.5, &grid_config(4, 1.0, 2.0, 5.0)).unwrap();
        grid[0].mark_bought("0x1".into(), U256::from(10u64), U256::from(100u64), 1);
        grid[1].mark_bought("0x2".into(), U256::from(20u64), U256::from(200u64), 2);
        grid[1].mark_sold("0x3".into(), U256::from(250u64), U256::from(50u64), 25.0, 3);

        assert_eq!(count_active_positions(&grid), 1);

        let stats = calculate_grid_stats(&grid);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.empty, 2);
        assert_eq!(stats.holding, 1);
        assert_eq!(stats.sold, 1);
        assert_eq!(stats.total_invested_wei, U256::from(300u64));
        assert_eq!(stats.total_received_wei, U256::from(250u64));
        assert_eq!(stats.total_profit_wei, U256::from(50u64));
    }

    #[test]
    fn test_validate_continuous_coverage_detects_gap() {
        let mut grid = generate_grid(0.0005, &grid_config(5, 0.0001, 0.001, 8.0)).unwrap();
        assert!(validate_continuous_coverage(&grid));
        grid[2].buy_min += grid[2].width() * 0.05;
        assert!(!validate_continuous_coverage(&grid));
    }
}
