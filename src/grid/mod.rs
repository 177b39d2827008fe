// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Grid partitioning and position lifecycle.

pub mod engine;
pub mod position;

pub use engine::{
    calculate_grid_stats, count_active_positions, find_buy_position, find_sell_positions,
    generate_grid, validate_continuous_coverage, GridStats,
};
pub use position::{GridPosition, PositionStatus};
