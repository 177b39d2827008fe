// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Risk controls: portfolio circuit breaker and trailing stop-loss.

pub mod circuit_breaker;
pub mod trailing_stop;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
pub use trailing_stop::{TrailStep, TrailingStopConfig, TrailingStopState, TrailingStopTracker};
