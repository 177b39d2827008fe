// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Price oracle access.
//!
//! The strategy only consumes `{price, confidence}`; a stale or
//! unavailable feed shows up as low confidence or `None` and the
//! strategy falls back to its other sources.

use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::sol;
use tracing::warn;

sol! {
    #[sol(rpc)]
    interface IAggregatorV3 {
        function decimals() external view returns (uint8);
        function latestRoundData()
            external view
            returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
    }
}

/// A price observation with a confidence score in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    /// Token price in ETH.
    pub price: f64,
    pub confidence: f64,
}

/// Price source contract: `None` on failure, never an error.
#[allow(async_fn_in_trait)]
pub trait PriceSource {
    async fn price(&self, token: Address) -> Option<PricePoint>;
}

/// Chainlink-style aggregator feed. Confidence decays with the age of
/// the latest round: fresh (< 1h) reads score 1.0, anything older than
/// a day scores 0. With no feed configured every read is `None` and the
/// strategy relies on its fallbacks.
pub struct ChainlinkPriceSource<P: Provider + Clone> {
    provider: P,
    feed: Option<Address>,
}

const FRESH_SECS: u64 = 3600;
const STALE_SECS: u64 = 86_400;

impl<P: Provider + Clone> ChainlinkPriceSource<P> {
    pub fn new(provider: P, feed: Option<Address>) -> Self {
        Self { provider, feed }
    }

    fn confidence_for_age(age_secs: u64) -> f64 {
        if age_secs <= FRESH_SECS {
            1.0
        } else if age_secs >= STALE_SECS {
            0.0
        } else {
            1.0 - (age_secs - FRESH_SECS) as f64 / (STALE_SECS - FRESH_SECS) as f64
        }
    }
}

impl<P: Provider + Clone> PriceSource for ChainlinkPriceSource<P> {
    async fn price(&self, _token: Address) -> Option<PricePoint> {
        let feed = IAggregatorV3::new(self.feed?, &self.provider);

        let decimals = match feed.decimals().call().await {
            Ok(d) => d,
            Err(e) => {
                warn!("Price feed decimals() failed: {}", e);
                return None;
            }
        };

        let round = match feed.latestRoundData().call().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Price feed latestRoundData() failed: {}", e);
                return None;
            }
        };

        let raw: i128 = round.answer.try_into().ok()?;
        if raw <= 0 {
            warn!("Price feed returned non-positive answer");
            return None;
        }
        let price = raw as f64 / 10f64.powi(decimals as i32);

        let updated_at: u64 = round.updatedAt.try_into().ok()?;
        let now = chrono::Utc::now().timestamp() as u64;
        let age = now.saturating_sub(updated_at);

        Some(PricePoint {
            price,
            confidence: Self::confidence_for_age(age),
        })
    }
}
