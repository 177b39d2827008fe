// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! External collaborators: swap quotes, chain execution, price oracle.
//!
//! The decision engine only sees the traits defined here; the concrete
//! implementations talk to the aggregator API and the RPC node.

pub mod chain;
pub mod price;
pub mod quote;

pub use chain::{AlloyChainClient, ChainClient, GasStrategy, TxOutcome};
pub use price::{ChainlinkPriceSource, PricePoint, PriceSource};
pub use quote::{HttpQuoteClient, QuoteClient, SwapQuote};

use alloy::{
    network::EthereumWallet,
    primitives::U256,
    providers::{Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use anyhow::{Context, Result};

/// Create a signing HTTP provider for the configured wallet.
pub fn create_provider(rpc_url: &str, private_key: &str) -> Result<impl Provider + Clone> {
    let signer: PrivateKeySigner = private_key.parse().context("Invalid private key")?;
    let wallet = EthereumWallet::from(signer);
    let url: Url = rpc_url.parse().context("Invalid RPC URL")?;
    Ok(ProviderBuilder::new().wallet(wallet).connect_http(url))
}

/// Convert an ETH amount to wei (18 decimals).
pub fn eth_to_wei(eth: f64) -> U256 {
    if eth <= 0.0 {
        return U256::ZERO;
    }
    U256::from((eth * 1e18) as u128)
}

/// Convert wei to an approximate ETH amount. Values beyond `u128::MAX`
/// (possible in unvalidated aggregator responses) saturate instead of
/// panicking.
pub fn wei_to_eth(wei: U256) -> f64 {
    u128::try_from(wei).unwrap_or(u128::MAX) as f64 / 1e18
}
