// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Swap-quote aggregator client.
//!
//! The contract with the decision loop: any failure (network, HTTP,
//! malformed body) is reported as `None`, never an error, so "no
//! quote" simply means "skip this cycle".

use alloy::primitives::{Address, Bytes, U256};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, warn};

/// Sentinel address aggregators use for the native asset.
const NATIVE_ETH: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// An executable swap quote.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    /// Tokens out for a buy, wei out for a sell.
    pub amount_out_wei: U256,
    pub gas_units: u64,
    pub gas_price_wei: u128,
    /// Contract to call.
    pub to: Address,
    pub calldata: Bytes,
    /// ETH attached to the call (buy side).
    pub value: U256,
    /// Spender that needs an allowance (sell side).
    pub allowance_target: Address,
    /// Implied token price in ETH, usable as a price fallback.
    pub price: f64,
}

impl SwapQuote {
    /// Estimated gas cost of executing this quote, in wei.
    pub fn gas_cost_wei(&self) -> U256 {
        U256::from(self.gas_units as u128 * self.gas_price_wei)
    }
}

/// Swap-quote source.
#[allow(async_fn_in_trait)]
pub trait QuoteClient {
    /// Quote selling `amount_tokens` of `token` for ETH.
    async fn sell_quote(&self, token: Address, amount_tokens: U256, trader: Address) -> Option<SwapQuote>;

    /// Quote buying `token` with `amount_eth_wei` of ETH.
    async fn buy_quote(&self, token: Address, amount_eth_wei: U256, trader: Address) -> Option<SwapQuote>;
}

/// 0x-style HTTP aggregator client.
pub struct HttpQuoteClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    price: String,
    to: String,
    data: String,
    value: String,
    gas: String,
    gas_price: String,
    buy_amount: String,
    #[serde(default)]
    allowance_target: Option<String>,
}

impl HttpQuoteClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn fetch(
        &self,
        sell_token: String,
        buy_token: String,
        sell_amount: U256,
        trader: Address,
    ) -> Option<SwapQuote> {
        let url = format!("{}/swap/v1/quote", self.base_url);
        let mut request = self.client.get(&url).query(&[
            ("sellToken", sell_token),
            ("buyToken", buy_token),
            ("sellAmount", sell_amount.to_string()),
            ("takerAddress", format!("{:?}", trader)),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("0x-api-key", key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Quote request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Quote API returned {}", response.status());
            return None;
        }

        let body: QuoteResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Malformed quote response: {}", e);
                return None;
            }
        };

        Self::parse(body)
    }

    fn parse(body: QuoteResponse) -> Option<SwapQuote> {
        let quote = SwapQuote {
            amount_out_wei: U256::from_str(&body.buy_amount).ok()?,
            gas_units: body.gas.parse().ok()?,
            gas_price_wei: body.gas_price.parse().ok()?,
            to: Address::from_str(&body.to).ok()?,
            calldata: Bytes::from_str(&body.data).ok()?,
            value: U256::from_str(&body.value).ok()?,
            allowance_target: body
                .allowance_target
                .as_deref()
                .and_then(|a| Address::from_str(a).ok())
                .unwrap_or(Address::ZERO),
            price: body.price.parse().ok()?,
        };
        debug!(
            "Quote: out={}, gas={}x{}",
            quote.amount_out_wei, quote.gas_units, quote.gas_price_wei
        );
        Some(quote)
    }
}

impl QuoteClient for HttpQuoteClient {
    async fn sell_quote(&self, token: Address, amount_tokens: U256, trader: Address) -> Option<SwapQuote> {
        self.fetch(
            format!("{:?}", token),
            NATIVE_ETH.to_string(),
            amount_tokens,
            trader,
        )
        .await
    }

    async fn buy_quote(&self, token: Address, amount_eth_wei: U256, trader: Address) -> Option<SwapQuote> {
        self.fetch(
            NATIVE_ETH.to_string(),
            format!("{:?}", token),
            amount_eth_wei,
            trader,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote_response() {
        let body = QuoteResponse {
            price: "0.0000012".to_string(),
            to: "0xDef1C0ded9bec7F1a1670819833240f027b25EfF".to_string(),
            data: "0xdeadbeef".to_string(),
            value: "1000000000000000".to_string(),
            gas: "210000".to_string(),
            gas_price: "20000000000".to_string(),
            buy_amount: "123456789".to_string(),
            allowance_target: Some("0xDef1C0ded9bec7F1a1670819833240f027b25EfF".to_string()),
        };
        let quote = HttpQuoteClient::parse(body).unwrap();
        assert_eq!(quote.amount_out_wei, U256::from(123_456_789u64));
        assert_eq!(quote.gas_units, 210_000);
        assert_eq!(
            quote.gas_cost_wei(),
            U256::from(210_000u128 * 20_000_000_000u128)
        );
        assert!((quote.price - 0.0000012).abs() < 1e-18);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let body = QuoteResponse {
            price: "not-a-number".to_string(),
            to: "0xDef1C0ded9bec7F1a1670819833240f027b25EfF".to_string(),
            data: "0x".to_string(),
            value: "0".to_string(),
            gas: "1".to_string(),
            gas_price: "1".to_string(),
            buy_amount: "1".to_string(),
            allowance_target: None,
        };
        assert!(HttpQuoteClient::parse(body).is_none());
    }
}
