// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory collaborators for exercising the decision loop without a
//! chain, an aggregator, or a filesystem.

use crate::exec::{
    eth_to_wei, ChainClient, PricePoint, PriceSource, QuoteClient, SwapQuote, TxOutcome,
};
use crate::notifier::{Notifier, NotifyEvent};
use crate::risk::CircuitBreakerState;
use crate::storage::{StateStore, StrategySnapshot};
use alloy::primitives::{Address, Bytes, U256};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub(crate) struct MockQuote {
    pub buy: Arc<Mutex<Option<SwapQuote>>>,
    pub sell: Arc<Mutex<Option<SwapQuote>>>,
    pub buy_requests: Arc<Mutex<Vec<U256>>>,
    pub sell_requests: Arc<Mutex<Vec<U256>>>,
}

impl QuoteClient for MockQuote {
    async fn sell_quote(
        &self,
        _token: Address,
        amount_tokens: U256,
        _trader: Address,
    ) -> Option<SwapQuote> {
        self.sell_requests.lock().unwrap().push(amount_tokens);
        self.sell.lock().unwrap().clone()
    }

    async fn buy_quote(
        &self,
        _token: Address,
        amount_eth_wei: U256,
        _trader: Address,
    ) -> Option<SwapQuote> {
        self.buy_requests.lock().unwrap().push(amount_eth_wei);
        self.buy.lock().unwrap().clone()
    }
}

/// A quote with the given output and gas; the rest is inert.
pub(crate) fn swap_quote(
    amount_out: U256,
    gas_units: u64,
    gas_price_wei: u128,
    price: f64,
) -> SwapQuote {
    SwapQuote {
        amount_out_wei: amount_out,
        gas_units,
        gas_price_wei,
        to: Address::ZERO,
        calldata: Bytes::new(),
        value: U256::ZERO,
        allowance_target: Address::ZERO,
        price,
    }
}

#[derive(Clone)]
pub(crate) struct MockChain {
    pub balance: Arc<Mutex<U256>>,
    pub fail_balance: Arc<Mutex<bool>>,
    pub fail_swaps: Arc<Mutex<bool>>,
    pub swaps: Arc<Mutex<Vec<SwapQuote>>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            balance: Arc::new(Mutex::new(eth_to_wei(1.0))),
            fail_balance: Arc::new(Mutex::new(false)),
            fail_swaps: Arc::new(Mutex::new(false)),
            swaps: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ChainClient for MockChain {
    async fn execute_swap(&self, quote: &SwapQuote) -> Result<TxOutcome> {
        if *self.fail_swaps.lock().unwrap() {
            bail!("rpc unavailable");
        }
        self.swaps.lock().unwrap().push(quote.clone());
        Ok(TxOutcome {
            tx_hash: "0xmock".to_string(),
            success: true,
            gas_cost_wei: quote.gas_cost_wei(),
        })
    }

    async fn eth_balance(&self, _owner: Address) -> Result<U256> {
        if *self.fail_balance.lock().unwrap() {
            bail!("rpc unavailable");
        }
        Ok(*self.balance.lock().unwrap())
    }

    async fn token_balance(&self, _token: Address, _owner: Address) -> Result<U256> {
        Ok(U256::ZERO)
    }

    async fn ensure_allowance(
        &self,
        _token: Address,
        _spender: Address,
        _amount: U256,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockPrice {
    pub point: Arc<Mutex<Option<PricePoint>>>,
}

impl MockPrice {
    pub fn set(&self, price: f64) {
        *self.point.lock().unwrap() = Some(PricePoint {
            price,
            confidence: 1.0,
        });
    }
}

impl PriceSource for MockPrice {
    async fn price(&self, _token: Address) -> Option<PricePoint> {
        *self.point.lock().unwrap()
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    pub strategies: Arc<Mutex<HashMap<String, StrategySnapshot>>>,
    pub breaker: Arc<Mutex<Option<CircuitBreakerState>>>,
    pub fail_saves: Arc<Mutex<bool>>,
}

impl StateStore for MemoryStore {
    fn save_strategy(&self, snapshot: &StrategySnapshot) -> Result<()> {
        if *self.fail_saves.lock().unwrap() {
            bail!("disk full");
        }
        self.strategies
            .lock()
            .unwrap()
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }

    fn load_strategies(&self) -> Result<Vec<StrategySnapshot>> {
        Ok(self.strategies.lock().unwrap().values().cloned().collect())
    }

    fn save_breaker(&self, state: &CircuitBreakerState) -> Result<()> {
        if *self.fail_saves.lock().unwrap() {
            bail!("disk full");
        }
        *self.breaker.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    fn load_breaker(&self) -> Result<Option<CircuitBreakerState>> {
        Ok(self.breaker.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    pub events: Arc<Mutex<Vec<NotifyEvent>>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotifyEvent) {
        self.events.lock().unwrap().push(event);
    }
}
