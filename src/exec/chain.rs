// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Chain client: transaction submission, balances, allowances.

use crate::exec::quote::SwapQuote;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use anyhow::{anyhow, bail, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Outcome of a submitted and confirmed transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub tx_hash: String,
    pub success: bool,
    /// Actual gas spent, in wei.
    pub gas_cost_wei: U256,
}

/// Chain access the strategy needs: execute a quoted swap, read
/// balances, manage allowances.
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// Submit the quote's transaction and await its receipt.
    async fn execute_swap(&self, quote: &SwapQuote) -> Result<TxOutcome>;

    async fn eth_balance(&self, owner: Address) -> Result<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    /// Make sure `spender` may move at least `amount` of `token`,
    /// submitting an approval when the current allowance is short.
    async fn ensure_allowance(&self, token: Address, spender: Address, amount: U256) -> Result<()>;
}

/// Gas strategy determines how aggressively we bid for inclusion.
#[derive(Debug, Clone, Copy, Default)]
pub enum GasStrategy {
    /// base_fee * 1.1 + 1 gwei priority
    #[default]
    Normal,
    /// base_fee * 1.5 + 10 gwei priority
    Aggressive,
}

impl GasStrategy {
    /// Returns (max_fee_per_gas, max_priority_fee_per_gas) in wei.
    pub fn calculate(&self, base_fee: u128) -> (u128, u128) {
        match self {
            Self::Normal => {
                let max_fee = base_fee * 110 / 100;
                let priority = 1_000_000_000; // 1 gwei
                (max_fee + priority, priority)
            }
            Self::Aggressive => {
                let max_fee = base_fee * 150 / 100;
                let priority = 10_000_000_000; // 10 gwei
                (max_fee + priority, priority)
            }
        }
    }

    pub fn from_multiplier(multiplier: f64) -> Self {
        if multiplier >= 1.5 {
            Self::Aggressive
        } else {
            Self::Normal
        }
    }
}

/// Alloy-backed chain client with local nonce tracking.
pub struct AlloyChainClient<P: Provider + Clone> {
    provider: P,
    wallet_address: Address,
    gas_limit: u64,
    gas_strategy: GasStrategy,
    nonce: AtomicU64,
}

impl<P: Provider + Clone> AlloyChainClient<P> {
    pub async fn new(
        provider: P,
        wallet_address: Address,
        gas_limit: u64,
        gas_strategy: GasStrategy,
    ) -> Result<Self> {
        let nonce = provider
            .get_transaction_count(wallet_address)
            .await
            .context("Failed to get nonce")?;

        Ok(Self {
            provider,
            wallet_address,
            gas_limit,
            gas_strategy,
            nonce: AtomicU64::new(nonce),
        })
    }

    async fn get_base_fee(&self) -> Result<u128> {
        let block = self
            .provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await
            .context("Failed to get block")?
            .ok_or_else(|| anyhow!("No latest block"))?;

        block
            .header
            .base_fee_per_gas
            .map(|fee| fee as u128)
            .ok_or_else(|| anyhow!("No base fee in latest block"))
    }

    async fn submit(&self, tx: TransactionRequest) -> Result<TxOutcome> {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        debug!("Using nonce: {}", nonce);

        let pending = self
            .provider
            .send_transaction(tx.nonce(nonce))
            .await
            .map_err(|e| {
                // Rollback nonce on failure
                self.nonce.fetch_sub(1, Ordering::SeqCst);
                anyhow!("Failed to send tx: {}", e)
            })?;

        info!("📤 Transaction sent: {:?}", pending.tx_hash());

        let receipt = pending
            .get_receipt()
            .await
            .context("Failed to get receipt")?;

        let gas_cost =
            U256::from(receipt.gas_used as u128) * U256::from(receipt.effective_gas_price);

        Ok(TxOutcome {
            tx_hash: format!("{:?}", receipt.transaction_hash),
            success: receipt.status(),
            gas_cost_wei: gas_cost,
        })
    }
}

impl<P: Provider + Clone> ChainClient for AlloyChainClient<P> {
    async fn execute_swap(&self, quote: &SwapQuote) -> Result<TxOutcome> {
        let base_fee = self.get_base_fee().await?;
        let (max_fee, priority_fee) = self.gas_strategy.calculate(base_fee);
        debug!(
            "Gas: base_fee={}, max_fee={}, priority={}",
            base_fee, max_fee, priority_fee
        );

        let tx = TransactionRequest::default()
            .to(quote.to)
            .value(quote.value)
            .input(quote.calldata.clone().into())
            .gas_limit(self.gas_limit)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority_fee);

        let outcome = self.submit(tx).await?;
        if outcome.success {
            info!("✅ Swap confirmed: {}", outcome.tx_hash);
        } else {
            error!("❌ Swap reverted: {}", outcome.tx_hash);
        }
        Ok(outcome)
    }

    async fn eth_balance(&self, owner: Address) -> Result<U256> {
        self.provider
            .get_balance(owner)
            .await
            .context("Failed to get ETH balance")
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let contract = IERC20::new(token, &self.provider);
        contract
            .balanceOf(owner)
            .call()
            .await
            .context("balanceOf failed")
    }

    async fn ensure_allowance(&self, token: Address, spender: Address, amount: U256) -> Result<()> {
        if spender == Address::ZERO {
            return Ok(());
        }

        let contract = IERC20::new(token, &self.provider);
        let current = contract
            .allowance(self.wallet_address, spender)
            .call()
            .await
            .context("allowance failed")?;

        if current >= amount {
            return Ok(());
        }

        info!("🔓 Approving {:?} for {} tokens", spender, amount);
        let approve_call = contract.approve(spender, amount);
        let tx = TransactionRequest::default()
            .to(token)
            .input(approve_call.calldata().clone().into())
            .gas_limit(100_000);

        let outcome = self.submit(tx).await?;
        if !outcome.success {
            bail!("Approve transaction reverted: {}", outcome.tx_hash);
        }
        info!("✅ Approval confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_strategy_fees() {
        let base = 100_000_000_000u128; // 100 gwei
        let (max, prio) = GasStrategy::Normal.calculate(base);
        assert_eq!(prio, 1_000_000_000);
        assert_eq!(max, base * 110 / 100 + prio);

        let (max, prio) = GasStrategy::Aggressive.calculate(base);
        assert_eq!(prio, 10_000_000_000);
        assert_eq!(max, base * 150 / 100 + prio);
    }

    #[test]
    fn test_gas_strategy_from_multiplier() {
        assert!(matches!(GasStrategy::from_multiplier(1.0), GasStrategy::Normal));
        assert!(matches!(GasStrategy::from_multiplier(1.5), GasStrategy::Aggressive));
        assert!(matches!(GasStrategy::from_multiplier(2.0), GasStrategy::Aggressive));
    }
}
