// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration module - loads settings from environment variables.

use alloy::primitives::Address;
use std::str::FromStr;

/// Process-wide configuration for the grid bot.
#[derive(Debug, Clone)]
pub struct Config {
    // RPC
    pub rpc_url: String,
    pub chain_id: u64,

    // Wallet
    pub private_key: String,
    pub wallet_address: Address,

    // Quote aggregator
    pub quote_api_url: String,
    pub quote_api_key: Option<String>,

    // Price oracle
    pub price_feed_address: Option<Address>,
    pub min_price_confidence: f64,

    // Gas
    pub gas_limit: u64,
    pub gas_multiplier: f64,

    // Scheduler
    pub heartbeat_interval_ms: u64,

    // Circuit breaker
    pub max_daily_loss_pct: f64,
    pub max_total_loss_pct: f64,
    pub breaker_cooldown_minutes: i64,
    pub auto_reset_at_midnight: bool,

    // Trailing stop-loss
    pub trailing_enabled: bool,
    pub trailing_activation_pct: f64,
    pub trailing_pct: f64,

    // Telegram
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    // Persistence
    pub state_dir: String,

    // Default strategy loaded from env
    pub strategy: StrategyConfig,
}

/// Per-strategy configuration. Immutable for the life of a cycle; the
/// owning strategy holds it by value.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub token_address: Address,

    // Grid shape
    pub num_positions: usize,
    /// Explicit floor, or auto-derived as `current_price / 10`.
    pub floor_price: Option<f64>,
    /// Explicit ceiling, or auto-derived as `current_price * 4`.
    pub ceiling_price: Option<f64>,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub stop_loss_enabled: bool,

    // Entry control
    pub buys_enabled: bool,
    pub sells_enabled: bool,
    pub max_active_positions: usize,
    /// Fixed buy size in ETH; `None` spreads the wallet balance over
    /// remaining empty slots.
    pub buy_amount_eth: Option<f64>,
    /// ETH kept aside for gas when auto-sizing buys.
    pub gas_reserve_eth: f64,
    /// Buys below this size are rejected as dust.
    pub min_buy_eth: f64,

    // Sell gating
    /// Hard floor: proceeds must exceed (cost + gas) * 1.02.
    pub strict_profit_gate: bool,
    /// Legacy mode margin: net profit must exceed cost * pct / 100.
    pub min_profit_pct: f64,
    /// Fraction of tokens retained on each sell, 0 disables.
    pub moon_bag_pct: f64,

    // Failure handling
    pub max_consecutive_errors: u32,
    /// Visit this strategy only every N-th scheduler heartbeat.
    pub skip_heartbeats: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            token_address: Address::ZERO,
            num_positions: 10,
            floor_price: None,
            ceiling_price: None,
            take_profit_pct: 8.0,
            stop_loss_pct: 15.0,
            stop_loss_enabled: false,
            buys_enabled: true,
            sells_enabled: true,
            max_active_positions: 5,
            buy_amount_eth: None,
            gas_reserve_eth: 0.01,
            min_buy_eth: 0.0005,
            strict_profit_gate: true,
            min_profit_pct: 2.0,
            moon_bag_pct: 0.0,
            max_consecutive_errors: 5,
            skip_heartbeats: 1,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let strategy = StrategyConfig {
            name: env_var_or("STRATEGY_NAME", "default"),
            token_address: parse_address(&env_var("TOKEN_ADDRESS")?)?,
            num_positions: env_var_or("GRID_POSITIONS", "10").parse().unwrap_or(10),
            floor_price: std::env::var("GRID_FLOOR_PRICE").ok().and_then(|v| v.parse().ok()),
            ceiling_price: std::env::var("GRID_CEILING_PRICE").ok().and_then(|v| v.parse().ok()),
            take_profit_pct: env_var_or("TAKE_PROFIT_PCT", "8.0").parse().unwrap_or(8.0),
            stop_loss_pct: env_var_or("STOP_LOSS_PCT", "15.0").parse().unwrap_or(15.0),
            stop_loss_enabled: env_var_or("STOP_LOSS_ENABLED", "false").parse().unwrap_or(false),
            buys_enabled: env_var_or("BUYS_ENABLED", "true").parse().unwrap_or(true),
            sells_enabled: env_var_or("SELLS_ENABLED", "true").parse().unwrap_or(true),
            max_active_positions: env_var_or("MAX_ACTIVE_POSITIONS", "5").parse().unwrap_or(5),
            buy_amount_eth: std::env::var("BUY_AMOUNT_ETH").ok().and_then(|v| v.parse().ok()),
            gas_reserve_eth: env_var_or("GAS_RESERVE_ETH", "0.01").parse().unwrap_or(0.01),
            min_buy_eth: env_var_or("MIN_BUY_ETH", "0.0005").parse().unwrap_or(0.0005),
            strict_profit_gate: env_var_or("STRICT_PROFIT_GATE", "true").parse().unwrap_or(true),
            min_profit_pct: env_var_or("MIN_PROFIT_PCT", "2.0").parse().unwrap_or(2.0),
            moon_bag_pct: env_var_or("MOON_BAG_PCT", "0.0").parse().unwrap_or(0.0),
            max_consecutive_errors: env_var_or("MAX_CONSECUTIVE_ERRORS", "5").parse().unwrap_or(5),
            skip_heartbeats: env_var_or("SKIP_HEARTBEATS", "1").parse().unwrap_or(1),
        };

        Ok(Self {
            // RPC
            rpc_url: env_var("ETH_RPC_URL")?,
            chain_id: env_var_or("CHAIN_ID", "1").parse().unwrap_or(1),

            // Wallet
            private_key: env_var("PRIVATE_KEY")?,
            wallet_address: parse_address(&env_var("WALLET_ADDRESS")?)?,

            // Quote aggregator
            quote_api_url: env_var_or("QUOTE_API_URL", "https://api.0x.org"),
            quote_api_key: std::env::var("QUOTE_API_KEY").ok(),

            // Price oracle
            price_feed_address: std::env::var("PRICE_FEED_ADDRESS")
                .ok()
                .and_then(|v| Address::from_str(&v).ok()),
            min_price_confidence: env_var_or("MIN_PRICE_CONFIDENCE", "0.5")
                .parse()
                .unwrap_or(0.5),

            // Gas
            gas_limit: env_var_or("GAS_LIMIT", "500000").parse().unwrap_or(500_000),
            gas_multiplier: env_var_or("GAS_MULTIPLIER", "1.1").parse().unwrap_or(1.1),

            // Scheduler
            heartbeat_interval_ms: env_var_or("HEARTBEAT_INTERVAL_MS", "15000")
                .parse()
                .unwrap_or(15_000),

            // Circuit breaker
            max_daily_loss_pct: env_var_or("MAX_DAILY_LOSS_PCT", "10.0")
                .parse()
                .unwrap_or(10.0),
            max_total_loss_pct: env_var_or("MAX_TOTAL_LOSS_PCT", "20.0")
                .parse()
                .unwrap_or(20.0),
            breaker_cooldown_minutes: env_var_or("BREAKER_COOLDOWN_MINUTES", "60")
                .parse()
                .unwrap_or(60),
            auto_reset_at_midnight: env_var_or("BREAKER_AUTO_RESET_AT_MIDNIGHT", "true")
                .parse()
                .unwrap_or(true),

            // Trailing stop-loss
            trailing_enabled: env_var_or("TRAILING_ENABLED", "true").parse().unwrap_or(true),
            trailing_activation_pct: env_var_or("TRAILING_ACTIVATION_PCT", "3.0")
                .parse()
                .unwrap_or(3.0),
            trailing_pct: env_var_or("TRAILING_PCT", "5.0").parse().unwrap_or(5.0),

            // Telegram
            telegram_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),

            // Persistence
            state_dir: env_var_or("STATE_DIR", "."),

            strategy,
        })
    }
}

fn env_var(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{} not set", name))
}

fn env_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_str(s).map_err(|e| format!("Invalid address {}: {}", s, e))
}
