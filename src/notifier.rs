// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Notifier - one-way, best-effort event notifications.
//!
//! Handles are injected into the strategy and circuit breaker
//! constructors; nothing here is a process-wide singleton. Delivery is
//! fire-and-forget: a failed send is logged and never affects the
//! outcome of the trade that produced it.

use alloy::primitives::Address;
use teloxide::prelude::*;
use tracing::{error, info};

/// Events the decision loop reports. No return value is consulted.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    TradeExecuted {
        strategy: String,
        side: TradeSide,
        position_id: usize,
        token: Address,
        tx_hash: String,
        amount_eth: f64,
    },
    ProfitRealized {
        strategy: String,
        position_id: usize,
        profit_eth: f64,
        profit_pct: f64,
    },
    StrategyStopped {
        strategy: String,
        reason: String,
    },
    CircuitBreakerTriggered {
        reason: String,
    },
    CircuitBreakerReset,
    LiquidationReport {
        strategy: String,
        attempted: usize,
        sold: usize,
        failed: usize,
        total_profit_eth: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One-way notification sink.
pub trait Notifier: Clone + Send + Sync + 'static {
    /// Dispatch an event. Must not block and must not fail the caller.
    fn notify(&self, event: NotifyEvent);
}

/// Telegram notifier backed by teloxide. Sends are spawned as detached
/// tasks so the decision loop never waits on the network.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Option<Bot>,
    chat_id: Option<ChatId>,
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        info!(
            "📱 Initializing Telegram: token={}, chat_id={}",
            token.as_ref().map(|_| "SET").unwrap_or("NONE"),
            chat_id.as_ref().map(|_| "SET").unwrap_or("NONE")
        );

        let bot = token.map(Bot::new);
        let chat_id = chat_id.and_then(|id| id.parse::<i64>().ok().map(ChatId));

        Self { bot, chat_id }
    }

    fn format(event: &NotifyEvent) -> String {
        match event {
            NotifyEvent::TradeExecuted {
                strategy,
                side,
                position_id,
                token,
                tx_hash,
                amount_eth,
            } => {
                let tag = match side {
                    TradeSide::Buy => "🟢 *BUY EXECUTED*",
                    TradeSide::Sell => "🔴 *SELL EXECUTED*",
                };
                format!(
                    "{}\nStrategy: {}\nPosition: #{}\nToken: `{:?}`\nAmount: {:.6} ETH\nHash: `{}`",
                    tag, strategy, position_id, token, amount_eth, tx_hash
                )
            }
            NotifyEvent::ProfitRealized {
                strategy,
                position_id,
                profit_eth,
                profit_pct,
            } => format!(
                "💰 *PROFIT REALIZED*\nStrategy: {}\nPosition: #{}\nProfit: {:.6} ETH ({:.2}%)",
                strategy, position_id, profit_eth, profit_pct
            ),
            NotifyEvent::StrategyStopped { strategy, reason } => format!(
                "🛑 *STRATEGY STOPPED*\nStrategy: {}\nReason: {}",
                strategy, reason
            ),
            NotifyEvent::CircuitBreakerTriggered { reason } => format!(
                "🚨 *CIRCUIT BREAKER TRIGGERED*\n{}\nAll new buys are blocked until reset.",
                reason
            ),
            NotifyEvent::CircuitBreakerReset => "✅ *CIRCUIT BREAKER RESET*\nTrading resumed.".to_string(),
            NotifyEvent::LiquidationReport {
                strategy,
                attempted,
                sold,
                failed,
                total_profit_eth,
            } => format!(
                "🧹 *LIQUIDATION COMPLETE*\nStrategy: {}\nAttempted: {}\nSold: {}\nFailed: {}\nRealized: {:.6} ETH",
                strategy, attempted, sold, failed, total_profit_eth
            ),
        }
    }

    /// Send a raw message (startup/shutdown banners).
    pub fn send_message(&self, message: String) {
        if let (Some(bot), Some(chat_id)) = (self.bot.clone(), self.chat_id) {
            tokio::spawn(async move {
                match bot.send_message(chat_id, message).await {
                    Ok(_) => info!("📤 Sent Telegram message"),
                    Err(e) => error!("Failed to send Telegram message: {}", e),
                }
            });
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, event: NotifyEvent) {
        self.send_message(Self::format(&event));
    }
}

/// Notifier that drops everything, for disabled notifications.
#[derive(Clone, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: NotifyEvent) {}
}
