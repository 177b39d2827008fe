// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Portfolio-wide circuit breaker.
//!
//! Tracks realized daily/total loss across every strategy and blocks
//! all new buys once a threshold is breached. Armed -> Triggered ->
//! (cooldown elapses) -> Armed. Checks are rate-limited; callers get a
//! cached verdict inside the window.

use crate::notifier::{Notifier, NotifyEvent};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Daily realized loss threshold in percent of the daily baseline.
    pub max_daily_loss_pct: f64,
    /// All-time realized loss threshold in percent of the daily baseline.
    pub max_total_loss_pct: f64,
    /// Minutes before a triggered breaker re-arms on its own.
    pub cooldown_minutes: i64,
    /// Zero the daily loss and rebase the date when the calendar day changes.
    pub auto_reset_at_midnight: bool,
    /// Minimum seconds between loss recomputations.
    pub check_interval_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 10.0,
            max_total_loss_pct: 20.0,
            cooldown_minutes: 60,
            auto_reset_at_midnight: true,
            check_interval_secs: 60,
        }
    }
}

/// Persisted breaker state. Mutated only by the breaker itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    /// Portfolio value at the first check of the current day, in ETH.
    pub daily_start_value: f64,
    /// Realized PnL at the first check of the current day, in ETH.
    #[serde(default)]
    pub daily_start_pnl: f64,
    pub daily_loss: f64,
    pub total_loss: f64,
    pub last_reset_date: NaiveDate,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            triggered: false,
            triggered_at: None,
            reason: None,
            daily_start_value: 0.0,
            daily_start_pnl: 0.0,
            daily_loss: 0.0,
            total_loss: 0.0,
            last_reset_date: Utc::now().date_naive(),
        }
    }
}

pub struct CircuitBreaker<N: Notifier> {
    config: CircuitBreakerConfig,
    state: CircuitBreakerState,
    notifier: N,
    last_check: Option<Instant>,
    last_verdict: bool,
}

impl<N: Notifier> CircuitBreaker<N> {
    pub fn new(config: CircuitBreakerConfig, notifier: N) -> Self {
        Self {
            config,
            state: CircuitBreakerState::default(),
            notifier,
            last_check: None,
            last_verdict: false,
        }
    }

    /// Rebuild from persisted state.
    pub fn with_state(config: CircuitBreakerConfig, state: CircuitBreakerState, notifier: N) -> Self {
        let verdict = state.triggered;
        Self {
            config,
            state,
            notifier,
            last_check: None,
            last_verdict: verdict,
        }
    }

    /// Current verdict without recomputation.
    pub fn is_triggered(&self) -> bool {
        self.state.triggered
    }

    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }

    /// Evaluate the breaker against the portfolio.
    ///
    /// `portfolio_value` and `total_realized_pnl` are in ETH, summed
    /// across all strategies. Returns `true` when new buys must be
    /// blocked. At most one recomputation per `check_interval_secs`;
    /// inside the window the previous verdict is returned unchanged.
    pub fn check(&mut self, portfolio_value: f64, total_realized_pnl: f64) -> bool {
        if let Some(last) = self.last_check {
            if last.elapsed().as_secs() < self.config.check_interval_secs {
                return self.last_verdict;
            }
        }
        self.last_check = Some(Instant::now());

        let today = Utc::now().date_naive();

        // Calendar-day rollover, independent of trigger state.
        if self.config.auto_reset_at_midnight && today != self.state.last_reset_date {
            info!("🌅 Circuit breaker daily reset ({} -> {})", self.state.last_reset_date, today);
            self.state.daily_loss = 0.0;
            self.state.daily_start_value = 0.0;
            self.state.daily_start_pnl = total_realized_pnl;
            self.state.last_reset_date = today;
        }

        if self.state.triggered {
            let elapsed_ok = self
                .state
                .triggered_at
                .map(|at| Utc::now() - at >= chrono::Duration::minutes(self.config.cooldown_minutes))
                .unwrap_or(true);

            if elapsed_ok {
                info!("✅ Circuit breaker cooldown elapsed, re-arming");
                self.state.triggered = false;
                self.state.triggered_at = None;
                self.state.reason = None;
                self.notifier.notify(NotifyEvent::CircuitBreakerReset);
            } else {
                // Still cooling down: report triggered without recomputing loss.
                self.last_verdict = true;
                return true;
            }
        }

        // Daily baseline captured lazily on the first check of the day.
        if self.state.daily_start_value <= 0.0 {
            self.state.daily_start_value = portfolio_value;
            self.state.daily_start_pnl = total_realized_pnl;
        }

        let daily_pnl = total_realized_pnl - self.state.daily_start_pnl;
        self.state.daily_loss = (-daily_pnl).max(0.0);
        self.state.total_loss = (-total_realized_pnl).max(0.0);

        let baseline = self.state.daily_start_value;
        let (daily_loss_pct, total_loss_pct) = if baseline > 0.0 {
            (
                self.state.daily_loss / baseline * 100.0,
                self.state.total_loss / baseline * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        if daily_loss_pct >= self.config.max_daily_loss_pct {
            self.trigger(format!(
                "Daily loss limit reached: {:.2}% >= {:.2}%",
                daily_loss_pct, self.config.max_daily_loss_pct
            ));
        } else if total_loss_pct >= self.config.max_total_loss_pct {
            self.trigger(format!(
                "Total loss limit reached: {:.2}% >= {:.2}%",
                total_loss_pct, self.config.max_total_loss_pct
            ));
        }

        self.last_verdict = self.state.triggered;
        self.last_verdict
    }

    /// Manual/emergency activation, bypassing threshold checks.
    pub fn force_trigger(&mut self, reason: String) {
        warn!("🚨 Circuit breaker force-triggered: {}", reason);
        self.trigger(reason);
        self.last_verdict = true;
    }

    /// Manual override: clear the trigger unconditionally. Notifies
    /// only if the breaker was actually triggered.
    pub fn reset(&mut self) {
        let was_triggered = self.state.triggered;
        self.state.triggered = false;
        self.state.triggered_at = None;
        self.state.reason = None;
        self.last_verdict = false;
        if was_triggered {
            info!("✅ Circuit breaker manually reset");
            self.notifier.notify(NotifyEvent::CircuitBreakerReset);
        }
    }

    fn trigger(&mut self, reason: String) {
        if self.state.triggered {
            return;
        }
        warn!("🚨 CIRCUIT BREAKER TRIGGERED: {}", reason);
        self.state.triggered = true;
        self.state.triggered_at = Some(Utc::now());
        self.state.reason = Some(reason.clone());
        self.notifier
            .notify(NotifyEvent::CircuitBreakerTriggered { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records events synchronously for assertions.
    #[derive(Clone, Default)]
    struct RecordingNotifier {
        events: Arc<Mutex<Vec<NotifyEvent>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, event: NotifyEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            check_interval_secs: 0, // recompute on every call in tests
            ..CircuitBreakerConfig::default()
        }
    }

    #[test]
    fn test_daily_loss_triggers_with_reason() {
        let notifier = RecordingNotifier::default();
        let mut breaker = CircuitBreaker::new(test_config(), notifier.clone());

        // Baseline capture: 1 ETH portfolio, flat PnL.
        assert!(!breaker.check(1.0, 0.0));

        // 11% realized loss against the 1 ETH baseline.
        assert!(breaker.check(0.89, -0.11));
        assert!(breaker.is_triggered());
        let reason = breaker.state().reason.clone().unwrap();
        assert!(reason.contains("Daily loss limit reached"), "{}", reason);

        let events = notifier.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(NotifyEvent::CircuitBreakerTriggered { .. })
        ));
    }

    #[test]
    fn test_total_loss_triggers() {
        let mut breaker = CircuitBreaker::new(
            CircuitBreakerConfig {
                max_daily_loss_pct: 90.0, // keep the daily threshold out of the way
                ..test_config()
            },
            RecordingNotifier::default(),
        );
        assert!(!breaker.check(1.0, 0.0));
        assert!(breaker.check(0.75, -0.25));
        assert!(breaker
            .state()
            .reason
            .as_deref()
            .unwrap()
            .contains("Total loss limit reached"));
    }

    #[test]
    fn test_below_threshold_stays_armed() {
        let mut breaker = CircuitBreaker::new(test_config(), RecordingNotifier::default());
        assert!(!breaker.check(1.0, 0.0));
        assert!(!breaker.check(0.95, -0.05));
        assert!(!breaker.is_triggered());
    }

    #[test]
    fn test_rate_limited_verdict_is_cached() {
        // Default 60s window: the second check must not recompute.
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), RecordingNotifier::default());
        assert!(!breaker.check(1.0, 0.0));
        // A loss that would trigger is ignored inside the window.
        assert!(!breaker.check(0.5, -0.5));
        assert!(!breaker.is_triggered());
    }

    #[test]
    fn test_cooldown_auto_resets() {
        let notifier = RecordingNotifier::default();
        let state = CircuitBreakerState {
            triggered: true,
            triggered_at: Some(Utc::now() - chrono::Duration::minutes(120)),
            reason: Some("Daily loss limit reached: test".to_string()),
            daily_start_value: 1.0,
            ..CircuitBreakerState::default()
        };
        let mut breaker = CircuitBreaker::with_state(test_config(), state, notifier.clone());

        assert!(breaker.is_triggered());
        // Cooldown (60 min) elapsed: re-arms and recomputes cleanly.
        assert!(!breaker.check(1.0, 0.0));
        assert!(!breaker.is_triggered());
        assert!(matches!(
            notifier.events.lock().unwrap().last(),
            Some(NotifyEvent::CircuitBreakerReset)
        ));
    }

    #[test]
    fn test_within_cooldown_reports_triggered() {
        let state = CircuitBreakerState {
            triggered: true,
            triggered_at: Some(Utc::now() - chrono::Duration::minutes(5)),
            reason: Some("test".to_string()),
            daily_start_value: 1.0,
            ..CircuitBreakerState::default()
        };
        let mut breaker =
            CircuitBreaker::with_state(test_config(), state, RecordingNotifier::default());
        // Portfolio fully recovered, but cooldown has not elapsed.
        assert!(breaker.check(10.0, 5.0));
    }

    #[test]
    fn test_midnight_reset_rebases_daily_loss() {
        let state = CircuitBreakerState {
            daily_start_value: 1.0,
            daily_start_pnl: 0.0,
            daily_loss: 0.08,
            last_reset_date: Utc::now().date_naive() - chrono::Duration::days(1),
            ..CircuitBreakerState::default()
        };
        let mut breaker =
            CircuitBreaker::with_state(test_config(), state, RecordingNotifier::default());

        // Yesterday's 8% loss does not count against today.
        assert!(!breaker.check(0.92, -0.08));
        assert_eq!(breaker.state().last_reset_date, Utc::now().date_naive());
        assert!((breaker.state().daily_loss - 0.0).abs() < 1e-12);
        // Total loss is still tracked across days.
        assert!((breaker.state().total_loss - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_force_trigger_and_manual_reset() {
        let notifier = RecordingNotifier::default();
        let mut breaker = CircuitBreaker::new(test_config(), notifier.clone());

        breaker.force_trigger("manual halt".to_string());
        assert!(breaker.is_triggered());
        assert_eq!(breaker.state().reason.as_deref(), Some("manual halt"));

        breaker.reset();
        assert!(!breaker.is_triggered());

        // Resetting an armed breaker stays silent.
        let before = notifier.events.lock().unwrap().len();
        breaker.reset();
        assert_eq!(notifier.events.lock().unwrap().len(), before);
    }
}
