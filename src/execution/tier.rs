//! Balance-tier progression and additive position sizing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Regime;

/// One row of the tier table.
#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub name: &'static str,
    pub min_balance: f64,
    pub max_balance: f64,
    pub instrument: &'static str,
    pub max_contracts: u32,
    pub daily_loss_limit: f64,
    pub scaling_enabled: bool,
}

/// Balance tiers from micro building to full-size ES.
pub const TIERS: &[Tier] = &[
    Tier {
        name: "Tier 1: MES Building",
        min_balance: 0.0,
        max_balance: 3500.0,
        instrument: "MES",
        max_contracts: 3,
        daily_loss_limit: -100.0,
        scaling_enabled: true,
    },
    Tier {
        name: "Tier 2: ES Entry",
        min_balance: 3500.0,
        max_balance: 5000.0,
        instrument: "ES",
        max_contracts: 1,
        daily_loss_limit: -400.0,
        scaling_enabled: false,
    },
    Tier {
        name: "Tier 3: ES Growth",
        min_balance: 5000.0,
        max_balance: 7500.0,
        instrument: "ES",
        max_contracts: 2,
        daily_loss_limit: -400.0,
        scaling_enabled: true,
    },
    Tier {
        name: "Tier 4: ES Scaling",
        min_balance: 7500.0,
        max_balance: 10000.0,
        instrument: "ES",
        max_contracts: 3,
        daily_loss_limit: -500.0,
        scaling_enabled: true,
    },
    Tier {
        name: "Tier 5: ES Full",
        min_balance: 10000.0,
        max_balance: f64::INFINITY,
        instrument: "ES",
        max_contracts: 3,
        daily_loss_limit: -500.0,
        scaling_enabled: true,
    },
];

fn tier_for_balance(balance: f64) -> usize {
    TIERS
        .iter()
        .position(|t| t.min_balance <= balance && balance < t.max_balance)
        .unwrap_or(0)
}

/// Record of a tier transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierChange {
    pub timestamp: DateTime<Utc>,
    pub from_tier: usize,
    pub to_tier: usize,
    pub balance: f64,
}

/// Serializable tier manager state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierState {
    pub balance: f64,
    pub tier_index: usize,
    pub session_start_balance: f64,
    pub session_pnl: f64,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub tier_changes: Vec<TierChange>,
}

const MAX_TIER_CHANGES: usize = 100;

/// Tracks balance, streaks, and the active tier, and computes the
/// additive position size.
pub struct TierManager {
    state: TierState,
}

impl TierManager {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            state: TierState {
                balance: starting_balance,
                tier_index: tier_for_balance(starting_balance),
                session_start_balance: starting_balance,
                session_pnl: 0.0,
                win_streak: 0,
                loss_streak: 0,
                tier_changes: Vec::new(),
            },
        }
    }

    pub fn from_state(state: TierState) -> Self {
        Self { state }
    }

    pub fn current(&self) -> &Tier {
        &TIERS[self.state.tier_index]
    }

    pub fn state(&self) -> &TierState {
        &self.state
    }

    pub fn balance(&self) -> f64 {
        self.state.balance
    }

    pub fn session_pnl(&self) -> f64 {
        self.state.session_pnl
    }

    /// Apply a closed trade's P&L: balance, session P&L, streaks, and
    /// tier re-selection.
    pub fn record_trade(&mut self, pnl: f64) {
        self.state.balance += pnl;
        self.state.session_pnl += pnl;

        if pnl > 0.0 {
            self.state.win_streak += 1;
            self.state.loss_streak = 0;
        } else if pnl < 0.0 {
            self.state.loss_streak += 1;
            self.state.win_streak = 0;
        }

        self.update_tier(Utc::now());
    }

    /// Reset session tracking at a day boundary.
    pub fn start_session(&mut self) {
        self.state.session_start_balance = self.state.balance;
        self.state.session_pnl = 0.0;
        self.update_tier(Utc::now());
    }

    fn update_tier(&mut self, now: DateTime<Utc>) -> bool {
        let new_index = tier_for_balance(self.state.balance);
        if new_index == self.state.tier_index {
            return false;
        }

        let direction = if new_index > self.state.tier_index {
            "UP"
        } else {
            "DOWN"
        };
        info!(
            direction,
            from = TIERS[self.state.tier_index].name,
            to = TIERS[new_index].name,
            balance = self.state.balance,
            "tier change"
        );

        self.state.tier_changes.push(TierChange {
            timestamp: now,
            from_tier: self.state.tier_index,
            to_tier: new_index,
            balance: self.state.balance,
        });
        if self.state.tier_changes.len() > MAX_TIER_CHANGES {
            let excess = self.state.tier_changes.len() - MAX_TIER_CHANGES;
            self.state.tier_changes.drain(..excess);
        }

        self.state.tier_index = new_index;
        true
    }

    /// Additive sizing: base 1, +1 for a stacked signal, +1 in a
    /// trending regime, +1 on a 3+ win streak, -1 on a 2+ loss streak,
    /// clamped to [1, tier max]. Tiers with scaling disabled always
    /// trade 1 contract.
    pub fn position_size(&self, stacked: bool, regime: Regime) -> u32 {
        let tier = self.current();
        if !tier.scaling_enabled {
            return 1;
        }

        let mut size: i32 = 1;
        if stacked {
            size += 1;
        }
        if matches!(regime, Regime::TrendingUp | Regime::TrendingDown) {
            size += 1;
        }
        if self.state.win_streak >= 3 {
            size += 1;
        } else if self.state.loss_streak >= 2 {
            size -= 1;
        }

        (size.max(1) as u32).min(tier.max_contracts)
    }

    /// Session P&L at or below the tier's loss limit.
    pub fn should_halt(&self) -> bool {
        self.state.session_pnl <= self.current().daily_loss_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_selection_by_balance() {
        assert_eq!(TIERS[tier_for_balance(2500.0)].instrument, "MES");
        assert_eq!(TIERS[tier_for_balance(3499.99)].instrument, "MES");
        assert_eq!(TIERS[tier_for_balance(3500.0)].instrument, "ES");
        assert_eq!(TIERS[tier_for_balance(3500.0)].max_contracts, 1);
        assert_eq!(TIERS[tier_for_balance(50000.0)].name, "Tier 5: ES Full");
    }

    #[test]
    fn test_tier_promotion_on_trade() {
        let mut manager = TierManager::new(3450.0);
        assert_eq!(manager.current().instrument, "MES");

        manager.record_trade(100.0);
        assert_eq!(manager.current().instrument, "ES");
        assert_eq!(manager.state().tier_changes.len(), 1);
    }

    #[test]
    fn test_tier_demotion_on_loss() {
        let mut manager = TierManager::new(3600.0);
        assert_eq!(manager.current().instrument, "ES");

        manager.record_trade(-200.0);
        assert_eq!(manager.current().instrument, "MES");
    }

    #[test]
    fn test_additive_sizing() {
        let mut manager = TierManager::new(2500.0);
        // Base only
        assert_eq!(manager.position_size(false, Regime::Ranging), 1);
        // Stacked + trending
        assert_eq!(manager.position_size(true, Regime::TrendingUp), 3);
        // Clamped to tier max of 3
        manager.state.win_streak = 3;
        assert_eq!(manager.position_size(true, Regime::TrendingUp), 3);
    }

    #[test]
    fn test_loss_streak_reduces_but_floors_at_one() {
        let mut manager = TierManager::new(2500.0);
        manager.record_trade(-10.0);
        manager.record_trade(-10.0);
        assert_eq!(manager.state().loss_streak, 2);
        assert_eq!(manager.position_size(false, Regime::Ranging), 1);
        assert_eq!(manager.position_size(false, Regime::TrendingUp), 1);
    }

    #[test]
    fn test_scaling_disabled_tier_trades_one() {
        let manager = TierManager::new(4000.0);
        assert!(!manager.current().scaling_enabled);
        assert_eq!(manager.position_size(true, Regime::TrendingUp), 1);
    }

    #[test]
    fn test_streaks() {
        let mut manager = TierManager::new(2500.0);
        manager.record_trade(10.0);
        manager.record_trade(10.0);
        manager.record_trade(10.0);
        assert_eq!(manager.state().win_streak, 3);
        assert_eq!(manager.position_size(false, Regime::Ranging), 2);

        manager.record_trade(-10.0);
        assert_eq!(manager.state().win_streak, 0);
        assert_eq!(manager.state().loss_streak, 1);
    }

    #[test]
    fn test_halt_at_loss_limit() {
        let mut manager = TierManager::new(2500.0);
        assert!(!manager.should_halt());
        manager.record_trade(-100.0);
        assert!(manager.should_halt());
    }
}
