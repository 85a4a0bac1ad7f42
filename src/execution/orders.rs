//! Order, position, and trade records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Direction, Regime, SignalPattern};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Target,
    Stop,
    Manual,
    Halted,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Target => "TARGET",
            Self::Stop => "STOP",
            Self::Manual => "MANUAL",
            Self::Halted => "HALTED",
        };
        write!(f, "{}", s)
    }
}

/// Entry order with attached stop and target levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketOrder {
    pub bracket_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub size: u32,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub created_at: DateTime<Utc>,
}

/// Order submission request published to the broker collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub bracket_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub size: u32,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

impl OrderRequest {
    pub fn from_bracket(order: &BracketOrder) -> Self {
        Self {
            bracket_id: order.bracket_id,
            symbol: order.symbol.clone(),
            direction: order.direction,
            size: order.size,
            entry: order.entry_price,
            stop: order.stop_price,
            target: order.target_price,
        }
    }
}

/// Fill acknowledgment from the broker collaborator. `fill_id` keys
/// deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    pub bracket_id: Uuid,
    pub price: f64,
    pub size: u32,
    pub timestamp: DateTime<Utc>,
}

/// An open position.
///
/// `tick_size` and `tick_value` are captured at entry so P&L stays
/// correct if the tier switches instruments while the position is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub bracket_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub size: u32,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_price: f64,
    pub target_price: f64,
    pub tick_size: f64,
    pub tick_value: f64,

    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
}

impl Position {
    pub fn open(order: &BracketOrder, tick_size: f64, tick_value: f64, now: DateTime<Utc>) -> Self {
        Self {
            position_id: Uuid::new_v4(),
            bracket_id: order.bracket_id,
            symbol: order.symbol.clone(),
            direction: order.direction,
            size: order.size,
            entry_price: order.entry_price,
            entry_time: now,
            stop_price: order.stop_price,
            target_price: order.target_price,
            tick_size,
            tick_value,
            current_price: order.entry_price,
            unrealized_pnl: 0.0,
        }
    }

    /// Signed price move in the position's favor.
    fn favorable_move(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => price - self.entry_price,
            Direction::Short => self.entry_price - price,
        }
    }

    /// P&L in whole ticks at the given exit price.
    pub fn pnl_ticks(&self, exit_price: f64) -> i64 {
        (self.favorable_move(exit_price) / self.tick_size).round() as i64
    }

    /// P&L in dollars at the given exit price, using entry-captured
    /// tick values.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        self.pnl_ticks(exit_price) as f64 * self.tick_value * self.size as f64
    }

    pub fn update_unrealized(&mut self, price: f64) -> f64 {
        self.current_price = price;
        self.unrealized_pnl = self.favorable_move(price) / self.tick_size * self.tick_value
            * self.size as f64;
        self.unrealized_pnl
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_price,
            Direction::Short => price >= self.stop_price,
        }
    }

    pub fn target_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price >= self.target_price,
            Direction::Short => price <= self.target_price,
        }
    }
}

/// A completed round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub bracket_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub size: u32,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_ticks: i64,
    pub signal_pattern: Option<SignalPattern>,
    pub regime: Option<Regime>,
}

impl Trade {
    pub fn close(
        position: &Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            bracket_id: position.bracket_id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            size: position.size,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            exit_price,
            exit_time,
            exit_reason: reason,
            pnl: position.pnl_at(exit_price),
            pnl_ticks: position.pnl_ticks(exit_price),
            signal_pattern: None,
            regime: None,
        }
    }
}
