//! Core domain types for the order flow pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trade aggressor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Sell market order hitting the bid
    Bid,
    /// Buy market order lifting the ask
    Ask,
}

/// Single trade execution from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: u32,
    pub side: Side,
    pub symbol: String,
}

/// Aggregated volume at a single price within a bar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    /// Sell market orders (hitting bid)
    pub bid_volume: u32,
    /// Buy market orders (lifting ask)
    pub ask_volume: u32,
}

impl PriceLevel {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            bid_volume: 0,
            ask_volume: 0,
        }
    }

    pub fn total_volume(&self) -> u32 {
        self.bid_volume + self.ask_volume
    }

    /// Delta at this price level: buy volume - sell volume.
    pub fn delta(&self) -> i64 {
        self.ask_volume as i64 - self.bid_volume as i64
    }
}

/// A time-based bar containing volume at each price level.
///
/// Levels are keyed by integer tick index (`price / tick_size` rounded),
/// so iteration is always price-sorted and float keys never enter a map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootprintBar {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Bar duration in seconds
    pub timeframe: i64,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Tick increment the level keys are denominated in
    pub tick_size: f64,
    pub levels: BTreeMap<i64, PriceLevel>,
}

impl FootprintBar {
    pub fn price_key(price: f64, tick_size: f64) -> i64 {
        (price / tick_size).round() as i64
    }

    pub fn total_volume(&self) -> u32 {
        self.levels.values().map(|l| l.total_volume()).sum()
    }

    /// Bar delta: total buy volume - total sell volume.
    pub fn delta(&self) -> i64 {
        self.levels.values().map(|l| l.delta()).sum()
    }

    pub fn buy_volume(&self) -> u32 {
        self.levels.values().map(|l| l.ask_volume).sum()
    }

    pub fn sell_volume(&self) -> u32 {
        self.levels.values().map(|l| l.bid_volume).sum()
    }

    /// Price levels in ascending price order.
    pub fn sorted_levels(&self) -> Vec<&PriceLevel> {
        self.levels.values().collect()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// All detectable order flow patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalPattern {
    BuyImbalance,
    SellImbalance,
    StackedBuyImbalance,
    StackedSellImbalance,
    BuyingExhaustion,
    SellingExhaustion,
    BullishDeltaDivergence,
    BearishDeltaDivergence,
    BuyingAbsorption,
    SellingAbsorption,
    UnfinishedHigh,
    UnfinishedLow,
    UnfinishedRevisited,
}

impl std::fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BuyImbalance => "BUY_IMBALANCE",
            Self::SellImbalance => "SELL_IMBALANCE",
            Self::StackedBuyImbalance => "STACKED_BUY_IMBALANCE",
            Self::StackedSellImbalance => "STACKED_SELL_IMBALANCE",
            Self::BuyingExhaustion => "BUYING_EXHAUSTION",
            Self::SellingExhaustion => "SELLING_EXHAUSTION",
            Self::BullishDeltaDivergence => "BULLISH_DELTA_DIVERGENCE",
            Self::BearishDeltaDivergence => "BEARISH_DELTA_DIVERGENCE",
            Self::BuyingAbsorption => "BUYING_ABSORPTION",
            Self::SellingAbsorption => "SELLING_ABSORPTION",
            Self::UnfinishedHigh => "UNFINISHED_HIGH",
            Self::UnfinishedLow => "UNFINISHED_LOW",
            Self::UnfinishedRevisited => "UNFINISHED_REVISITED",
        };
        write!(f, "{}", s)
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Pattern-specific signal payload, one variant per pattern family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SignalDetails {
    Imbalance {
        ratio: f64,
        dominant_volume: u32,
        opposing_volume: u32,
        opposing_price: f64,
    },
    StackedImbalance {
        stack_size: usize,
        bottom_price: f64,
        top_price: f64,
    },
    Exhaustion {
        consecutive_declines: usize,
        decline_percentage: f64,
        volumes: Vec<u32>,
    },
    Absorption {
        dominant_volume: u32,
        opposing_volume: u32,
        total_volume: u32,
        close_position: f64,
    },
    Divergence {
        extreme_price: f64,
        current_delta: i64,
        deltas: Vec<i64>,
    },
    Unfinished {
        ask_volume: u32,
        bid_volume: u32,
    },
    Revisit {
        original_time: DateTime<Utc>,
        extreme: UnfinishedExtreme,
    },
}

/// Which bar extreme an unfinished auction occurred at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnfinishedExtreme {
    High,
    Low,
}

/// Market regime classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    NoTrade,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TrendingUp => "TRENDING_UP",
            Self::TrendingDown => "TRENDING_DOWN",
            Self::Ranging => "RANGING",
            Self::Volatile => "VOLATILE",
            Self::NoTrade => "NO_TRADE",
        };
        write!(f, "{}", s)
    }
}

/// Output from pattern detection, annotated by the strategy router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub pattern: SignalPattern,
    pub direction: Direction,
    /// 0.0 - 1.0
    pub strength: f64,
    pub price: f64,
    pub details: SignalDetails,

    // Added by strategy router
    pub regime: Option<Regime>,
    pub regime_confidence: f64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

impl Signal {
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: &str,
        pattern: SignalPattern,
        direction: Direction,
        strength: f64,
        price: f64,
        details: SignalDetails,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.to_string(),
            pattern,
            direction,
            strength,
            price,
            details,
            regime: None,
            regime_confidence: 0.0,
            approved: false,
            rejection_reason: None,
        }
    }

    /// True when the pattern is one of the stacked imbalance variants.
    pub fn is_stacked(&self) -> bool {
        matches!(
            self.pattern,
            SignalPattern::StackedBuyImbalance | SignalPattern::StackedSellImbalance
        )
    }
}
