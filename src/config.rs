//! Engine configuration

use serde::{Deserialize, Serialize};

/// Trading mode determines whether fills are simulated locally or routed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    /// Simulated fills, no external routing
    Paper,
    /// Orders published for an external broker bridge to fill
    Live,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paper
    }
}

impl TradingMode {
    pub fn is_paper(&self) -> bool {
        matches!(self, Self::Paper)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "Paper"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Diagonal ratio required for an imbalance print
    pub imbalance_ratio: f64,

    /// Consecutive same-direction imbalances required for a stacked signal
    pub min_stack: usize,

    /// Price levels inspected at the bar extreme for exhaustion
    pub exhaustion_levels: usize,

    /// Total volume decline required across the exhaustion window
    pub exhaustion_decline_pct: f64,

    /// Share of combined volume one side must hold for absorption
    pub absorption_dominance: f64,

    /// Bars of history examined for delta divergence
    pub divergence_lookback: usize,

    /// Volume at or below this at a one-sided extreme marks it unfinished
    pub unfinished_threshold: u32,

    /// Tracked unfinished levels per symbol before the oldest is dropped
    pub max_tracked_levels: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            imbalance_ratio: 3.0,
            min_stack: 3,
            exhaustion_levels: 3,
            exhaustion_decline_pct: 0.30,
            absorption_dominance: 0.60,
            divergence_lookback: 5,
            unfinished_threshold: 5,
            max_tracked_levels: 50,
        }
    }
}

/// Regime classifier and router thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Winning score below this classifies as Volatile
    pub min_regime_score: f64,

    /// Minutes after the session open with no new entries
    pub open_quiet_minutes: i64,

    /// Minutes before the session close with no new entries
    pub close_quiet_minutes: i64,

    /// Minutes of no-trade around each scheduled news release
    pub news_buffer_minutes: i64,

    /// Bar volume below this fraction of average forces NoTrade
    pub min_volume_ratio: f64,

    /// Minimum signal strength the router will pass
    pub min_signal_strength: f64,

    /// Minimum regime confidence the router will pass
    pub min_regime_confidence: f64,

    /// Scheduled news times as minutes since midnight Eastern (e.g. 8:30 = 510)
    pub news_minutes: Vec<i64>,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_regime_score: 4.0,
            open_quiet_minutes: 5,
            close_quiet_minutes: 15,
            news_buffer_minutes: 15,
            min_volume_ratio: 0.30,
            min_signal_strength: 0.6,
            min_regime_confidence: 0.7,
            // 8:30 ET (CPI/NFP slot) and 14:00 ET (FOMC slot)
            news_minutes: vec![510, 840],
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbol to trade (e.g. "MES", "ES.c.0")
    pub symbol: String,

    /// Trading mode (paper or live)
    pub mode: TradingMode,

    /// Bar timeframe in seconds
    pub timeframe_secs: i64,

    /// Account balance at session start
    pub starting_balance: f64,

    /// Directory for session state snapshots
    pub state_dir: String,

    pub detectors: DetectorConfig,
    pub regime: RegimeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "MES".to_string(),
            mode: TradingMode::Paper,
            timeframe_secs: 300,
            starting_balance: 2000.0,
            state_dir: "state".to_string(),
            detectors: DetectorConfig::default(),
            regime: RegimeConfig::default(),
        }
    }
}
