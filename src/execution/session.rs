//! Trading session limits and time windows.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

use crate::config::TradingMode;
use crate::instruments::symbol_profile;

/// Minutes since midnight Eastern.
fn eastern_minutes(ts: DateTime<Utc>) -> u32 {
    let et = ts.with_timezone(&New_York);
    et.hour() * 60 + et.minute()
}

/// Risk limits and time windows for one trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub symbol: String,
    pub mode: TradingMode,

    /// Halt the session once daily P&L reaches this
    pub daily_profit_target: f64,
    pub max_concurrent_trades: usize,

    pub stop_ticks: u32,
    pub target_ticks: u32,

    /// Entry window, minutes since midnight Eastern
    pub trading_start_minutes: u32,
    pub trading_end_minutes: u32,
    /// Sub-windows with no new entries (start, end), minutes Eastern
    pub no_trade_windows: Vec<(u32, u32)>,
    /// Skip the time-window checks entirely (replay over historic data)
    pub bypass_trading_hours: bool,
}

impl SessionConfig {
    /// Defaults tuned per symbol: bracket widths from the instrument
    /// profile, 9:30-15:45 ET entries, lunch doldrums excluded.
    pub fn for_symbol(symbol: &str, mode: TradingMode) -> Self {
        let profile = symbol_profile(symbol);
        Self {
            symbol: symbol.to_string(),
            mode,
            daily_profit_target: 500.0,
            max_concurrent_trades: 1,
            stop_ticks: profile.stop_ticks,
            target_ticks: profile.target_ticks,
            trading_start_minutes: 9 * 60 + 30,
            trading_end_minutes: 15 * 60 + 45,
            no_trade_windows: vec![(12 * 60, 13 * 60)],
            bypass_trading_hours: false,
        }
    }

    /// Whether new entries are allowed at this instant.
    pub fn is_within_trading_hours(&self, ts: DateTime<Utc>) -> bool {
        if self.bypass_trading_hours {
            return true;
        }
        let minutes = eastern_minutes(ts);
        if minutes < self.trading_start_minutes || minutes > self.trading_end_minutes {
            return false;
        }
        !self
            .no_trade_windows
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&minutes))
    }
}
