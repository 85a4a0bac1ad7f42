//! Derives regime classifier inputs from completed bar history.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::America::New_York;

use crate::config::RegimeConfig;
use crate::regime::indicators::{
    self, adx, atr, avg_bar_range, ema, percentile, range_bound_bars, slope, vwap, Ohlc,
};
use crate::types::FootprintBar;

const MAX_BARS: usize = 200;
const MIN_BARS: usize = 21;

const SESSION_OPEN_MINUTES: i64 = 9 * 60 + 30;
const SESSION_CLOSE_MINUTES: i64 = 16 * 60;
const FULL_SESSION_MINUTES: i64 = SESSION_CLOSE_MINUTES - SESSION_OPEN_MINUTES;

/// Everything the classifier looks at for one bar close.
#[derive(Debug, Clone)]
pub struct RegimeInputs {
    // Trend strength
    pub adx_14: f64,
    pub adx_slope: f64,

    // Trend direction
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_trend: f64,
    pub price_vs_vwap: f64,

    // Volatility
    pub atr_14: f64,
    pub atr_percentile: f64,
    pub bar_range_avg: f64,

    // Volume and delta
    pub volume_vs_average: f64,
    pub cumulative_delta: i64,
    pub delta_slope: f64,

    // Market structure
    pub higher_highs: bool,
    pub higher_lows: bool,
    pub lower_highs: bool,
    pub lower_lows: bool,
    pub range_bound_bars: usize,

    // Time context
    pub minutes_since_open: i64,
    pub minutes_to_close: i64,
    pub is_news_window: bool,
}

impl Default for RegimeInputs {
    fn default() -> Self {
        Self {
            adx_14: 0.0,
            adx_slope: 0.0,
            ema_fast: 0.0,
            ema_slow: 0.0,
            ema_trend: 0.0,
            price_vs_vwap: 0.0,
            atr_14: 0.0,
            atr_percentile: 50.0,
            bar_range_avg: 0.0,
            volume_vs_average: 1.0,
            cumulative_delta: 0,
            delta_slope: 0.0,
            higher_highs: false,
            higher_lows: false,
            lower_highs: false,
            lower_lows: false,
            range_bound_bars: 0,
            minutes_since_open: 0,
            minutes_to_close: FULL_SESSION_MINUTES,
            is_news_window: false,
        }
    }
}

/// Maintains bounded bar history and computes [`RegimeInputs`] on demand.
///
/// Time context is taken from the bar timestamp in Eastern time, so replay
/// classifies identically to live.
pub struct RegimeInputsCalculator {
    config: RegimeConfig,
    bars: Vec<FootprintBar>,
    ohlc: Vec<Ohlc>,
}

impl RegimeInputsCalculator {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            bars: Vec::new(),
            ohlc: Vec::new(),
        }
    }

    pub fn add_bar(&mut self, bar: &FootprintBar) {
        self.ohlc.push(Ohlc {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.total_volume(),
        });
        self.bars.push(bar.clone());

        if self.bars.len() > MAX_BARS {
            let excess = self.bars.len() - MAX_BARS;
            self.bars.drain(..excess);
            self.ohlc.drain(..excess);
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// Compute inputs from current history. Returns defaults while warming
    /// up (fewer than 21 bars), which the classifier treats as NoTrade via
    /// the session-open override.
    pub fn calculate(&self) -> RegimeInputs {
        if self.bars.len() < MIN_BARS {
            return RegimeInputs::default();
        }

        let closes: Vec<f64> = self.ohlc.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = self.ohlc.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = self.ohlc.iter().map(|b| b.low).collect();
        let deltas: Vec<f64> = self.bars.iter().map(|b| b.delta() as f64).collect();
        let volumes: Vec<u32> = self.ohlc.iter().map(|b| b.volume).collect();

        let ema_9 = ema(&closes, 9);
        let ema_21 = ema(&closes, 21);
        let adx_values = adx(&self.ohlc, 14);
        let atr_values = atr(&self.ohlc, 14);
        let vwap_values = vwap(&self.ohlc);

        let last = closes.len() - 1;
        let current_atr = atr_values[last];

        let avg_volume = volumes[volumes.len().saturating_sub(20)..]
            .iter()
            .map(|v| *v as f64)
            .sum::<f64>()
            / volumes.len().min(20) as f64;
        let volume_ratio = if avg_volume > 0.0 {
            volumes[last] as f64 / avg_volume
        } else {
            1.0
        };

        let atr_pct = if atr_values.len() >= 10 {
            let start = atr_values.len().saturating_sub(50);
            percentile(current_atr, &atr_values[start..])
        } else {
            50.0
        };

        let (since_open, to_close) = self.session_minutes(self.bars[last].end);

        RegimeInputs {
            adx_14: adx_values[last],
            adx_slope: slope(&adx_values, 5),
            ema_fast: ema_9[last],
            ema_slow: ema_21[last],
            ema_trend: ema_9[last] - ema_21[last],
            price_vs_vwap: closes[last] - vwap_values[last],
            atr_14: current_atr,
            atr_percentile: atr_pct,
            bar_range_avg: avg_bar_range(&self.ohlc, 5),
            volume_vs_average: volume_ratio,
            cumulative_delta: self.bars.iter().map(|b| b.delta()).sum(),
            delta_slope: slope(&deltas, 10),
            higher_highs: indicators::higher_highs(&highs, 5),
            higher_lows: indicators::higher_lows(&lows, 5),
            lower_highs: indicators::lower_highs(&highs, 5),
            lower_lows: indicators::lower_lows(&lows, 5),
            range_bound_bars: range_bound_bars(&highs, &lows, 10),
            minutes_since_open: since_open,
            minutes_to_close: to_close,
            is_news_window: self.is_news_window(ts_minutes_eastern(self.bars[last].end)),
        }
    }

    fn session_minutes(&self, ts: DateTime<Utc>) -> (i64, i64) {
        let minutes = ts_minutes_eastern(ts);
        (
            (minutes - SESSION_OPEN_MINUTES).max(0),
            (SESSION_CLOSE_MINUTES - minutes).max(0),
        )
    }

    fn is_news_window(&self, minutes: i64) -> bool {
        self.config
            .news_minutes
            .iter()
            .any(|news| (minutes - news).abs() <= self.config.news_buffer_minutes)
    }

    pub fn reset(&mut self) {
        self.bars.clear();
        self.ohlc.clear();
    }
}

fn ts_minutes_eastern(ts: DateTime<Utc>) -> i64 {
    let et = ts.with_timezone(&New_York);
    et.hour() as i64 * 60 + et.minute() as i64
}
