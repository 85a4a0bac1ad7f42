//! Builds footprint bars from a tick stream.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::{FootprintBar, PriceLevel, Side, Tick};

const MAX_BAR_HISTORY: usize = 500;

/// Aggregates ticks into fixed-timeframe footprint bars.
///
/// A tick whose timestamp falls outside the current bar's window closes
/// that bar and opens a new one. Completed bars are retained up to a
/// bounded history for downstream indicator calculations.
pub struct BarAggregator {
    symbol: String,
    timeframe: i64,
    tick_size: f64,
    current: Option<FootprintBar>,
    history: Vec<FootprintBar>,
}

impl BarAggregator {
    pub fn new(symbol: &str, timeframe_secs: i64, tick_size: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe_secs,
            tick_size,
            current: None,
            history: Vec::new(),
        }
    }

    /// Floor a timestamp to its bar window start.
    fn window_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(self.timeframe);
        Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
    }

    /// Fold one tick into the aggregator. Returns the completed bar when
    /// this tick opens a new window. A tick timestamped before the
    /// current window folds into the current bar; closed bars are never
    /// reopened.
    pub fn process_tick(&mut self, tick: &Tick) -> Option<FootprintBar> {
        let window = self.window_start(tick.timestamp);
        // Snap off-increment prints to the instrument grid before any use
        let key = FootprintBar::price_key(tick.price, self.tick_size);
        let price = key as f64 * self.tick_size;

        let completed = match &self.current {
            Some(bar) if window > bar.start => self.current.take(),
            _ => None,
        };

        let bar = self.current.get_or_insert_with(|| FootprintBar {
            symbol: self.symbol.clone(),
            start: window,
            end: window + Duration::seconds(self.timeframe),
            timeframe: self.timeframe,
            open: price,
            high: price,
            low: price,
            close: price,
            tick_size: self.tick_size,
            levels: Default::default(),
        });

        bar.high = bar.high.max(price);
        bar.low = bar.low.min(price);
        bar.close = price;

        let level = bar
            .levels
            .entry(key)
            .or_insert_with(|| PriceLevel::new(price));
        match tick.side {
            Side::Ask => level.ask_volume += tick.size,
            Side::Bid => level.bid_volume += tick.size,
        }

        if let Some(done) = completed {
            self.push_history(done.clone());
            return Some(done);
        }
        None
    }

    /// Close and return the in-progress bar, if any.
    pub fn flush(&mut self) -> Option<FootprintBar> {
        let bar = self.current.take()?;
        self.push_history(bar.clone());
        Some(bar)
    }

    fn push_history(&mut self, bar: FootprintBar) {
        self.history.push(bar);
        if self.history.len() > MAX_BAR_HISTORY {
            self.history.remove(0);
        }
    }

    /// Most recent `n` completed bars, oldest first.
    pub fn recent_bars(&self, n: usize) -> &[FootprintBar] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn bar_count(&self) -> usize {
        self.history.len()
    }

    pub fn current_bar(&self) -> Option<&FootprintBar> {
        self.current.as_ref()
    }

    /// Drop all state at a session boundary.
    pub fn reset(&mut self) {
        self.current = None;
        self.history.clear();
    }
}
