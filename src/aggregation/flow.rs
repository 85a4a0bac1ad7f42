//! Session-level flow aggregates: cumulative delta and the volume profile.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::types::{FootprintBar, PriceLevel};

const MAX_DELTA_HISTORY: usize = 1000;

/// Running buy-minus-sell volume across bars with a bounded history.
#[derive(Debug, Default)]
pub struct CumulativeDelta {
    current: i64,
    history: Vec<(DateTime<Utc>, i64)>,
}

impl CumulativeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bar: &FootprintBar) -> i64 {
        self.current += bar.delta();
        self.history.push((bar.end, self.current));
        if self.history.len() > MAX_DELTA_HISTORY {
            self.history.remove(0);
        }
        self.current
    }

    pub fn value(&self) -> i64 {
        self.current
    }

    /// Least-squares slope of the last `n` cumulative values, in delta
    /// units per bar. Zero when fewer than 2 points exist.
    pub fn slope(&self, n: usize) -> f64 {
        let start = self.history.len().saturating_sub(n);
        let points = &self.history[start..];
        if points.len() < 2 {
            return 0.0;
        }
        let len = points.len() as f64;
        let mean_x = (len - 1.0) / 2.0;
        let mean_y = points.iter().map(|(_, v)| *v as f64).sum::<f64>() / len;
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, (_, v)) in points.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (*v as f64 - mean_y);
            den += dx * dx;
        }
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.history.clear();
    }
}

/// Session volume profile merged across bars, keyed by tick index.
#[derive(Debug, Default)]
pub struct VolumeProfile {
    levels: BTreeMap<i64, PriceLevel>,
}

impl VolumeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bar: &FootprintBar) {
        for (key, level) in &bar.levels {
            let entry = self
                .levels
                .entry(*key)
                .or_insert_with(|| PriceLevel::new(level.price));
            entry.bid_volume += level.bid_volume;
            entry.ask_volume += level.ask_volume;
        }
    }

    pub fn total_volume(&self) -> u32 {
        self.levels.values().map(|l| l.total_volume()).sum()
    }

    /// Point of control: the price with the highest total volume.
    pub fn poc(&self) -> Option<f64> {
        self.levels
            .values()
            .max_by_key(|l| l.total_volume())
            .map(|l| l.price)
    }

    /// Prices holding `pct` of total volume, accumulated greedily from the
    /// highest-volume level down. The result is not necessarily a
    /// contiguous price range. Returns (low, high) bounds of the set.
    pub fn value_area(&self, pct: f64) -> Option<(f64, f64)> {
        let total = self.total_volume();
        if total == 0 {
            return None;
        }
        let mut sorted: Vec<&PriceLevel> = self.levels.values().collect();
        sorted.sort_by(|a, b| b.total_volume().cmp(&a.total_volume()));

        let target = total as f64 * pct;
        let mut accumulated = 0u32;
        let mut low = f64::MAX;
        let mut high = f64::MIN;
        for level in sorted {
            accumulated += level.total_volume();
            low = low.min(level.price);
            high = high.max(level.price);
            if accumulated as f64 >= target {
                break;
            }
        }
        Some((low, high))
    }

    /// Prices with volume at least `factor` times the per-level average.
    pub fn high_volume_nodes(&self, factor: f64) -> Vec<f64> {
        self.nodes(|vol, avg| vol >= avg * factor)
    }

    /// Prices with volume at most `factor` times the per-level average.
    pub fn low_volume_nodes(&self, factor: f64) -> Vec<f64> {
        self.nodes(|vol, avg| vol <= avg * factor)
    }

    fn nodes(&self, keep: impl Fn(f64, f64) -> bool) -> Vec<f64> {
        if self.levels.is_empty() {
            return Vec::new();
        }
        let avg = self.total_volume() as f64 / self.levels.len() as f64;
        self.levels
            .values()
            .filter(|l| keep(l.total_volume() as f64, avg))
            .map(|l| l.price)
            .collect()
    }

    pub fn reset(&mut self) {
        self.levels.clear();
    }
}
