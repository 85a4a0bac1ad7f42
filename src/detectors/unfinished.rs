//! Unfinished business detection: incomplete auctions at bar extremes.

use chrono::{DateTime, Utc};

use crate::types::{
    Direction, FootprintBar, Signal, SignalDetails, SignalPattern, UnfinishedExtreme,
};

/// An extreme price the auction left one-sided, pending a revisit.
#[derive(Debug, Clone)]
pub struct UnfinishedLevel {
    pub price: f64,
    pub time: DateTime<Utc>,
    pub extreme: UnfinishedExtreme,
}

/// Tracks one-sided bar extremes and the later bars that trade back
/// through them.
///
/// An unfinished high has bid volume but little to no ask volume at the
/// top level. Tracked levels are removed when a bar's range covers them,
/// emitting a revisit signal.
pub struct UnfinishedBusinessDetector {
    threshold: u32,
    max_tracked: usize,
    levels: Vec<UnfinishedLevel>,
}

impl UnfinishedBusinessDetector {
    pub fn new(threshold: u32, max_tracked: usize) -> Self {
        Self {
            threshold,
            max_tracked,
            levels: Vec::new(),
        }
    }

    pub fn detect(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let levels = bar.sorted_levels();
        let (first, last) = match (levels.first(), levels.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return signals,
        };

        // Buyers reached the high but could not lift the offer
        if last.ask_volume <= self.threshold && last.bid_volume > self.threshold {
            self.track(bar.high, bar.end, UnfinishedExtreme::High);
            signals.push(Signal::new(
                bar.end,
                &bar.symbol,
                SignalPattern::UnfinishedHigh,
                Direction::Long,
                0.6,
                bar.high,
                SignalDetails::Unfinished {
                    ask_volume: last.ask_volume,
                    bid_volume: last.bid_volume,
                },
            ));
        }

        // Sellers reached the low but could not break the bid
        if first.bid_volume <= self.threshold && first.ask_volume > self.threshold {
            self.track(bar.low, bar.end, UnfinishedExtreme::Low);
            signals.push(Signal::new(
                bar.end,
                &bar.symbol,
                SignalPattern::UnfinishedLow,
                Direction::Short,
                0.6,
                bar.low,
                SignalDetails::Unfinished {
                    ask_volume: first.ask_volume,
                    bid_volume: first.bid_volume,
                },
            ));
        }

        signals
    }

    /// Emit revisit signals for tracked levels inside this bar's range and
    /// stop tracking them.
    pub fn check_revisit(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        self.levels.retain(|level| {
            if bar.low <= level.price && level.price <= bar.high {
                let direction = match level.extreme {
                    UnfinishedExtreme::High => Direction::Long,
                    UnfinishedExtreme::Low => Direction::Short,
                };
                signals.push(Signal::new(
                    bar.end,
                    &bar.symbol,
                    SignalPattern::UnfinishedRevisited,
                    direction,
                    0.5,
                    level.price,
                    SignalDetails::Revisit {
                        original_time: level.time,
                        extreme: level.extreme,
                    },
                ));
                false
            } else {
                true
            }
        });
        signals
    }

    fn track(&mut self, price: f64, time: DateTime<Utc>, extreme: UnfinishedExtreme) {
        self.levels.push(UnfinishedLevel {
            price,
            time,
            extreme,
        });
        if self.levels.len() > self.max_tracked {
            let excess = self.levels.len() - self.max_tracked;
            self.levels.drain(..excess);
        }
    }

    pub fn active_levels(&self) -> &[UnfinishedLevel] {
        &self.levels
    }

    pub fn reset(&mut self) {
        self.levels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceLevel;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn bar(levels: &[(f64, u32, u32)]) -> FootprintBar {
        let mut map = BTreeMap::new();
        for &(price, bid, ask) in levels {
            map.insert(
                FootprintBar::price_key(price, 0.25),
                PriceLevel {
                    price,
                    bid_volume: bid,
                    ask_volume: ask,
                },
            );
        }
        let high = levels.iter().map(|l| l.0).fold(f64::MIN, f64::max);
        let low = levels.iter().map(|l| l.0).fold(f64::MAX, f64::min);
        FootprintBar {
            symbol: "MES".to_string(),
            start: Utc::now(),
            end: Utc::now(),
            timeframe: 300,
            open: low,
            high,
            low,
            close: low,
            tick_size: 0.25,
            levels: map,
        }
    }

    #[test]
    fn test_unfinished_high() {
        let mut detector = UnfinishedBusinessDetector::new(5, 50);
        // Top level has bids but almost no ask volume
        let signals = detector.detect(&bar(&[(5000.0, 10, 30), (5000.25, 20, 2)]));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].pattern, SignalPattern::UnfinishedHigh);
        assert_eq!(signals[0].price, 5000.25);
        assert_eq!(detector.active_levels().len(), 1);
    }

    #[test]
    fn test_balanced_extreme_is_finished() {
        let mut detector = UnfinishedBusinessDetector::new(5, 50);
        let signals = detector.detect(&bar(&[(5000.0, 10, 30), (5000.25, 20, 25)]));
        assert!(signals.is_empty());
        assert!(detector.active_levels().is_empty());
    }

    #[test]
    fn test_revisit_completes_and_untracks() {
        let mut detector = UnfinishedBusinessDetector::new(5, 50);
        detector.detect(&bar(&[(5000.0, 10, 30), (5000.25, 20, 2)]));

        // Later bar trades back through 5000.25
        let revisits = detector.check_revisit(&bar(&[(5000.25, 15, 15), (5000.5, 10, 10)]));
        assert_eq!(revisits.len(), 1);
        assert_eq!(revisits[0].pattern, SignalPattern::UnfinishedRevisited);
        assert!((revisits[0].strength - 0.5).abs() < 1e-9);
        assert_eq!(revisits[0].price, 5000.25);
        assert!(detector.active_levels().is_empty());

        // Second pass through the same range emits nothing
        let again = detector.check_revisit(&bar(&[(5000.25, 15, 15), (5000.5, 10, 10)]));
        assert!(again.is_empty());
    }

    #[test]
    fn test_tracked_levels_are_bounded() {
        let mut detector = UnfinishedBusinessDetector::new(5, 3);
        for i in 0..5 {
            let price = 5000.0 + i as f64;
            detector.detect(&bar(&[(price - 0.25, 10, 30), (price, 20, 0)]));
        }
        assert_eq!(detector.active_levels().len(), 3);
    }
}
