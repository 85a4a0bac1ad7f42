//! Absorption detection: passive orders soaking up aggression at extremes.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

const EXTREME_LEVELS: usize = 3;

/// Detects aggressive volume at a bar extreme that failed to move price.
///
/// Selling absorption: heavy buying into the high with the close rejected
/// into the lower half of the bar. Buying absorption mirrors it at the low.
pub struct AbsorptionDetector {
    min_volume: u32,
    dominance: f64,
}

impl AbsorptionDetector {
    pub fn new(min_volume: u32, dominance: f64) -> Self {
        Self {
            min_volume,
            dominance,
        }
    }

    pub fn detect(&self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let levels = bar.sorted_levels();
        if levels.len() < EXTREME_LEVELS || bar.range() == 0.0 {
            return signals;
        }

        let close_position = (bar.close - bar.low) / bar.range();

        // Buyers absorbed at the high: ask-dominant top, close in lower half
        let top = &levels[levels.len() - EXTREME_LEVELS..];
        let ask: u32 = top.iter().map(|l| l.ask_volume).sum();
        let bid: u32 = top.iter().map(|l| l.bid_volume).sum();
        let total = ask + bid;
        if total >= self.min_volume
            && ask as f64 >= total as f64 * self.dominance
            && close_position <= 0.5
        {
            let strength =
                ((1.0 - close_position) * (ask as f64 / self.min_volume as f64) / 2.0).min(1.0);
            signals.push(Signal::new(
                bar.end,
                &bar.symbol,
                SignalPattern::SellingAbsorption,
                Direction::Short,
                strength,
                bar.high,
                SignalDetails::Absorption {
                    dominant_volume: ask,
                    opposing_volume: bid,
                    total_volume: total,
                    close_position,
                },
            ));
        }

        // Sellers absorbed at the low: bid-dominant bottom, close in upper half
        let bottom = &levels[..EXTREME_LEVELS];
        let ask: u32 = bottom.iter().map(|l| l.ask_volume).sum();
        let bid: u32 = bottom.iter().map(|l| l.bid_volume).sum();
        let total = ask + bid;
        if total >= self.min_volume
            && bid as f64 >= total as f64 * self.dominance
            && close_position >= 0.5
        {
            let strength =
                (close_position * (bid as f64 / self.min_volume as f64) / 2.0).min(1.0);
            signals.push(Signal::new(
                bar.end,
                &bar.symbol,
                SignalPattern::BuyingAbsorption,
                Direction::Long,
                strength,
                bar.low,
                SignalDetails::Absorption {
                    dominant_volume: bid,
                    opposing_volume: ask,
                    total_volume: total,
                    close_position,
                },
            ));
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceLevel;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn bar(close: f64, levels: &[(f64, u32, u32)]) -> FootprintBar {
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
            close,
            tick_size: 0.25,
            levels: map,
        }
    }

    #[test]
    fn test_selling_absorption_at_high() {
        // Heavy buying into the top three levels, close back at the low
        let detector = AbsorptionDetector::new(100, 0.60);
        let signals = detector.detect(&bar(
            5000.0,
            &[
                (5000.00, 10, 5),
                (5000.25, 10, 40),
                (5000.50, 5, 50),
                (5000.75, 5, 45),
            ],
        ));
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.pattern, SignalPattern::SellingAbsorption);
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.price, 5000.75);
        match &s.details {
            SignalDetails::Absorption {
                dominant_volume,
                opposing_volume,
                close_position,
                ..
            } => {
                assert_eq!(*dominant_volume, 135);
                assert_eq!(*opposing_volume, 20);
                assert_eq!(*close_position, 0.0);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_no_rejection_no_absorption() {
        // Same footprint but close at the high: buyers were not absorbed
        let detector = AbsorptionDetector::new(100, 0.60);
        let signals = detector.detect(&bar(
            5000.75,
            &[
                (5000.00, 10, 5),
                (5000.25, 10, 40),
                (5000.50, 5, 50),
                (5000.75, 5, 45),
            ],
        ));
        assert!(signals.is_empty());
    }

    #[test]
    fn test_buying_absorption_at_low() {
        let detector = AbsorptionDetector::new(100, 0.60);
        let signals = detector.detect(&bar(
            5000.75,
            &[
                (5000.00, 45, 5),
                (5000.25, 50, 5),
                (5000.50, 40, 10),
                (5000.75, 5, 10),
            ],
        ));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].pattern, SignalPattern::BuyingAbsorption);
        assert_eq!(signals[0].direction, Direction::Long);
        assert_eq!(signals[0].price, 5000.0);
    }

    #[test]
    fn test_volume_floor() {
        let detector = AbsorptionDetector::new(100, 0.60);
        let signals = detector.detect(&bar(
            5000.0,
            &[(5000.00, 2, 1), (5000.25, 1, 8), (5000.50, 1, 10)],
        ));
        assert!(signals.is_empty());
    }
}
