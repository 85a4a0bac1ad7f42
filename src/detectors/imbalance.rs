//! Diagonal volume imbalance detection.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

/// Flags price levels where one side is aggressively dominant against the
/// adjacent diagonal level.
///
/// Buy imbalance compares ask volume at a price against bid volume one
/// tick below; sell imbalance compares bid volume against ask volume one
/// tick above.
pub struct ImbalanceDetector {
    threshold: f64,
    min_volume: u32,
}

impl ImbalanceDetector {
    pub fn new(threshold: f64, min_volume: u32) -> Self {
        Self {
            threshold,
            min_volume,
        }
    }

    pub fn detect(&self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let levels = bar.sorted_levels();
        if levels.len() < 2 {
            return signals;
        }

        for i in 1..levels.len() {
            let current = levels[i];
            let below = levels[i - 1];

            // Aggressive buying lifting offers against the bid one tick down
            if below.bid_volume > 0 && current.ask_volume >= self.min_volume {
                let ratio = current.ask_volume as f64 / below.bid_volume as f64;
                if ratio >= self.threshold {
                    signals.push(Signal::new(
                        bar.end,
                        &bar.symbol,
                        SignalPattern::BuyImbalance,
                        Direction::Long,
                        (ratio / 10.0).min(1.0),
                        current.price,
                        SignalDetails::Imbalance {
                            ratio,
                            dominant_volume: current.ask_volume,
                            opposing_volume: below.bid_volume,
                            opposing_price: below.price,
                        },
                    ));
                }
            }

            // Aggressive selling hitting bids against the ask one tick up
            if i < levels.len() - 1 {
                let above = levels[i + 1];
                if above.ask_volume > 0 && current.bid_volume >= self.min_volume {
                    let ratio = current.bid_volume as f64 / above.ask_volume as f64;
                    if ratio >= self.threshold {
                        signals.push(Signal::new(
                            bar.end,
                            &bar.symbol,
                            SignalPattern::SellImbalance,
                            Direction::Short,
                            (ratio / 10.0).min(1.0),
                            current.price,
                            SignalDetails::Imbalance {
                                ratio,
                                dominant_volume: current.bid_volume,
                                opposing_volume: above.ask_volume,
                                opposing_price: above.price,
                            },
                        ));
                    }
                }
            }
        }

        signals
    }

    /// Group same-direction imbalances at consecutive tick prices. Stacks
    /// of `min_stack` or more emit a stacked signal priced at the top of a
    /// buy stack or the bottom of a sell stack.
    pub fn detect_stacked(&self, bar: &FootprintBar, min_stack: usize) -> Vec<Signal> {
        let imbalances = self.detect(bar);
        let mut signals = Vec::new();

        for direction in [Direction::Long, Direction::Short] {
            let mut hits: Vec<&Signal> = imbalances
                .iter()
                .filter(|s| s.direction == direction)
                .collect();
            hits.sort_by(|a, b| a.price.total_cmp(&b.price));

            for stack in find_stacks(&hits, bar.tick_size) {
                if stack.len() < min_stack {
                    continue;
                }
                let bottom = stack[0].price;
                let top = stack[stack.len() - 1].price;
                let (pattern, price) = match direction {
                    Direction::Long => (SignalPattern::StackedBuyImbalance, top),
                    Direction::Short => (SignalPattern::StackedSellImbalance, bottom),
                };
                signals.push(Signal::new(
                    bar.end,
                    &bar.symbol,
                    pattern,
                    direction,
                    (stack.len() as f64 / 5.0).min(1.0),
                    price,
                    SignalDetails::StackedImbalance {
                        stack_size: stack.len(),
                        bottom_price: bottom,
                        top_price: top,
                    },
                ));
            }
        }

        signals
    }
}

/// Split price-sorted signals into runs at consecutive tick increments.
fn find_stacks<'a>(signals: &[&'a Signal], tick_size: f64) -> Vec<Vec<&'a Signal>> {
    let mut stacks = Vec::new();
    let mut current: Vec<&Signal> = Vec::new();

    for signal in signals {
        match current.last() {
            Some(prev) if (signal.price - prev.price - tick_size).abs() < 0.001 => {
                current.push(signal);
            }
            Some(_) => {
                if current.len() > 1 {
                    stacks.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(signal);
            }
            None => current.push(signal),
        }
    }
    if current.len() > 1 {
        stacks.push(current);
    }
    stacks
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
            close: high,
            tick_size: 0.25,
            levels: map,
        }
    }

    #[test]
    fn test_buy_imbalance_ratio_and_strength() {
        // 150 ask against 30 bid below: ratio 5.0, strength 0.5
        let detector = ImbalanceDetector::new(3.0, 10);
        let signals = detector.detect(&bar(&[(5000.0, 30, 10), (5000.25, 5, 150)]));

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.pattern, SignalPattern::BuyImbalance);
        assert_eq!(s.direction, Direction::Long);
        assert_eq!(s.price, 5000.25);
        assert!((s.strength - 0.5).abs() < 1e-9);
        match &s.details {
            SignalDetails::Imbalance { ratio, .. } => assert!((ratio - 5.0).abs() < 1e-9),
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_below_threshold_is_silent() {
        let detector = ImbalanceDetector::new(3.0, 10);
        // Ratio 2.0, under the 3.0 threshold
        let signals = detector.detect(&bar(&[(5000.0, 50, 10), (5000.25, 5, 100)]));
        assert!(signals.is_empty());
    }

    #[test]
    fn test_min_volume_gate() {
        let detector = ImbalanceDetector::new(3.0, 10);
        // Ratio 8.0 but only 8 contracts on the dominant side
        let signals = detector.detect(&bar(&[(5000.0, 1, 0), (5000.25, 0, 8)]));
        assert!(signals.is_empty());
    }

    #[test]
    fn test_sell_imbalance_against_level_above() {
        let detector = ImbalanceDetector::new(3.0, 10);
        let signals = detector.detect(&bar(&[
            (5000.0, 5, 30),
            (5000.25, 90, 2),
            (5000.50, 3, 20),
        ]));
        let sells: Vec<_> = signals
            .iter()
            .filter(|s| s.pattern == SignalPattern::SellImbalance)
            .collect();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].price, 5000.25);
        assert_eq!(sells[0].direction, Direction::Short);
    }

    #[test]
    fn test_stacked_buy_imbalance_at_top_of_stack() {
        let detector = ImbalanceDetector::new(3.0, 10);
        // Three consecutive buy imbalances
        let signals = detector.detect_stacked(
            &bar(&[
                (5000.00, 10, 5),
                (5000.25, 10, 40),
                (5000.50, 10, 40),
                (5000.75, 2, 40),
            ]),
            3,
        );
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.pattern, SignalPattern::StackedBuyImbalance);
        assert_eq!(s.price, 5000.75);
        assert!((s.strength - 0.6).abs() < 1e-9);
        match &s.details {
            SignalDetails::StackedImbalance {
                stack_size,
                bottom_price,
                top_price,
            } => {
                assert_eq!(*stack_size, 3);
                assert_eq!(*bottom_price, 5000.25);
                assert_eq!(*top_price, 5000.75);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_two_hits_do_not_stack() {
        let detector = ImbalanceDetector::new(3.0, 10);
        let signals = detector.detect_stacked(
            &bar(&[(5000.00, 10, 5), (5000.25, 10, 40), (5000.50, 2, 40)]),
            3,
        );
        assert!(signals.is_empty());
    }
}
