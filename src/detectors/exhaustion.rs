//! Exhaustion detection at bar extremes.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

struct ExhaustionResult {
    consecutive_declines: usize,
    decline_percentage: f64,
    volumes: Vec<u32>,
}

/// Detects progressively declining aggressor volume into a bar extreme.
///
/// Buying exhaustion: ask volume fading as price pushes into the high,
/// a short setup. Selling exhaustion mirrors it at the low.
pub struct ExhaustionDetector {
    min_levels: usize,
    min_decline_pct: f64,
}

impl ExhaustionDetector {
    pub fn new(min_levels: usize, min_decline_pct: f64) -> Self {
        Self {
            min_levels,
            min_decline_pct,
        }
    }

    pub fn detect(&self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let levels = bar.sorted_levels();
        if levels.len() < self.min_levels {
            return signals;
        }

        let window = self.min_levels + 2;

        // Ask volume walking up into the high
        let top_start = levels.len().saturating_sub(window);
        let top_volumes: Vec<u32> = levels[top_start..].iter().map(|l| l.ask_volume).collect();
        if let Some(result) = self.check_declines(&top_volumes) {
            signals.push(self.signal(
                bar,
                SignalPattern::BuyingExhaustion,
                Direction::Short,
                bar.high,
                result,
            ));
        }

        // Bid volume walking down into the low
        let bottom_volumes: Vec<u32> = levels
            .iter()
            .take(window)
            .rev()
            .map(|l| l.bid_volume)
            .collect();
        if let Some(result) = self.check_declines(&bottom_volumes) {
            signals.push(self.signal(
                bar,
                SignalPattern::SellingExhaustion,
                Direction::Long,
                bar.low,
                result,
            ));
        }

        signals
    }

    /// Count consecutive declines from the start of the window toward the
    /// extreme; the run must span the window and shed at least
    /// `min_decline_pct` of the starting volume.
    fn check_declines(&self, volumes: &[u32]) -> Option<ExhaustionResult> {
        if volumes.len() < self.min_levels {
            return None;
        }

        let mut declines = 0;
        for i in 1..volumes.len() {
            if volumes[i] < volumes[i - 1] {
                declines += 1;
            } else {
                break;
            }
        }

        if declines < self.min_levels - 1 || volumes[0] == 0 {
            return None;
        }

        let decline_pct = (volumes[0] - volumes[declines]) as f64 / volumes[0] as f64;
        if decline_pct < self.min_decline_pct {
            return None;
        }

        Some(ExhaustionResult {
            consecutive_declines: declines,
            decline_percentage: decline_pct,
            volumes: volumes[..=declines].to_vec(),
        })
    }

    fn signal(
        &self,
        bar: &FootprintBar,
        pattern: SignalPattern,
        direction: Direction,
        price: f64,
        result: ExhaustionResult,
    ) -> Signal {
        Signal::new(
            bar.end,
            &bar.symbol,
            pattern,
            direction,
            result.decline_percentage.min(1.0),
            price,
            SignalDetails::Exhaustion {
                consecutive_declines: result.consecutive_declines,
                decline_percentage: result.decline_percentage,
                volumes: result.volumes,
            },
        )
    }
}
