//! Price/delta divergence detection across recent bars.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

const DIVERGENCE_STRENGTH: f64 = 0.7;

/// Detects bars where price prints a new extreme that delta fails to
/// confirm.
///
/// Bearish: a higher high in price while delta peaks are declining and
/// the current delta is negative. Bullish is the mirror with lows,
/// troughs, and positive delta.
pub struct DeltaDivergenceDetector {
    lookback: usize,
    history: Vec<FootprintBar>,
}

impl DeltaDivergenceDetector {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            history: Vec::new(),
        }
    }

    pub fn add_bar(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        self.history.push(bar.clone());
        if self.history.len() > self.lookback * 2 {
            let excess = self.history.len() - self.lookback * 2;
            self.history.drain(..excess);
        }
        if self.history.len() < self.lookback {
            return Vec::new();
        }
        self.detect()
    }

    fn detect(&self) -> Vec<Signal> {
        let mut signals = Vec::new();
        let recent = &self.history[self.history.len() - self.lookback..];

        let highs: Vec<f64> = recent.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = recent.iter().map(|b| b.low).collect();
        let deltas: Vec<i64> = recent.iter().map(|b| b.delta()).collect();
        let current = &recent[recent.len() - 1];
        let current_delta = deltas[deltas.len() - 1];

        if is_higher_high(&highs) && peaks_declining(&deltas) && current_delta < 0 {
            signals.push(Signal::new(
                current.end,
                &current.symbol,
                SignalPattern::BearishDeltaDivergence,
                Direction::Short,
                DIVERGENCE_STRENGTH,
                current.close,
                SignalDetails::Divergence {
                    extreme_price: highs.iter().copied().fold(f64::MIN, f64::max),
                    current_delta,
                    deltas: deltas.clone(),
                },
            ));
        }

        if is_lower_low(&lows) && troughs_rising(&deltas) && current_delta > 0 {
            signals.push(Signal::new(
                current.end,
                &current.symbol,
                SignalPattern::BullishDeltaDivergence,
                Direction::Long,
                DIVERGENCE_STRENGTH,
                current.close,
                SignalDetails::Divergence {
                    extreme_price: lows.iter().copied().fold(f64::MAX, f64::min),
                    current_delta,
                    deltas,
                },
            ));
        }

        signals
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

fn is_higher_high(values: &[f64]) -> bool {
    if values.len() < 3 {
        return false;
    }
    let last = values[values.len() - 1];
    values[..values.len() - 1].iter().all(|v| last > *v)
}

fn is_lower_low(values: &[f64]) -> bool {
    if values.len() < 3 {
        return false;
    }
    let last = values[values.len() - 1];
    values[..values.len() - 1].iter().all(|v| last < *v)
}

fn peaks_declining(values: &[i64]) -> bool {
    let peaks = local_extrema(values, |a, b| a > b);
    peaks.len() >= 2 && peaks[peaks.len() - 1] < peaks[peaks.len() - 2]
}

fn troughs_rising(values: &[i64]) -> bool {
    let troughs = local_extrema(values, |a, b| a < b);
    troughs.len() >= 2 && troughs[troughs.len() - 1] > troughs[troughs.len() - 2]
}

/// Local extrema by strict comparison against both neighbors; the trailing
/// element counts when it extends past its predecessor.
fn local_extrema(values: &[i64], wins: impl Fn(i64, i64) -> bool) -> Vec<i64> {
    let mut out = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        if wins(values[i], values[i - 1]) && wins(values[i], values[i + 1]) {
            out.push(values[i]);
        }
    }
    if values.len() >= 2 && wins(values[values.len() - 1], values[values.len() - 2]) {
        out.push(values[values.len() - 1]);
    }
    out
}
