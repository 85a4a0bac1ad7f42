//! Weighted-score market regime classification.

use chrono::{DateTime, Utc};

use crate::config::RegimeConfig;
use crate::regime::inputs::RegimeInputs;
use crate::types::Regime;

const ADX_TREND: f64 = 25.0;
const ADX_WEAK: f64 = 20.0;
const ATR_HIGH_PCT: f64 = 70.0;
const ATR_EXTREME_PCT: f64 = 85.0;
const MAX_HISTORY: usize = 100;

/// Scores each candidate regime from the inputs and keeps the winner,
/// with a confidence derived from the margin over the runner-up.
///
/// Session edges, news windows, and dead volume override scoring and
/// force NoTrade outright.
pub struct RegimeClassifier {
    config: RegimeConfig,
    current: Regime,
    confidence: f64,
    bars_in_regime: u32,
    history: Vec<(DateTime<Utc>, Regime, f64)>,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            current: Regime::NoTrade,
            confidence: 0.0,
            bars_in_regime: 0,
            history: Vec::new(),
        }
    }

    pub fn classify(&mut self, inputs: &RegimeInputs, now: DateTime<Utc>) -> (Regime, f64) {
        if self.should_not_trade(inputs) {
            return self.update(Regime::NoTrade, 1.0, now);
        }

        let mut scores = [
            (Regime::TrendingUp, score_trending_up(inputs)),
            (Regime::TrendingDown, score_trending_down(inputs)),
            (Regime::Ranging, score_ranging(inputs)),
            (Regime::Volatile, score_volatile(inputs)),
        ];
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (winner, winner_score) = scores[0];
        let runner_up = scores[1].1;

        if winner_score == 0.0 {
            return self.update(Regime::NoTrade, 0.5, now);
        }
        if winner_score < self.config.min_regime_score {
            return self.update(Regime::Volatile, 0.5, now);
        }

        let margin = (winner_score - runner_up) / winner_score;
        let confidence = (0.5 + margin * 0.5).min(1.0);
        self.update(winner, confidence, now)
    }

    fn should_not_trade(&self, inputs: &RegimeInputs) -> bool {
        inputs.minutes_to_close < self.config.close_quiet_minutes
            || inputs.is_news_window
            || inputs.minutes_since_open < self.config.open_quiet_minutes
            || inputs.volume_vs_average < self.config.min_volume_ratio
    }

    fn update(&mut self, regime: Regime, confidence: f64, now: DateTime<Utc>) -> (Regime, f64) {
        if regime != self.current {
            self.bars_in_regime = 1;
        } else {
            self.bars_in_regime += 1;
        }

        // Record regime flips and large confidence swings only
        let worth_recording = match self.history.last() {
            None => true,
            Some((_, last_regime, last_conf)) => {
                *last_regime != regime || (last_conf - confidence).abs() > 0.2
            }
        };
        if worth_recording {
            self.history.push((now, regime, confidence));
            if self.history.len() > MAX_HISTORY {
                let excess = self.history.len() - MAX_HISTORY;
                self.history.drain(..excess);
            }
        }

        self.current = regime;
        self.confidence = confidence;
        (regime, confidence)
    }

    pub fn current_regime(&self) -> (Regime, f64) {
        (self.current, self.confidence)
    }

    /// Bars the current regime has persisted.
    pub fn regime_duration(&self) -> u32 {
        self.bars_in_regime
    }

    pub fn recent_history(&self, count: usize) -> &[(DateTime<Utc>, Regime, f64)] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn reset(&mut self) {
        self.current = Regime::NoTrade;
        self.confidence = 0.0;
        self.bars_in_regime = 0;
        self.history.clear();
    }
}

fn score_trending_up(inputs: &RegimeInputs) -> f64 {
    let mut score = 0.0;

    if inputs.adx_14 > ADX_TREND {
        score += 2.0;
    } else if inputs.adx_14 > ADX_WEAK {
        score += 1.0;
    }
    if inputs.ema_trend > 0.0 {
        score += 1.5;
    }
    if inputs.price_vs_vwap > 0.0 {
        score += 1.0;
    }
    if inputs.higher_highs && inputs.higher_lows {
        score += 2.0;
    } else if inputs.higher_lows {
        score += 1.0;
    }
    if inputs.cumulative_delta > 0 && inputs.delta_slope > 0.0 {
        score += 1.5;
    } else if inputs.cumulative_delta > 0 {
        score += 0.5;
    }
    if inputs.adx_slope > 0.0 {
        score += 0.5;
    }

    score
}

fn score_trending_down(inputs: &RegimeInputs) -> f64 {
    let mut score = 0.0;

    if inputs.adx_14 > ADX_TREND {
        score += 2.0;
    } else if inputs.adx_14 > ADX_WEAK {
        score += 1.0;
    }
    if inputs.ema_trend < 0.0 {
        score += 1.5;
    }
    if inputs.price_vs_vwap < 0.0 {
        score += 1.0;
    }
    if inputs.lower_highs && inputs.lower_lows {
        score += 2.0;
    } else if inputs.lower_highs {
        score += 1.0;
    }
    if inputs.cumulative_delta < 0 && inputs.delta_slope < 0.0 {
        score += 1.5;
    } else if inputs.cumulative_delta < 0 {
        score += 0.5;
    }
    if inputs.adx_slope > 0.0 {
        score += 0.5;
    }

    score
}

fn score_ranging(inputs: &RegimeInputs) -> f64 {
    let mut score = 0.0;

    if inputs.adx_14 < ADX_WEAK {
        score += 2.0;
    } else if inputs.adx_14 < ADX_TREND {
        score += 1.0;
    }
    if inputs.price_vs_vwap.abs() < 0.5 {
        score += 1.0;
    }
    if !(inputs.higher_highs || inputs.lower_lows) {
        score += 1.5;
    }
    if inputs.range_bound_bars >= 3 {
        score += 2.0;
    } else if inputs.range_bound_bars >= 2 {
        score += 1.0;
    }
    if inputs.cumulative_delta.abs() < 500 {
        score += 1.0;
    }
    if inputs.atr_percentile < 50.0 {
        score += 1.0;
    }

    score
}

fn score_volatile(inputs: &RegimeInputs) -> f64 {
    let mut score = 0.0;

    if inputs.atr_percentile > ATR_EXTREME_PCT {
        score += 2.5;
    } else if inputs.atr_percentile > ATR_HIGH_PCT {
        score += 1.5;
    }
    if inputs.bar_range_avg > inputs.atr_14 * 1.5 {
        score += 1.5;
    }
    if inputs.volume_vs_average > 2.0 {
        score += 1.0;
    }
    if (ADX_WEAK..=ADX_TREND).contains(&inputs.adx_14) && inputs.adx_slope < 0.0 {
        score += 1.0;
    }
    if inputs.delta_slope.abs() > 100.0 {
        score += 1.0;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tradeable_inputs() -> RegimeInputs {
        RegimeInputs {
            minutes_since_open: 60,
            minutes_to_close: 300,
            volume_vs_average: 1.0,
            ..Default::default()
        }
    }

    fn trending_up_inputs() -> RegimeInputs {
        RegimeInputs {
            adx_14: 30.0,
            adx_slope: 1.0,
            ema_trend: 2.0,
            price_vs_vwap: 3.0,
            higher_highs: true,
            higher_lows: true,
            cumulative_delta: 1200,
            delta_slope: 50.0,
            ..tradeable_inputs()
        }
    }

    #[test]
    fn test_strong_uptrend_classifies_trending_up() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let (regime, confidence) = classifier.classify(&trending_up_inputs(), Utc::now());
        assert_eq!(regime, Regime::TrendingUp);
        assert!(confidence > 0.7);
    }

    #[test]
    fn test_confidence_from_margin() {
        // Up score: 2 + 1.5 + 1 + 2 + 1.5 + 0.5 = 8.5
        // Down score: 2 (adx) + 0.5 (adx slope) = 2.5
        // Margin uses the runner-up, whichever candidate that is
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let inputs = trending_up_inputs();
        let up = score_trending_up(&inputs);
        let others = [
            score_trending_down(&inputs),
            score_ranging(&inputs),
            score_volatile(&inputs),
        ];
        let runner_up = others.iter().copied().fold(f64::MIN, f64::max);
        let expected = (0.5 + (up - runner_up) / up * 0.5).min(1.0);

        let (_, confidence) = classifier.classify(&inputs, Utc::now());
        assert!((confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_session_open_override() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let inputs = RegimeInputs {
            minutes_since_open: 2,
            ..trending_up_inputs()
        };
        let (regime, confidence) = classifier.classify(&inputs, Utc::now());
        assert_eq!(regime, Regime::NoTrade);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn test_session_close_override() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let inputs = RegimeInputs {
            minutes_to_close: 10,
            ..trending_up_inputs()
        };
        let (regime, _) = classifier.classify(&inputs, Utc::now());
        assert_eq!(regime, Regime::NoTrade);
    }

    #[test]
    fn test_dead_volume_override() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let inputs = RegimeInputs {
            volume_vs_average: 0.2,
            ..trending_up_inputs()
        };
        let (regime, _) = classifier.classify(&inputs, Utc::now());
        assert_eq!(regime, Regime::NoTrade);
    }

    #[test]
    fn test_news_window_override() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let inputs = RegimeInputs {
            is_news_window: true,
            ..trending_up_inputs()
        };
        let (regime, _) = classifier.classify(&inputs, Utc::now());
        assert_eq!(regime, Regime::NoTrade);
    }

    #[test]
    fn test_weak_winner_defaults_to_volatile() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        // Faint uptrend lean (3.0) with every other candidate lower still
        let inputs = RegimeInputs {
            ema_trend: 0.5,
            price_vs_vwap: 1.0,
            higher_highs: true,
            cumulative_delta: 600,
            atr_percentile: 60.0,
            ..tradeable_inputs()
        };
        let (regime, confidence) = classifier.classify(&inputs, Utc::now());
        assert_eq!(regime, Regime::Volatile);
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn test_regime_duration_counts_bars() {
        let mut classifier = RegimeClassifier::new(RegimeConfig::default());
        let inputs = trending_up_inputs();
        classifier.classify(&inputs, Utc::now());
        classifier.classify(&inputs, Utc::now());
        classifier.classify(&inputs, Utc::now());
        assert_eq!(classifier.regime_duration(), 3);

        classifier.classify(&RegimeInputs { is_news_window: true, ..inputs }, Utc::now());
        assert_eq!(classifier.regime_duration(), 1);
    }
}
