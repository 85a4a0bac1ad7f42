//! Routes detector signals through the current regime.

use serde::Serialize;
use tracing::debug;

use crate::config::RegimeConfig;
use crate::regime::classifier::RegimeClassifier;
use crate::regime::inputs::RegimeInputsCalculator;
use crate::types::{Direction, FootprintBar, Regime, Signal, SignalPattern};

/// Per-regime trading policy.
#[derive(Debug, Clone, Copy)]
pub struct RegimePolicy {
    pub enabled: &'static [SignalPattern],
    pub disabled: &'static [SignalPattern],
    pub bias: Option<Direction>,
    pub size_multiplier: f64,
}

/// Static policy table, exhaustive over regimes.
pub fn regime_policy(regime: Regime) -> RegimePolicy {
    use SignalPattern::*;
    match regime {
        Regime::TrendingUp => RegimePolicy {
            enabled: &[
                StackedBuyImbalance,
                BuyingAbsorption,
                SellingExhaustion,
                BullishDeltaDivergence,
                BuyImbalance,
            ],
            disabled: &[SellImbalance, StackedSellImbalance, BearishDeltaDivergence],
            bias: Some(Direction::Long),
            size_multiplier: 1.0,
        },
        Regime::TrendingDown => RegimePolicy {
            enabled: &[
                StackedSellImbalance,
                SellingAbsorption,
                BuyingExhaustion,
                BearishDeltaDivergence,
                SellImbalance,
            ],
            disabled: &[BuyImbalance, StackedBuyImbalance, BullishDeltaDivergence],
            bias: Some(Direction::Short),
            size_multiplier: 1.0,
        },
        Regime::Ranging => RegimePolicy {
            enabled: &[
                BuyingExhaustion,
                SellingExhaustion,
                BuyingAbsorption,
                SellingAbsorption,
                UnfinishedHigh,
                UnfinishedLow,
            ],
            disabled: &[StackedBuyImbalance, StackedSellImbalance],
            bias: None,
            size_multiplier: 0.75,
        },
        Regime::Volatile => RegimePolicy {
            enabled: &[StackedBuyImbalance, StackedSellImbalance],
            disabled: &[
                BuyImbalance,
                SellImbalance,
                BuyingExhaustion,
                SellingExhaustion,
            ],
            bias: None,
            size_multiplier: 0.5,
        },
        Regime::NoTrade => RegimePolicy {
            enabled: &[],
            disabled: &[],
            bias: None,
            size_multiplier: 0.0,
        },
    }
}

/// Router state snapshot for logging and the heartbeat.
#[derive(Debug, Clone, Serialize)]
pub struct RouterState {
    pub regime: Regime,
    pub confidence: f64,
    pub regime_duration: u32,
    pub size_multiplier: f64,
    pub signals_evaluated: u64,
    pub signals_approved: u64,
    pub signals_rejected: u64,
}

/// Updates the regime on each bar close and annotates signals with an
/// approve/reject decision.
pub struct StrategyRouter {
    config: RegimeConfig,
    classifier: RegimeClassifier,
    inputs: RegimeInputsCalculator,
    regime: Regime,
    confidence: f64,
    evaluated: u64,
    approved: u64,
    rejected: u64,
}

impl StrategyRouter {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            classifier: RegimeClassifier::new(config.clone()),
            inputs: RegimeInputsCalculator::new(config.clone()),
            config,
            regime: Regime::NoTrade,
            confidence: 0.0,
            evaluated: 0,
            approved: 0,
            rejected: 0,
        }
    }

    /// Reclassify the regime from a completed bar.
    pub fn on_bar(&mut self, bar: &FootprintBar) {
        self.inputs.add_bar(bar);
        let inputs = self.inputs.calculate();
        let (regime, confidence) = self.classifier.classify(&inputs, bar.end);
        if regime != self.regime {
            debug!(
                from = %self.regime,
                to = %regime,
                confidence = format!("{confidence:.2}").as_str(),
                "regime change"
            );
        }
        self.regime = regime;
        self.confidence = confidence;
    }

    /// Annotate a signal with the routing decision. Rejections set
    /// `approved = false` and a reason; they are never errors.
    pub fn evaluate(&mut self, mut signal: Signal) -> Signal {
        self.evaluated += 1;
        signal.regime = Some(self.regime);
        signal.regime_confidence = self.confidence;

        let policy = regime_policy(self.regime);

        if self.regime == Regime::NoTrade {
            return self.reject(signal, "no trading in NO_TRADE regime".to_string());
        }
        if policy.disabled.contains(&signal.pattern) {
            return self.reject(signal, format!("pattern disabled in {}", self.regime));
        }
        if !policy.enabled.is_empty() && !policy.enabled.contains(&signal.pattern) {
            return self.reject(signal, format!("pattern not enabled for {}", self.regime));
        }
        if let Some(bias) = policy.bias {
            if signal.direction != bias {
                let reason =
                    format!("direction {} conflicts with {} bias", signal.direction, bias);
                return self.reject(signal, reason);
            }
        }
        if signal.strength < self.config.min_signal_strength {
            let reason = format!(
                "strength {:.2} below minimum {:.2}",
                signal.strength, self.config.min_signal_strength
            );
            return self.reject(signal, reason);
        }
        if self.confidence < self.config.min_regime_confidence {
            return self.reject(
                signal,
                format!("regime confidence {:.2} below minimum", self.confidence),
            );
        }

        signal.approved = true;
        self.approved += 1;
        signal
    }

    fn reject(&mut self, mut signal: Signal, reason: String) -> Signal {
        debug!(pattern = %signal.pattern, reason = reason.as_str(), "signal rejected");
        signal.approved = false;
        signal.rejection_reason = Some(reason);
        self.rejected += 1;
        signal
    }

    pub fn current_regime(&self) -> (Regime, f64) {
        (self.regime, self.confidence)
    }

    pub fn size_multiplier(&self) -> f64 {
        regime_policy(self.regime).size_multiplier
    }

    pub fn bias(&self) -> Option<Direction> {
        regime_policy(self.regime).bias
    }

    pub fn state(&self) -> RouterState {
        RouterState {
            regime: self.regime,
            confidence: self.confidence,
            regime_duration: self.classifier.regime_duration(),
            size_multiplier: self.size_multiplier(),
            signals_evaluated: self.evaluated,
            signals_approved: self.approved,
            signals_rejected: self.rejected,
        }
    }

    pub fn reset(&mut self) {
        self.classifier.reset();
        self.inputs.reset();
        self.regime = Regime::NoTrade;
        self.confidence = 0.0;
        self.evaluated = 0;
        self.approved = 0;
        self.rejected = 0;
    }

    #[cfg(test)]
    pub fn force_regime(&mut self, regime: Regime, confidence: f64) {
        self.regime = regime;
        self.confidence = confidence;
    }
}
