//! Per-symbol pipeline wiring ticks to execution.
//!
//! Per-tick ordering matters: open positions are checked against the
//! tick before it is aggregated, so a bar whose last tick touches a
//! stop exits on that tick rather than a bar later. Detectors, regime
//! classification, and routing run only on completed bars.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregation::{BarAggregator, CumulativeDelta, VolumeProfile};
use crate::config::{EngineConfig, TradingMode};
use crate::detectors::{
    AbsorptionDetector, DeltaDivergenceDetector, ExhaustionDetector, ImbalanceDetector,
    UnfinishedBusinessDetector,
};
use crate::execution::{ExecutionManager, SessionConfig, Trade};
use crate::execution::tier::TierManager;
use crate::instruments::{instrument_spec, symbol_profile};
use crate::persistence::SessionStore;
use crate::regime::StrategyRouter;
use crate::types::{FootprintBar, Signal, Tick};

/// Periodic status snapshot for operator logging.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub symbol: String,
    pub mode: TradingMode,
    pub tick_count: u64,
    pub bar_count: usize,
    pub signal_count: u64,
    pub cumulative_delta: i64,
    pub poc: Option<f64>,
    pub daily_pnl: f64,
    pub open_positions: usize,
    pub is_halted: bool,
    pub tier_name: &'static str,
    pub balance: f64,
}

pub struct Engine {
    config: EngineConfig,
    aggregator: BarAggregator,
    cumulative_delta: CumulativeDelta,
    volume_profile: VolumeProfile,

    imbalance: ImbalanceDetector,
    exhaustion: ExhaustionDetector,
    absorption: AbsorptionDetector,
    divergence: DeltaDivergenceDetector,
    unfinished: UnfinishedBusinessDetector,

    router: StrategyRouter,
    execution: ExecutionManager,

    tick_count: u64,
    signal_count: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let spec = instrument_spec(&config.symbol);
        let profile = symbol_profile(&config.symbol);
        let session = SessionConfig::for_symbol(&config.symbol, config.mode);
        let store = SessionStore::new(&config.state_dir)?;
        let tier = TierManager::new(config.starting_balance);

        let d = &config.detectors;
        Ok(Self {
            aggregator: BarAggregator::new(&config.symbol, config.timeframe_secs, spec.tick_size),
            cumulative_delta: CumulativeDelta::new(),
            volume_profile: VolumeProfile::new(),
            imbalance: ImbalanceDetector::new(d.imbalance_ratio, profile.imbalance_min_volume),
            exhaustion: ExhaustionDetector::new(d.exhaustion_levels, d.exhaustion_decline_pct),
            absorption: AbsorptionDetector::new(
                profile.absorption_min_volume,
                d.absorption_dominance,
            ),
            divergence: DeltaDivergenceDetector::new(d.divergence_lookback),
            unfinished: UnfinishedBusinessDetector::new(
                d.unfinished_threshold,
                d.max_tracked_levels,
            ),
            router: StrategyRouter::new(config.regime.clone()),
            execution: ExecutionManager::new(session, tier, store),
            config,
            tick_count: 0,
            signal_count: 0,
        })
    }

    /// Restore a same-day session snapshot before processing ticks.
    pub fn resume(&mut self, today: chrono::NaiveDate) {
        self.execution.resume(today);
    }

    /// Feed one tick through the pipeline. Returns trades closed by
    /// this tick.
    pub fn process_tick(&mut self, tick: &Tick) -> Result<Vec<Trade>> {
        self.tick_count += 1;

        let closed = self.execution.on_tick(tick)?;

        if let Some(bar) = self.aggregator.process_tick(tick) {
            self.on_bar_close(&bar)?;
        }
        Ok(closed)
    }

    /// Close out the working bar (end of feed) and run it through the
    /// bar pipeline.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(bar) = self.aggregator.flush() {
            self.on_bar_close(&bar)?;
        }
        Ok(())
    }

    fn on_bar_close(&mut self, bar: &FootprintBar) -> Result<()> {
        self.cumulative_delta.update(bar);
        self.volume_profile.update(bar);
        self.router.on_bar(bar);

        let signals = self.run_detectors(bar);
        self.signal_count += signals.len() as u64;
        debug!(
            bar_end = %bar.end,
            delta = bar.delta(),
            volume = bar.total_volume(),
            signals = signals.len(),
            "bar closed"
        );

        for signal in signals {
            let routed = self.router.evaluate(signal);
            if routed.approved {
                info!(
                    pattern = %routed.pattern,
                    direction = %routed.direction,
                    strength = format!("{:.2}", routed.strength).as_str(),
                    price = routed.price,
                    "signal approved"
                );
                self.execution
                    .on_signal(&routed, self.router.size_multiplier(), bar.end)?;
            }
        }
        Ok(())
    }

    fn run_detectors(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        signals.extend(self.imbalance.detect(bar));
        signals.extend(
            self.imbalance
                .detect_stacked(bar, self.config.detectors.min_stack),
        );
        signals.extend(self.exhaustion.detect(bar));
        signals.extend(self.absorption.detect(bar));
        signals.extend(self.divergence.add_bar(bar));
        // Revisits of previously tracked extremes before tracking new ones
        signals.extend(self.unfinished.check_revisit(bar));
        signals.extend(self.unfinished.detect(bar));
        signals
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            symbol: self.config.symbol.clone(),
            mode: self.config.mode,
            tick_count: self.tick_count,
            bar_count: self.aggregator.bar_count(),
            signal_count: self.signal_count,
            cumulative_delta: self.cumulative_delta.value(),
            poc: self.volume_profile.poc(),
            daily_pnl: self.execution.daily_pnl(),
            open_positions: self.execution.open_positions().len(),
            is_halted: self.execution.is_halted(),
            tier_name: self.execution.tier().current().name,
            balance: self.execution.tier().balance(),
        }
    }

    pub fn execution(&self) -> &ExecutionManager {
        &self.execution
    }

    pub fn execution_mut(&mut self) -> &mut ExecutionManager {
        &mut self.execution
    }

    pub fn router(&self) -> &StrategyRouter {
        &self.router
    }

    /// Session cumulative delta across completed bars.
    pub fn cumulative_delta(&self) -> &CumulativeDelta {
        &self.cumulative_delta
    }

    /// Session volume profile across completed bars.
    pub fn volume_profile(&self) -> &VolumeProfile {
        &self.volume_profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::{DateTime, TimeZone, Utc};

    fn config(state_dir: &std::path::Path) -> EngineConfig {
        EngineConfig {
            state_dir: state_dir.to_string_lossy().into_owned(),
            ..EngineConfig::default()
        }
    }

    fn start() -> DateTime<Utc> {
        // 10:30 ET aligned to a 5-minute boundary
        Utc.with_ymd_and_hms(2025, 7, 14, 14, 30, 0).unwrap()
    }

    fn tick(offset_secs: i64, price: f64, size: u32, side: Side) -> Tick {
        Tick {
            timestamp: start() + chrono::Duration::seconds(offset_secs),
            price,
            size,
            side,
            symbol: "MES".to_string(),
        }
    }

    #[test]
    fn test_ticks_aggregate_into_bars() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(config(dir.path())).unwrap();

        for i in 0..10 {
            engine
                .process_tick(&tick(i * 10, 5765.0 + (i % 3) as f64 * 0.25, 5, Side::Ask))
                .unwrap();
        }
        // Crossing the 300s window closes the first bar
        engine.process_tick(&tick(310, 5766.0, 5, Side::Ask)).unwrap();

        let hb = engine.heartbeat();
        assert_eq!(hb.tick_count, 11);
        assert_eq!(hb.bar_count, 1);
    }

    #[test]
    fn test_halted_engine_still_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(config(dir.path())).unwrap();
        engine.execution_mut().halt("operator stop".to_string()).unwrap();

        for i in 0..5 {
            engine
                .process_tick(&tick(i * 60, 5765.0, 10, Side::Bid))
                .unwrap();
        }
        engine.flush().unwrap();

        let hb = engine.heartbeat();
        assert!(hb.is_halted);
        assert!(hb.bar_count >= 1);
        assert_eq!(hb.open_positions, 0);
    }

    #[test]
    fn test_flush_closes_working_bar() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(config(dir.path())).unwrap();

        engine.process_tick(&tick(0, 5765.0, 5, Side::Ask)).unwrap();
        assert_eq!(engine.heartbeat().bar_count, 0);
        engine.flush().unwrap();
        assert_eq!(engine.heartbeat().bar_count, 1);
    }
}
