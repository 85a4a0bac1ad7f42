//! Risk-managed order execution.
//!
//! The manager owns the open positions, the balance tier, and the
//! session snapshot store. Approved signals become bracket orders;
//! every tick is checked against each position's stop first, then its
//! target, and exits fill at the touched level price rather than the
//! tick price. The session halts on the tier's daily loss limit or
//! the daily profit target, force-flattening anything still open.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::instruments::{instrument_spec, normalize_price};
use crate::persistence::{SessionState, SessionStore};
use crate::types::{Direction, Regime, Signal, SignalPattern, Tick};

use super::orders::{BracketOrder, ExitReason, Fill, OrderRequest, Position, Trade};
use super::session::SessionConfig;
use super::tier::TierManager;

const FILL_DEDUP_CAP: usize = 1000;

/// Events published to collaborators (broker bridge, logging, UI).
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    OrderSubmitted(OrderRequest),
    PositionOpened(Position),
    PositionClosed(Trade),
    Halted { reason: String },
    Resumed,
}

/// Aggregate session statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub daily_pnl: f64,
    pub balance: f64,
    pub open_positions: usize,
    pub is_halted: bool,
}

pub struct ExecutionManager {
    config: SessionConfig,
    tier: TierManager,
    store: SessionStore,
    events: broadcast::Sender<ExecutionEvent>,

    date: NaiveDate,
    open_positions: Vec<Position>,
    trades: Vec<Trade>,
    daily_pnl: f64,
    is_halted: bool,
    halt_reason: Option<String>,

    /// Live-mode orders submitted but not yet filled
    pending: HashMap<uuid::Uuid, BracketOrder>,
    /// Signal context carried from entry to the closing trade record
    signal_context: HashMap<uuid::Uuid, (SignalPattern, Option<Regime>)>,
    seen_fills: HashSet<String>,
}

impl ExecutionManager {
    pub fn new(config: SessionConfig, tier: TierManager, store: SessionStore) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            tier,
            store,
            events,
            date: Utc::now().date_naive(),
            open_positions: Vec::new(),
            trades: Vec::new(),
            daily_pnl: 0.0,
            is_halted: false,
            halt_reason: None,
            pending: HashMap::new(),
            signal_context: HashMap::new(),
            seen_fills: HashSet::new(),
        }
    }

    /// Resume from a same-day snapshot if one exists. Positions, P&L,
    /// halt status, and tier progression all carry over, so a restart
    /// mid-session picks up exactly where the crash left off.
    pub fn resume(&mut self, today: NaiveDate) {
        self.date = today;
        if let Some(state) = self.store.load_for_day(today) {
            self.tier = TierManager::from_state(state.tier);
            self.open_positions = state.open_positions;
            self.trades = state.trades;
            self.daily_pnl = state.daily_pnl;
            self.is_halted = state.is_halted;
            self.halt_reason = state.halt_reason;
            info!(
                positions = self.open_positions.len(),
                daily_pnl = self.daily_pnl,
                halted = self.is_halted,
                "session state restored"
            );
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Act on a router-approved signal. Returns the bracket order that
    /// was placed, or `None` when a risk check blocked the entry.
    pub fn on_signal(
        &mut self,
        signal: &Signal,
        size_multiplier: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<BracketOrder>> {
        if !signal.approved {
            return Ok(None);
        }
        if self.is_halted {
            debug!(pattern = %signal.pattern, "signal ignored, session halted");
            return Ok(None);
        }
        if self.daily_pnl >= self.config.daily_profit_target {
            self.halt(format!(
                "daily profit target reached: ${:.2}",
                self.daily_pnl
            ))?;
            return Ok(None);
        }
        if self.tier.should_halt() {
            self.halt(format!(
                "daily loss limit reached: ${:.2}",
                self.tier.session_pnl()
            ))?;
            return Ok(None);
        }
        if self.open_positions.len() + self.pending.len() >= self.config.max_concurrent_trades {
            debug!("signal ignored, max concurrent trades reached");
            return Ok(None);
        }
        if !self.config.is_within_trading_hours(now) {
            debug!("signal ignored, outside entry window");
            return Ok(None);
        }

        let base = self
            .tier
            .position_size(signal.is_stacked(), signal.regime.unwrap_or(Regime::Volatile));
        let size = ((base as f64 * size_multiplier).floor() as u32)
            .max(1)
            .min(self.tier.current().max_contracts);

        let spec = instrument_spec(&self.config.symbol);
        let entry = normalize_price(signal.price, spec.tick_size);
        let stop_offset = self.config.stop_ticks as f64 * spec.tick_size;
        let target_offset = self.config.target_ticks as f64 * spec.tick_size;
        let (stop, target) = match signal.direction {
            Direction::Long => (entry - stop_offset, entry + target_offset),
            Direction::Short => (entry + stop_offset, entry - target_offset),
        };

        let order = BracketOrder {
            bracket_id: uuid::Uuid::new_v4(),
            symbol: self.config.symbol.clone(),
            direction: signal.direction,
            size,
            entry_price: entry,
            stop_price: stop,
            target_price: target,
            created_at: now,
        };
        self.signal_context
            .insert(order.bracket_id, (signal.pattern, signal.regime));

        info!(
            pattern = %signal.pattern,
            direction = %signal.direction,
            size,
            entry,
            stop,
            target,
            "placing bracket order"
        );

        if self.config.mode.is_paper() {
            let position = Position::open(&order, spec.tick_size, spec.tick_value, now);
            let _ = self.events.send(ExecutionEvent::PositionOpened(position.clone()));
            self.open_positions.push(position);
            self.persist()?;
        } else {
            self.pending.insert(order.bracket_id, order.clone());
            let _ = self
                .events
                .send(ExecutionEvent::OrderSubmitted(OrderRequest::from_bracket(&order)));
        }
        Ok(Some(order))
    }

    /// Check every open position against this tick. Stops are evaluated
    /// before targets; a position that gapped through both exits at its
    /// stop. Exits fill at the bracket level, not the tick price.
    pub fn on_tick(&mut self, tick: &Tick) -> Result<Vec<Trade>> {
        let mut closed = Vec::new();
        let mut i = 0;
        while i < self.open_positions.len() {
            self.open_positions[i].update_unrealized(tick.price);
            let (exit_price, reason) = if self.open_positions[i].stop_hit(tick.price) {
                (self.open_positions[i].stop_price, ExitReason::Stop)
            } else if self.open_positions[i].target_hit(tick.price) {
                (self.open_positions[i].target_price, ExitReason::Target)
            } else {
                i += 1;
                continue;
            };
            let position = self.open_positions.remove(i);
            closed.push(self.record_close(&position, exit_price, tick.timestamp, reason)?);
        }

        if !closed.is_empty() {
            self.check_halt_conditions(tick.price, tick.timestamp)?;
            self.persist()?;
        }
        Ok(closed)
    }

    /// Apply a broker fill, opening the matching pending bracket.
    /// Idempotent by fill id; the dedup set is bounded and cleared
    /// wholesale when it exceeds the cap, keeping the current id.
    pub fn apply_fill(&mut self, fill: Fill) -> Result<()> {
        if self.seen_fills.contains(&fill.fill_id) {
            debug!(fill_id = %fill.fill_id, "duplicate fill ignored");
            return Ok(());
        }
        if self.seen_fills.len() >= FILL_DEDUP_CAP {
            self.seen_fills.clear();
        }
        self.seen_fills.insert(fill.fill_id.clone());

        let Some(order) = self.pending.remove(&fill.bracket_id) else {
            warn!(bracket_id = %fill.bracket_id, "fill for unknown bracket");
            return Ok(());
        };

        let spec = instrument_spec(&order.symbol);
        let mut position = Position::open(&order, spec.tick_size, spec.tick_value, fill.timestamp);
        position.entry_price = fill.price;
        position.size = fill.size;
        info!(
            bracket_id = %fill.bracket_id,
            price = fill.price,
            size = fill.size,
            "position opened from fill"
        );
        let _ = self.events.send(ExecutionEvent::PositionOpened(position.clone()));
        self.open_positions.push(position);
        self.persist()
    }

    /// Force-flatten every open position at the given price.
    pub fn close_all(
        &mut self,
        price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trade>> {
        let positions = std::mem::take(&mut self.open_positions);
        let mut closed = Vec::with_capacity(positions.len());
        for position in &positions {
            closed.push(self.record_close(position, price, now, reason)?);
        }
        self.pending.clear();
        if !closed.is_empty() {
            self.persist()?;
        }
        Ok(closed)
    }

    fn record_close(
        &mut self,
        position: &Position,
        exit_price: f64,
        now: DateTime<Utc>,
        reason: ExitReason,
    ) -> Result<Trade> {
        let mut trade = Trade::close(position, exit_price, now, reason);
        if let Some((pattern, regime)) = self.signal_context.remove(&position.bracket_id) {
            trade.signal_pattern = Some(pattern);
            trade.regime = regime;
        }
        self.daily_pnl += trade.pnl;
        self.tier.record_trade(trade.pnl);
        info!(
            reason = %reason,
            pnl = trade.pnl,
            pnl_ticks = trade.pnl_ticks,
            daily_pnl = self.daily_pnl,
            "position closed"
        );
        let _ = self.events.send(ExecutionEvent::PositionClosed(trade.clone()));
        self.trades.push(trade.clone());
        Ok(trade)
    }

    fn check_halt_conditions(&mut self, price: f64, now: DateTime<Utc>) -> Result<()> {
        if self.is_halted {
            return Ok(());
        }
        let reason = if self.tier.should_halt() {
            Some(format!(
                "daily loss limit reached: ${:.2}",
                self.tier.session_pnl()
            ))
        } else if self.daily_pnl >= self.config.daily_profit_target {
            Some(format!(
                "daily profit target reached: ${:.2}",
                self.daily_pnl
            ))
        } else {
            None
        };
        if let Some(reason) = reason {
            self.halt(reason)?;
            self.close_all(price, ExitReason::Halted, now)?;
        }
        Ok(())
    }

    pub fn halt(&mut self, reason: String) -> Result<()> {
        if self.is_halted {
            return Ok(());
        }
        warn!(reason = reason.as_str(), "trading halted");
        self.is_halted = true;
        self.halt_reason = Some(reason.clone());
        let _ = self.events.send(ExecutionEvent::Halted { reason });
        self.persist()
    }

    /// Lift an operator halt. Refused while either daily limit is
    /// still breached, so a risk halt ends the session.
    pub fn resume_trading(&mut self) -> Result<()> {
        if !self.is_halted {
            bail!("session is not halted");
        }
        if self.tier.should_halt() {
            bail!(
                "cannot resume, daily loss limit breached: ${:.2}",
                self.tier.session_pnl()
            );
        }
        if self.daily_pnl >= self.config.daily_profit_target {
            bail!(
                "cannot resume, daily profit target reached: ${:.2}",
                self.daily_pnl
            );
        }
        info!("trading resumed");
        self.is_halted = false;
        self.halt_reason = None;
        let _ = self.events.send(ExecutionEvent::Resumed);
        self.persist()
    }

    pub fn is_halted(&self) -> bool {
        self.is_halted
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn tier(&self) -> &TierManager {
        &self.tier
    }

    pub fn statistics(&self) -> ExecutionStats {
        let wins = self.trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = self.trades.iter().filter(|t| t.pnl < 0.0).count();
        let win_rate = if self.trades.is_empty() {
            0.0
        } else {
            wins as f64 / self.trades.len() as f64
        };
        ExecutionStats {
            trades: self.trades.len(),
            wins,
            losses,
            win_rate,
            daily_pnl: self.daily_pnl,
            balance: self.tier.balance(),
            open_positions: self.open_positions.len(),
            is_halted: self.is_halted,
        }
    }

    // A failed write means the next restart would resume from stale
    // state with real positions open, so it is fatal.
    fn persist(&self) -> Result<()> {
        let state = SessionState {
            date: self.date,
            symbol: self.config.symbol.clone(),
            open_positions: self.open_positions.clone(),
            daily_pnl: self.daily_pnl,
            trades: self.trades.clone(),
            is_halted: self.is_halted,
            halt_reason: self.halt_reason.clone(),
            tier: self.tier.state().clone(),
            saved_at: Utc::now(),
        };
        self.store.save(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingMode;
    use crate::types::{Side, SignalDetails};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // 10:30 ET on a July Monday
        Utc.with_ymd_and_hms(2025, 7, 14, 14, 30, 0).unwrap()
    }

    fn manager(balance: f64) -> (ExecutionManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::for_symbol("MES", TradingMode::Paper);
        let store = SessionStore::new(dir.path()).unwrap();
        let mut mgr = ExecutionManager::new(config, TierManager::new(balance), store);
        mgr.resume(now().date_naive());
        (mgr, dir)
    }

    fn approved_signal(direction: Direction, price: f64) -> Signal {
        let mut signal = Signal::new(
            now(),
            "MES",
            SignalPattern::BuyImbalance,
            direction,
            0.8,
            price,
            SignalDetails::Imbalance {
                ratio: 4.0,
                dominant_volume: 120,
                opposing_volume: 30,
                opposing_price: price - 0.25,
            },
        );
        signal.approved = true;
        signal.regime = Some(Regime::TrendingUp);
        signal
    }

    fn tick(price: f64, secs: u32) -> Tick {
        Tick {
            timestamp: now() + chrono::Duration::seconds(secs as i64),
            price,
            size: 5,
            side: Side::Ask,
            symbol: "MES".to_string(),
        }
    }

    #[test]
    fn test_bracket_placed_around_entry() {
        let (mut mgr, _dir) = manager(2000.0);
        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap()
            .unwrap();
        // MES profile: 16 tick stop, 24 tick target
        assert_eq!(order.entry_price, 5765.0);
        assert_eq!(order.stop_price, 5761.0);
        assert_eq!(order.target_price, 5771.0);
        assert_eq!(mgr.open_positions().len(), 1);
    }

    #[test]
    fn test_stop_checked_before_target() {
        let (mut mgr, _dir) = manager(2000.0);
        mgr.on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();

        // A tick through both levels exits at the stop
        let mut position = mgr.open_positions()[0].clone();
        position.target_price = 5764.0;
        mgr.open_positions[0] = position;
        let closed = mgr.on_tick(&tick(5761.0, 10)).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, ExitReason::Stop);
        assert_eq!(closed[0].exit_price, 5761.0);
    }

    #[test]
    fn test_exit_fills_at_level_not_tick_price() {
        let (mut mgr, _dir) = manager(2000.0);
        mgr.on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();

        // Gapped past the target: trade records the target level
        let closed = mgr.on_tick(&tick(5772.5, 10)).unwrap();
        assert_eq!(closed[0].exit_reason, ExitReason::Target);
        assert_eq!(closed[0].exit_price, 5771.0);
        assert_eq!(closed[0].pnl_ticks, 24);
    }

    #[test]
    fn test_long_bracket_pnl() {
        let (mut mgr, _dir) = manager(2000.0);
        // Trending regime plus no streak: 2 contracts on a plain signal
        mgr.on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();
        let closed = mgr.on_tick(&tick(5761.0, 10)).unwrap();
        // 16 ticks x $1.25 x 2 contracts
        assert_eq!(closed[0].pnl, -40.0);
        assert_eq!(mgr.daily_pnl(), -40.0);
    }

    #[test]
    fn test_max_concurrent_blocks_second_entry() {
        let (mut mgr, _dir) = manager(2000.0);
        mgr.on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();
        let second = mgr
            .on_signal(&approved_signal(Direction::Long, 5766.0), 1.0, now())
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_daily_loss_halt_flattens_and_blocks() {
        let (mut mgr, _dir) = manager(2000.0);
        mgr.on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();
        // Size 2 stop loss is -$40; push session pnl past the -$100 limit
        mgr.tier.record_trade(-90.0);
        let closed = mgr.on_tick(&tick(5761.0, 10)).unwrap();
        assert_eq!(closed.len(), 1);
        assert!(mgr.is_halted());

        let blocked = mgr
            .on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();
        assert!(blocked.is_none());
    }

    #[test]
    fn test_profit_target_halts() {
        let (mut mgr, _dir) = manager(2000.0);
        mgr.daily_pnl = 510.0;
        let blocked = mgr
            .on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap();
        assert!(blocked.is_none());
        assert!(mgr.is_halted());
    }

    #[test]
    fn test_router_multiplier_scales_size() {
        let (mut mgr, _dir) = manager(2000.0);
        // Base size 2 (trending), choppy multiplier 0.5 floors to 1
        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5765.0), 0.5, now())
            .unwrap()
            .unwrap();
        assert_eq!(order.size, 1);
    }

    #[test]
    fn test_duplicate_fill_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::for_symbol("MES", TradingMode::Live);
        let store = SessionStore::new(dir.path()).unwrap();
        let mut mgr = ExecutionManager::new(config, TierManager::new(2000.0), store);
        mgr.resume(now().date_naive());

        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
            .unwrap()
            .unwrap();
        assert!(mgr.open_positions().is_empty());

        let fill = Fill {
            fill_id: "f-1".to_string(),
            bracket_id: order.bracket_id,
            price: 5765.25,
            size: order.size,
            timestamp: now(),
        };
        mgr.apply_fill(fill.clone()).unwrap();
        mgr.apply_fill(fill).unwrap();
        assert_eq!(mgr.open_positions().len(), 1);
        assert_eq!(mgr.open_positions()[0].entry_price, 5765.25);
    }

    #[test]
    fn test_crash_recovery_resumes_positions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let config = SessionConfig::for_symbol("MES", TradingMode::Paper);
            let store = SessionStore::new(dir.path()).unwrap();
            let mut mgr = ExecutionManager::new(config, TierManager::new(2000.0), store);
            mgr.resume(now().date_naive());
            mgr.on_signal(&approved_signal(Direction::Long, 5765.0), 1.0, now())
                .unwrap();
        }

        let config = SessionConfig::for_symbol("MES", TradingMode::Paper);
        let store = SessionStore::new(dir.path()).unwrap();
        let mut mgr = ExecutionManager::new(config, TierManager::new(2000.0), store);
        mgr.resume(now().date_naive());
        assert_eq!(mgr.open_positions().len(), 1);
        assert_eq!(mgr.open_positions()[0].entry_price, 5765.0);

        // The revived position still exits on its original bracket
        let closed = mgr.on_tick(&tick(5771.0, 20)).unwrap();
        assert_eq!(closed[0].exit_reason, ExitReason::Target);
    }
}
