use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use tracing::{error, info, warn};

use footprint_flow::config::{EngineConfig, TradingMode};
use footprint_flow::execution::{ExecutionEvent, ExitReason};
use footprint_flow::instruments::instrument_spec;
use footprint_flow::{Engine, Side, Tick};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Symbol to trade
    #[arg(short, long, env = "SYMBOL", default_value = "MES")]
    symbol: String,

    /// Trading mode: paper or live
    #[arg(short, long, env = "TRADING_MODE", default_value = "paper")]
    mode: String,

    /// Bar timeframe in seconds
    #[arg(short, long, default_value = "300")]
    timeframe: i64,

    /// Account balance at session start
    #[arg(short, long, env = "STARTING_BALANCE", default_value = "2000")]
    balance: f64,

    /// Directory for session state snapshots
    #[arg(long, env = "STATE_DIR", default_value = "state")]
    state_dir: String,

    /// Replay ticks from a CSV file instead of the simulated feed
    #[arg(long)]
    replay: Option<String>,

    /// Number of ticks for the simulated feed
    #[arg(long, default_value = "100000")]
    sim_ticks: u64,

    /// Starting price for the simulated feed
    #[arg(long, default_value = "5765.0")]
    sim_price: f64,

    /// RNG seed for the simulated feed
    #[arg(long, default_value = "7")]
    sim_seed: u64,

    /// Log a heartbeat every N ticks
    #[arg(long, default_value = "10000")]
    heartbeat_ticks: u64,
}

/// One row of a replay CSV: `timestamp,price,size,side`.
#[derive(Debug, Deserialize)]
struct CsvTick {
    timestamp: DateTime<Utc>,
    price: f64,
    size: u32,
    side: String,
}

impl CsvTick {
    fn into_tick(self, symbol: &str) -> Result<Tick> {
        let side = match self.side.to_ascii_uppercase().as_str() {
            "BUY" | "B" | "ASK" => Side::Ask,
            "SELL" | "S" | "BID" => Side::Bid,
            other => bail!("unknown side {other:?}"),
        };
        Ok(Tick {
            timestamp: self.timestamp,
            price: self.price,
            size: self.size,
            side,
            symbol: symbol.to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("footprint_flow=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let mode = match args.mode.to_ascii_lowercase().as_str() {
        "paper" => TradingMode::Paper,
        "live" => TradingMode::Live,
        other => bail!("unknown trading mode {other:?}, expected paper or live"),
    };

    info!("Starting footprint-flow engine");
    info!("Symbol: {}", args.symbol);
    info!("Mode: {}", mode);
    info!("Timeframe: {}s", args.timeframe);
    info!("Balance: ${:.2}", args.balance);

    let config = EngineConfig {
        symbol: args.symbol.clone(),
        mode,
        timeframe_secs: args.timeframe,
        starting_balance: args.balance,
        state_dir: args.state_dir.clone(),
        ..EngineConfig::default()
    };

    let mut engine = Engine::new(config)?;
    engine.resume(Utc::now().date_naive());

    // Log order/fill traffic published for external collaborators
    let mut events = engine.execution().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::OrderSubmitted(req) => {
                    info!(
                        bracket_id = %req.bracket_id,
                        entry = req.entry,
                        stop = req.stop,
                        target = req.target,
                        "order submitted to broker"
                    );
                }
                ExecutionEvent::Halted { reason } => {
                    warn!(reason = reason.as_str(), "execution halted");
                }
                _ => {}
            }
        }
    });

    let last_price = match &args.replay {
        Some(path) => run_replay(&mut engine, path, &args)?,
        None => run_simulated(&mut engine, &args)?,
    };

    engine.flush()?;
    if let Some(price) = last_price {
        let closed = engine
            .execution_mut()
            .close_all(price, ExitReason::Manual, Utc::now())?;
        if !closed.is_empty() {
            info!(count = closed.len(), "flattened open positions at session end");
        }
    }

    let stats = engine.execution().statistics();
    info!(
        trades = stats.trades,
        wins = stats.wins,
        losses = stats.losses,
        win_rate = format!("{:.1}%", stats.win_rate * 100.0).as_str(),
        daily_pnl = format!("${:.2}", stats.daily_pnl).as_str(),
        balance = format!("${:.2}", stats.balance).as_str(),
        "session complete"
    );
    Ok(())
}

/// Drive the engine from a recorded tick CSV. Malformed rows are
/// logged and skipped so one bad print does not kill a replay.
fn run_replay(engine: &mut Engine, path: &str, args: &Args) -> Result<Option<f64>> {
    info!("Replaying ticks from {}", path);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening replay file {path}"))?;

    let mut count: u64 = 0;
    let mut skipped: u64 = 0;
    let mut last_price = None;
    for (line, row) in reader.deserialize::<CsvTick>().enumerate() {
        let tick = match row.map_err(anyhow::Error::from).and_then(|r| {
            r.into_tick(&args.symbol)
        }) {
            Ok(tick) => tick,
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping malformed tick row");
                skipped += 1;
                continue;
            }
        };
        last_price = Some(tick.price);
        if let Err(e) = engine.process_tick(&tick) {
            error!(error = %e, "tick processing failed");
            return Err(e);
        }
        count += 1;
        if count % args.heartbeat_ticks == 0 {
            log_heartbeat(engine);
        }
    }
    info!(ticks = count, skipped, "replay finished");
    Ok(last_price)
}

/// Random-walk tick feed for end-to-end paper sessions without market
/// data. Prices move in whole ticks; sides lean toward the direction
/// of the move.
fn run_simulated(engine: &mut Engine, args: &Args) -> Result<Option<f64>> {
    info!(ticks = args.sim_ticks, "running simulated feed");
    let spec = instrument_spec(&args.symbol);
    let mut rng = StdRng::seed_from_u64(args.sim_seed);
    let step = Normal::new(0.0, 1.2).map_err(|e| anyhow::anyhow!("bad step distribution: {e}"))?;

    // 09:30 ET session open
    let start = Utc
        .with_ymd_and_hms(2025, 7, 14, 13, 30, 0)
        .single()
        .context("building session start timestamp")?;

    let mut price = args.sim_price;
    let mut last_price = None;
    for i in 0..args.sim_ticks {
        let move_ticks: f64 = step.sample(&mut rng);
        let move_ticks = move_ticks.round();
        price += move_ticks * spec.tick_size;
        let side = if move_ticks > 0.0 {
            Side::Ask
        } else if move_ticks < 0.0 {
            Side::Bid
        } else if rng.gen_bool(0.5) {
            Side::Ask
        } else {
            Side::Bid
        };
        let tick = Tick {
            timestamp: start + Duration::milliseconds(i as i64 * 250),
            price,
            size: rng.gen_range(1..=10),
            side,
            symbol: args.symbol.clone(),
        };
        last_price = Some(price);
        engine.process_tick(&tick)?;
        if (i + 1) % args.heartbeat_ticks == 0 {
            log_heartbeat(engine);
        }
    }
    Ok(last_price)
}

fn log_heartbeat(engine: &Engine) {
    let hb = engine.heartbeat();
    info!(
        ticks = hb.tick_count,
        bars = hb.bar_count,
        signals = hb.signal_count,
        delta = hb.cumulative_delta,
        open = hb.open_positions,
        daily_pnl = format!("${:.2}", hb.daily_pnl).as_str(),
        tier = hb.tier_name,
        halted = hb.is_halted,
        "heartbeat"
    );
}
