// Library crate - exports the tick-to-decision pipeline components

pub mod aggregation;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod execution;
pub mod instruments;
pub mod persistence;
pub mod regime;
pub mod types;

// Re-export commonly used types
pub use engine::{Engine, Heartbeat};
pub use types::{Direction, FootprintBar, PriceLevel, Regime, Side, Signal, SignalPattern, Tick};
