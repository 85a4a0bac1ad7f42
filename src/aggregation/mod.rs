//! Tick aggregation: footprint bars and session-level flow aggregates.

pub mod flow;
pub mod footprint;

pub use flow::{CumulativeDelta, VolumeProfile};
pub use footprint::BarAggregator;
