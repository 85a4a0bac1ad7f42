//! Order flow pattern detectors.
//!
//! Each detector consumes completed footprint bars and emits
//! [`Signal`](crate::types::Signal)s.
//! Detectors are independent; the engine runs all of them on every bar
//! close and routes the results through the strategy router.

pub mod absorption;
pub mod divergence;
pub mod exhaustion;
pub mod imbalance;
pub mod unfinished;

pub use absorption::AbsorptionDetector;
pub use divergence::DeltaDivergenceDetector;
pub use exhaustion::ExhaustionDetector;
pub use imbalance::ImbalanceDetector;
pub use unfinished::UnfinishedBusinessDetector;
