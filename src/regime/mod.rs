//! Market regime classification and signal routing.

pub mod classifier;
pub mod indicators;
pub mod inputs;
pub mod router;

pub use classifier::RegimeClassifier;
pub use inputs::{RegimeInputs, RegimeInputsCalculator};
pub use router::{RegimePolicy, StrategyRouter};
