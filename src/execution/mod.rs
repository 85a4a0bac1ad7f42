//! Order lifecycle, risk management, and tier-based sizing.

pub mod manager;
pub mod orders;
pub mod session;
pub mod tier;

pub use manager::{ExecutionEvent, ExecutionManager};
pub use orders::{BracketOrder, ExitReason, Fill, OrderRequest, Position, Trade};
pub use session::SessionConfig;
pub use tier::{Tier, TierManager, TierState};
