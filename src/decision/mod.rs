//! Decision - adjustment and sizing of external trade recommendations

pub mod adjuster;
pub mod model;
pub mod sizer;

pub use adjuster::{adjust, position_factor, risk_multiplier};
pub use model::TradingDecision;
pub use sizer::PositionSizer;
