//! Analysis - order-flow heuristics and regime classification
//!
//! Pure, synchronous components fed by candle series:
//! - Feature derivation (rolling volume statistics, wick/body geometry, delta)
//! - Per-bar pattern flags
//! - Order flow summaries (footprint verdict and sweep flow)
//! - Market regime detection

pub mod features;
pub mod patterns;
pub mod order_flow;
pub mod regime;

// Re-export commonly used types
pub use features::{derive_features, FeatureFrame, DEFAULT_WINDOW};
pub use patterns::{classify, PatternFlags};
pub use order_flow::{
    AnalysisConfig, Bias, DeltaTrend, OrderFlowAnalyzer, OrderFlowReport, OrderFlowVerdict,
    PriceRejection, SweepFlow, VolumeNode, VolumeProfile,
};
pub use regime::{
    HeuristicRegimeDetector, MarketRegime, RegimeConfig, RegimeDetails, RegimeDetector,
    RegimeVerdict,
};
