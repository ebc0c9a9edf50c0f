//! # NeuroTriage Engine
//!
//! The correlation core: joins the three inbound streams per case, derives
//! temporal trend features from a sliding reading window, and produces an
//! enriched risk assessment through circuit-breaker-protected prediction and
//! explanation dependencies.
//!
//! Components, leaves first:
//! - [`state`]: per-case latest-value store and the shared facility cache
//! - [`trend`]: bounded reading history, rate/direction/volatility features,
//!   advisory anomaly flags
//! - [`breaker`]: generic three-state resilience wrapper for external calls
//! - [`services`]: prediction/explanation traits with deterministic and
//!   remote implementations
//! - [`orchestrator`]: the join/evaluate state machine tying it all together
//! - [`pool`]: striped worker pool guaranteeing at most one in-flight
//!   evaluation per case
//! - [`metrics`]: per-channel throughput and latency tracking

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod breaker;
pub mod features;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod risk;
pub mod routing;
pub mod services;
pub mod state;
pub mod trend;

/// Commonly used engine exports
pub mod prelude {
    pub use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
    pub use crate::metrics::ChannelMetrics;
    pub use crate::orchestrator::CorrelationEngine;
    pub use crate::pool::EvaluationPool;
    pub use crate::services::{
        ExplanationService, HeuristicPredictor, PredictionService, TemplateExplainer,
    };
    pub use crate::state::{CaseStore, EvaluationPhase, FacilityCache};
    pub use crate::trend::TrendAnalyzer;
}
