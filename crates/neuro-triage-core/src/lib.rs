//! # NeuroTriage Core
//!
//! Shared foundation for the stroke triage correlation engine.
//!
//! This crate provides:
//! - Strongly typed inbound events for the three correlated channels
//!   (vitals readings, neurological screenings, facility capacity)
//! - The decode/validation boundary that rejects malformed payloads
//! - The outbound prediction model emitted by the engine
//! - Configuration loading with environment overrides
//! - The crate-wide error taxonomy

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod events;
pub mod prediction;
pub mod types;

pub use error::{Error, Result};

/// Commonly used core exports
pub mod prelude {
    pub use crate::config::TriageConfig;
    pub use crate::error::{Error, Result};
    pub use crate::events::{decode_event, CapacityEvent, Channel, ChannelEvent, ScreeningEvent, VitalsEvent};
    pub use crate::prediction::{FeatureVector, PredictionResult, Probabilities, TrendIndicators};
    pub use crate::types::{CaseId, FacilityId, FacilityTier, RiskCategory, TrendDirection};
}
