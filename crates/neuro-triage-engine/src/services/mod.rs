//! Prediction and explanation dependencies.
//!
//! Both collaborators hide behind traits so the orchestrator never knows
//! whether it is talking to a remote model endpoint or the built-in
//! deterministic rules:
//!
//! - [`PredictionService`]: feature vector in, stroke/LVO probabilities out
//! - [`ExplanationService`]: prediction context in, summary and action list
//!   out
//!
//! [`HeuristicPredictor`] and [`TemplateExplainer`] are the deterministic
//! implementations; [`remote::RemotePredictor`] and
//! [`remote::RemoteExplainer`] call HTTP endpoints with request-level
//! timeouts. The template fallback is additionally exposed as the pure
//! function [`heuristic::fallback_explanation`] for the degraded path.

pub mod heuristic;
pub mod remote;

pub use heuristic::{fallback_explanation, HeuristicPredictor, TemplateExplainer};
pub use remote::{RemoteExplainer, RemotePredictor};

use async_trait::async_trait;
use neuro_triage_core::prediction::{FeatureVector, Probabilities};
use neuro_triage_core::types::{FacilityId, RiskCategory};
use neuro_triage_core::Result;
use serde::{Deserialize, Serialize};

/// Natural-language summary with recommended actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    pub actions: Vec<String>,
}

/// Probability model for stroke and large-vessel occlusion
#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Service name for logs, metrics, and emitted predictions
    fn name(&self) -> &'static str;

    /// Predict probabilities for a feature vector
    async fn predict(&self, features: &FeatureVector) -> Result<Probabilities>;
}

/// Clinical explanation generator
#[async_trait]
pub trait ExplanationService: Send + Sync {
    /// Service name for logs, metrics, and emitted predictions
    fn name(&self) -> &'static str;

    /// Generate a summary and action list for an assessed case
    async fn explain(
        &self,
        features: &FeatureVector,
        probs: Probabilities,
        risk: RiskCategory,
        facility: Option<&FacilityId>,
    ) -> Result<Explanation>;
}
