//! Remote prediction and explanation clients.
//!
//! Thin JSON-over-HTTP implementations for deployments with real model
//! endpoints. Each request carries its own timeout, distinct from the
//! breaker's recovery timeout; all transport and contract failures surface
//! as [`Error::Dependency`] so the orchestrator's breaker/fallback path can
//! absorb them.

use super::{Explanation, ExplanationService, PredictionService};
use async_trait::async_trait;
use neuro_triage_core::prediction::{FeatureVector, Probabilities};
use neuro_triage_core::types::{FacilityId, RiskCategory};
use neuro_triage_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Wire response from a prediction endpoint
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    stroke_probability: f64,
    lvo_probability: f64,
}

/// Wire request to an explanation endpoint
#[derive(Debug, Serialize)]
struct ExplanationRequest<'a> {
    features: &'a FeatureVector,
    stroke_probability: f64,
    lvo_probability: f64,
    risk_category: RiskCategory,
    facility_id: Option<&'a FacilityId>,
}

/// Wire response from an explanation endpoint
#[derive(Debug, Deserialize)]
struct ExplanationResponse {
    summary: String,
    #[serde(default)]
    actions: Vec<String>,
}

/// HTTP client for a remote probability model
#[derive(Debug, Clone)]
pub struct RemotePredictor {
    client: reqwest::Client,
    endpoint: String,
}

impl RemotePredictor {
    /// Create a predictor against the given endpoint with a per-request
    /// timeout
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::dependency("prediction", e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PredictionService for RemotePredictor {
    fn name(&self) -> &'static str {
        "remote-prediction"
    }

    async fn predict(&self, features: &FeatureVector) -> Result<Probabilities> {
        debug!(case_id = %features.case_id, endpoint = %self.endpoint, "Calling prediction endpoint");

        let response = self
            .client
            .post(&self.endpoint)
            .json(features)
            .send()
            .await
            .map_err(|e| Error::dependency("prediction", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::dependency(
                "prediction",
                format!("endpoint returned status {}", response.status()),
            ));
        }

        let body: PredictionResponse = response
            .json()
            .await
            .map_err(|e| Error::dependency("prediction", e.to_string()))?;

        let probs = Probabilities {
            stroke: body.stroke_probability,
            lvo: body.lvo_probability,
        };
        if !probs.in_range() {
            return Err(Error::dependency(
                "prediction",
                format!(
                    "probabilities out of range: stroke={} lvo={}",
                    probs.stroke, probs.lvo
                ),
            ));
        }
        Ok(probs)
    }
}

/// HTTP client for a remote explanation generator
#[derive(Debug, Clone)]
pub struct RemoteExplainer {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteExplainer {
    /// Create an explainer against the given endpoint with a per-request
    /// timeout
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::dependency("explanation", e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ExplanationService for RemoteExplainer {
    fn name(&self) -> &'static str {
        "remote-explanation"
    }

    async fn explain(
        &self,
        features: &FeatureVector,
        probs: Probabilities,
        risk: RiskCategory,
        facility: Option<&FacilityId>,
    ) -> Result<Explanation> {
        debug!(case_id = %features.case_id, endpoint = %self.endpoint, "Calling explanation endpoint");

        let request = ExplanationRequest {
            features,
            stroke_probability: probs.stroke,
            lvo_probability: probs.lvo,
            risk_category: risk,
            facility_id: facility,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::dependency("explanation", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::dependency(
                "explanation",
                format!("endpoint returned status {}", response.status()),
            ));
        }

        let body: ExplanationResponse = response
            .json()
            .await
            .map_err(|e| Error::dependency("explanation", e.to_string()))?;

        if body.summary.is_empty() {
            return Err(Error::dependency("explanation", "empty summary in response"));
        }

        Ok(Explanation {
            summary: body.summary,
            actions: body.actions,
        })
    }
}
