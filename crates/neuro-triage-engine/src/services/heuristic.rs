//! Deterministic rule-based prediction and template explanations.
//!
//! These implementations keep the pipeline fully functional when no remote
//! model endpoint is configured, and double as the degraded path when the
//! breaker is open or a remote call fails. Same input always produces the
//! same output.

use super::{Explanation, ExplanationService, PredictionService};
use crate::risk::IV_TPA_WINDOW_MIN;
use async_trait::async_trait;
use neuro_triage_core::prediction::{FeatureVector, Probabilities};
use neuro_triage_core::types::{FacilityId, RiskCategory};
use neuro_triage_core::Result;

// Base probabilities before any clinical findings
const BASE_STROKE_PROBABILITY: f64 = 0.2;
const BASE_LVO_PROBABILITY: f64 = 0.05;

// Screening score contribution
const SCREENING_SCORE_MAX: f64 = 3.0;
const SCREENING_SCORE_STROKE_WEIGHT: f64 = 0.2;
const SCREENING_SCORE_LVO_THRESHOLD: i32 = 2;
const SCREENING_SCORE_LVO_INCREMENT: f64 = 0.15;

// Clinical sign contributions
const FACE_DROOP_STROKE_INCREMENT: f64 = 0.15;
const ARM_WEAKNESS_STROKE_INCREMENT: f64 = 0.12;
const ARM_WEAKNESS_LVO_INCREMENT: f64 = 0.12;
const SPEECH_ABNORMAL_STROKE_INCREMENT: f64 = 0.10;

// Time window contributions (minutes)
const TIME_WINDOW_EXTENDED_MIN: i64 = 360;
const TIME_WINDOW_PRIMARY_INCREMENT: f64 = 0.08;
const TIME_WINDOW_EXTENDED_INCREMENT: f64 = 0.05;

// Consciousness contributions
const GCS_NORMAL: i32 = 15;
const GCS_MODERATE_THRESHOLD: i32 = 13;
const GCS_REDUCED_STROKE_INCREMENT: f64 = 0.10;
const GCS_SEVERE_LVO_INCREMENT: f64 = 0.08;

// Blood pressure contribution
const BP_ELEVATED_THRESHOLD: i32 = 180;
const BP_ELEVATED_STROKE_INCREMENT: f64 = 0.05;

/// Rule-based probability model built from established screening knowledge
#[derive(Debug, Clone, Default)]
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    /// Create the predictor
    pub fn new() -> Self {
        Self
    }

    /// Pure scoring function shared by the service impl and the degraded path
    pub fn score(features: &FeatureVector) -> Probabilities {
        let mut stroke = BASE_STROKE_PROBABILITY;
        let mut lvo = BASE_LVO_PROBABILITY;

        if let Some(score) = features.screening_score {
            stroke += SCREENING_SCORE_STROKE_WEIGHT
                * (score as f64).min(SCREENING_SCORE_MAX)
                / SCREENING_SCORE_MAX;
            if score >= SCREENING_SCORE_LVO_THRESHOLD {
                lvo += SCREENING_SCORE_LVO_INCREMENT;
            }
        }

        if features.face_droop_present {
            stroke += FACE_DROOP_STROKE_INCREMENT;
        }
        if features.arm_weakness_any {
            stroke += ARM_WEAKNESS_STROKE_INCREMENT;
            lvo += ARM_WEAKNESS_LVO_INCREMENT;
        }
        if features.speech_abnormal_any {
            stroke += SPEECH_ABNORMAL_STROKE_INCREMENT;
        }

        if let Some(minutes) = features.minutes_since_onset {
            if minutes <= IV_TPA_WINDOW_MIN {
                stroke += TIME_WINDOW_PRIMARY_INCREMENT;
            } else if minutes <= TIME_WINDOW_EXTENDED_MIN {
                stroke += TIME_WINDOW_EXTENDED_INCREMENT;
            }
        }

        if let Some(gcs) = features.gcs_total {
            if gcs < GCS_NORMAL {
                stroke += GCS_REDUCED_STROKE_INCREMENT;
                if gcs < GCS_MODERATE_THRESHOLD {
                    lvo += GCS_SEVERE_LVO_INCREMENT;
                }
            }
        }

        if let Some(systolic) = features.systolic_bp_mmhg {
            if systolic > BP_ELEVATED_THRESHOLD {
                stroke += BP_ELEVATED_STROKE_INCREMENT;
            }
        }

        Probabilities::clamped(stroke, lvo)
    }
}

#[async_trait]
impl PredictionService for HeuristicPredictor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn predict(&self, features: &FeatureVector) -> Result<Probabilities> {
        Ok(Self::score(features))
    }
}

/// Mandatory deterministic fallback explanation. Pure function of its inputs.
pub fn fallback_explanation(
    features: &FeatureVector,
    probs: Probabilities,
    risk: RiskCategory,
    facility: Option<&FacilityId>,
) -> Explanation {
    let onset = match features.minutes_since_onset {
        None => "an unknown onset time".to_string(),
        Some(m) if m < 60 => format!("{m} minutes"),
        Some(m) => format!("{} hours", m / 60),
    };

    let mut summary = format!(
        "Estimated {:.0}% probability of acute ischemic stroke and {:.0}% probability \
         of large vessel occlusion in a patient with symptoms for approximately {}. \
         Overall risk is categorized as {}.",
        probs.stroke * 100.0,
        probs.lvo * 100.0,
        onset,
        risk
    );
    if let Some(facility) = facility {
        summary.push_str(&format!(" Recommended routing destination: {facility}."));
    }

    let mut actions = vec![
        "Maintain airway, breathing, and circulation; avoid hypotension.".to_string(),
        "Keep SpO2 >= 94% and manage blood glucose if severely abnormal.".to_string(),
        "Perform ongoing neurological reassessment during transport.".to_string(),
    ];

    if features.suspected_lvo || probs.lvo >= 0.4 {
        actions.push(
            "Pre-notify a thrombectomy-capable center about suspected LVO.".to_string(),
        );
    } else {
        actions.push(
            "Pre-notify the receiving center for rapid imaging and thrombolysis evaluation."
                .to_string(),
        );
    }

    if features
        .minutes_since_onset
        .map(|m| m > IV_TPA_WINDOW_MIN)
        .unwrap_or(false)
    {
        actions.push(
            "Given longer time from onset, emphasize rapid imaging and EVT eligibility."
                .to_string(),
        );
    }

    Explanation { summary, actions }
}

/// Explanation service backed by the template fallback; never fails
#[derive(Debug, Clone, Default)]
pub struct TemplateExplainer;

impl TemplateExplainer {
    /// Create the explainer
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExplanationService for TemplateExplainer {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn explain(
        &self,
        features: &FeatureVector,
        probs: Probabilities,
        risk: RiskCategory,
        facility: Option<&FacilityId>,
    ) -> Result<Explanation> {
        Ok(fallback_explanation(features, probs, risk, facility))
    }
}
