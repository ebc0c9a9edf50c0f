//! Risk categorization, prediction confidence, feature importance, and
//! treatment-window assessment.
//!
//! Everything here is pure computation over the feature vector and trend
//! indicators, kept separate from the orchestrator so each scoring rule can
//! be tested in isolation.

use neuro_triage_core::prediction::{FeatureVector, Probabilities, TrendIndicators};
use neuro_triage_core::types::RiskCategory;
use std::collections::BTreeMap;

/// Thrombolysis window in minutes (4.5 hours)
pub const IV_TPA_WINDOW_MIN: i64 = 270;

/// Extended window for selected thrombectomy candidates (6 hours)
pub const EXTENDED_WINDOW_MIN: i64 = 360;

/// Categorize risk from the probability pair. Pure function of its inputs.
pub fn categorize_risk(probs: Probabilities) -> RiskCategory {
    if probs.stroke >= 0.8 || probs.lvo >= 0.6 {
        RiskCategory::Critical
    } else if probs.stroke >= 0.6 || probs.lvo >= 0.4 {
        RiskCategory::High
    } else if probs.stroke >= 0.3 {
        RiskCategory::Moderate
    } else {
        RiskCategory::Low
    }
}

/// Prediction confidence in `[0, 1]`:
/// `0.5 + 0.3*completeness + 0.2*stability - 0.2*deterioration + 0.3*quality`.
///
/// Completeness counts populated key fields; stability is penalized for high
/// volatility on any tracked vital; quality rewards strong screening scores,
/// a valid consciousness range, and onset within the treatment window;
/// deterioration penalizes a worsening GCS trend.
pub fn prediction_confidence(features: &FeatureVector, trends: &TrendIndicators) -> f64 {
    let confidence = 0.5
        + 0.3 * completeness_fraction(features)
        + 0.2 * stability_score(trends)
        - 0.2 * deterioration_penalty(trends)
        + 0.3 * quality_score(features);
    confidence.clamp(0.0, 1.0)
}

fn completeness_fraction(features: &FeatureVector) -> f64 {
    let populated = [
        features.heart_rate_bpm.is_some(),
        features.systolic_bp_mmhg.is_some(),
        features.spo2_pct.is_some(),
        features.gcs_total.is_some(),
        features.screening_score.is_some(),
        features.minutes_since_onset.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    populated as f64 / 6.0
}

fn stability_score(trends: &TrendIndicators) -> f64 {
    let mut score: f64 = 1.0;
    if trends.heart_rate.volatility.map(|v| v > 0.2).unwrap_or(false) {
        score -= 0.1;
    }
    if trends
        .systolic_pressure
        .volatility
        .map(|v| v > 0.15)
        .unwrap_or(false)
    {
        score -= 0.1;
    }
    if trends.spo2.volatility.map(|v| v > 0.1).unwrap_or(false) {
        score -= 0.1;
    }
    score.max(0.0)
}

fn deterioration_penalty(trends: &TrendIndicators) -> f64 {
    if trends
        .gcs
        .direction
        .map(|d| d.is_worsening())
        .unwrap_or(false)
    {
        0.1
    } else {
        0.0
    }
}

fn quality_score(features: &FeatureVector) -> f64 {
    let mut score = 0.0;
    if features.screening_score.map(|s| s >= 2).unwrap_or(false) {
        score += 0.15;
    }
    if features
        .gcs_total
        .map(|gcs| (13..=15).contains(&gcs))
        .unwrap_or(false)
    {
        score += 0.1;
    }
    if features
        .minutes_since_onset
        .map(|m| m <= EXTENDED_WINDOW_MIN)
        .unwrap_or(false)
    {
        score += 0.05;
    }
    score
}

/// Rule-derived feature-importance map, normalized so the strongest feature
/// scores 1.0. Deterministic over its inputs.
pub fn feature_importance(features: &FeatureVector) -> BTreeMap<String, f64> {
    let mut importance = BTreeMap::new();

    if let Some(score) = features.screening_score {
        if score > 0 {
            importance.insert(
                "screening_score".to_string(),
                (score as f64 / 3.0).min(1.0),
            );
        }
    }

    if features.face_droop_present {
        importance.insert("face_droop".to_string(), 0.8);
    }
    if features.arm_weakness_any {
        importance.insert("arm_weakness".to_string(), 0.85);
    }
    if features.speech_abnormal_any {
        importance.insert("speech_abnormality".to_string(), 0.75);
    }

    if let Some(gcs) = features.gcs_total {
        if gcs < 13 {
            importance.insert("gcs_total".to_string(), 0.9);
        } else if gcs < 15 {
            importance.insert("gcs_total".to_string(), 0.6);
        }
    }

    if let Some(minutes) = features.minutes_since_onset {
        let weight = if minutes <= IV_TPA_WINDOW_MIN {
            0.9
        } else if minutes <= EXTENDED_WINDOW_MIN {
            0.7
        } else {
            0.4
        };
        importance.insert("time_window".to_string(), weight);
    }

    if let Some(systolic) = features.systolic_bp_mmhg {
        if systolic > 180 {
            importance.insert("systolic_bp".to_string(), 0.5);
        } else if systolic < 100 {
            importance.insert("systolic_bp".to_string(), 0.4);
        }
    }

    let max = importance.values().cloned().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for value in importance.values_mut() {
            *value /= max;
        }
    }

    importance
}

/// Human-readable treatment-window assessment
pub fn window_assessment(minutes_since_onset: Option<i64>) -> String {
    match minutes_since_onset {
        None => "Unknown onset time (consider imaging-based decision).".to_string(),
        Some(m) if m <= IV_TPA_WINDOW_MIN => "Within typical IV tPA window.".to_string(),
        Some(m) if m <= EXTENDED_WINDOW_MIN => {
            "Within extended window for some EVT candidates.".to_string()
        }
        Some(_) => "Outside standard IV tPA window; EVT may still be considered.".to_string(),
    }
}

/// Key clinical findings driving the prediction, including trend-derived
/// factors and up to two detected anomalies
pub fn risk_factors(
    features: &FeatureVector,
    trends: &TrendIndicators,
    anomalies: &[String],
) -> Vec<String> {
    let mut factors = Vec::new();

    if features.face_droop_present {
        factors.push("Face droop".to_string());
    }
    if features.arm_weakness_any {
        factors.push("Arm weakness".to_string());
    }
    if features.speech_abnormal_any {
        factors.push("Speech abnormality".to_string());
    }
    if let Some(gcs) = features.gcs_total {
        if gcs < 15 {
            factors.push(format!("Reduced GCS ({gcs})"));
        }
    }
    if let Some(systolic) = features.systolic_bp_mmhg {
        if systolic > 180 {
            factors.push(format!("Elevated systolic BP ({systolic})"));
        }
    }

    if trends.gcs.direction.map(|d| d.is_worsening()).unwrap_or(false) {
        factors.push("Deteriorating GCS trend".to_string());
    }
    if trends.spo2.direction.map(|d| d.is_worsening()).unwrap_or(false) {
        factors.push("Declining SpO2 trend".to_string());
    }

    for anomaly in anomalies.iter().take(2) {
        factors.push(format!("Anomaly: {anomaly}"));
    }

    factors
}
