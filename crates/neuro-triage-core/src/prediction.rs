//! Derived feature vectors and the enriched prediction emitted per case.

use crate::types::{CaseId, FacilityId, RiskCategory, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stroke / large-vessel-occlusion probability pair, both in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub stroke: f64,
    pub lvo: f64,
}

impl Probabilities {
    /// Build a pair clamped into the valid range
    pub fn clamped(stroke: f64, lvo: f64) -> Self {
        Self {
            stroke: stroke.clamp(0.0, 1.0),
            lvo: lvo.clamp(0.0, 1.0),
        }
    }

    /// True when both values are already within `[0, 1]`
    pub fn in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.stroke) && (0.0..=1.0).contains(&self.lvo)
    }
}

/// Feature vector built fresh on each evaluation from the joined case state.
/// Ephemeral: never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub case_id: CaseId,
    pub patient_id: String,
    pub unit_id: String,

    pub heart_rate_bpm: Option<i32>,
    pub systolic_bp_mmhg: Option<i32>,
    pub diastolic_bp_mmhg: Option<i32>,
    pub respiratory_rate_bpm: Option<i32>,
    pub spo2_pct: Option<i32>,
    pub gcs_total: Option<i32>,
    pub blood_glucose_mg_dl: Option<i32>,

    pub face_droop_present: bool,
    pub arm_weakness_any: bool,
    pub speech_abnormal_any: bool,
    pub screening_score: Option<i32>,

    pub minutes_since_onset: Option<i64>,
    pub minutes_since_last_known_well: Option<i64>,

    pub distance_km_to_lower_tier: Option<f64>,
    pub distance_km_to_higher_tier: Option<f64>,
    pub travel_min_to_lower_tier: Option<i64>,
    pub travel_min_to_higher_tier: Option<i64>,

    pub lower_tier_extra_door_to_needle_min: Option<i32>,
    pub higher_tier_extra_door_to_needle_min: Option<i32>,

    pub suspected_stroke: bool,
    pub suspected_lvo: bool,

    pub features_version: String,
}

/// Trend summary for one tracked vital
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalTrend {
    /// Units per minute over the window; `None` below 2 points or zero elapsed
    pub rate_of_change: Option<f64>,
    /// Clinical-polarity direction; `None` when rate is undefined
    pub direction: Option<TrendDirection>,
    /// Coefficient of variation; `None` below 2 points or zero mean
    pub volatility: Option<f64>,
    /// Exponential-decay recency-weighted delta; `None` below 2 recent points
    pub recent_change: Option<f64>,
}

impl VitalTrend {
    /// True when the trend is worsening at or past the given (signed) rate
    pub fn worsening_faster_than(&self, rate_threshold: f64) -> bool {
        self.direction.map(|d| d.is_worsening()).unwrap_or(false)
            && self.rate_of_change.map(|r| r < rate_threshold).unwrap_or(false)
    }
}

/// Per-vital trend features derived from the reading history window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendIndicators {
    pub heart_rate: VitalTrend,
    pub systolic_pressure: VitalTrend,
    pub spo2: VitalTrend,
    pub gcs: VitalTrend,
}

/// Routing recommendation attached to a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityRecommendation {
    pub facility_id: FacilityId,
    pub facility_type: String,
    pub travel_minutes: Option<i64>,
    pub extra_door_to_needle_min: Option<i32>,
}

/// Enriched risk assessment emitted once per evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction_id: String,
    pub case_id: CaseId,
    pub patient_id: String,
    pub prediction_ts: DateTime<Utc>,

    pub model_name: String,
    pub model_version: String,

    pub stroke_probability: f64,
    pub lvo_probability: f64,
    pub risk_category: RiskCategory,

    pub recommended_facility_id: Option<FacilityId>,
    pub recommended_facility_type: Option<String>,
    pub travel_minutes: Option<i64>,
    pub extra_door_to_needle_min: Option<i32>,

    pub window_assessment: String,
    pub onset_minutes: Option<i64>,

    pub risk_factors: Vec<String>,

    pub explanation_summary: String,
    pub recommended_actions: Vec<String>,
    pub explanation_source: String,

    pub confidence: f64,
    pub trend_indicators: TrendIndicators,
    pub anomalies: Vec<String>,
    pub feature_importance: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probabilities_clamp() {
        let p = Probabilities::clamped(1.4, -0.2);
        assert_eq!(p.stroke, 1.0);
        assert_eq!(p.lvo, 0.0);
        assert!(p.in_range());
    }

    #[test]
    fn worsening_faster_than_requires_both() {
        let trend = VitalTrend {
            rate_of_change: Some(-0.5),
            direction: Some(TrendDirection::Worsening),
            volatility: None,
            recent_change: None,
        };
        assert!(trend.worsening_faster_than(-0.1));
        assert!(!trend.worsening_faster_than(-1.0));

        let stable = VitalTrend {
            rate_of_change: Some(-0.5),
            direction: Some(TrendDirection::Stable),
            ..Default::default()
        };
        assert!(!stable.worsening_faster_than(-0.1));

        assert!(!VitalTrend::default().worsening_faster_than(-0.1));
    }
}
