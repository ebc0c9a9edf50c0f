//! Feature vector assembly from the joined case state.
//!
//! Pure computation with no suspension points: merges the current reading,
//! screening-derived booleans, elapsed-time features, and capacity-derived
//! routing inputs into the vector handed to the prediction dependency.

use chrono::{DateTime, Utc};
use neuro_triage_core::config::{EngineConfig, RoutingConfig};
use neuro_triage_core::events::{CapacityEvent, ScreeningEvent, VitalsEvent};
use neuro_triage_core::prediction::FeatureVector;
use neuro_triage_core::Result;

/// Screening score at or above which LVO is suspected
const LVO_SUSPICION_SCORE: i32 = 2;

/// Whole minutes between two timestamps (floor); `None` when either is
/// missing
pub fn minutes_between(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Option<i64> {
    let start = start?;
    Some((end - start).num_minutes())
}

/// Build the feature vector for one evaluation.
///
/// Travel and distance estimates are configuration constants; per-facility
/// processing-delay extras come from the capacity cache when known.
pub fn build_feature_vector(
    reading: &VitalsEvent,
    screening: &ScreeningEvent,
    lower_tier: Option<&CapacityEvent>,
    higher_tier: Option<&CapacityEvent>,
    engine: &EngineConfig,
    routing: &RoutingConfig,
) -> Result<FeatureVector> {
    let now = reading.event_ts;

    let minutes_since_onset = minutes_between(screening.symptom_onset_ts, now);
    let minutes_since_last_known_well = minutes_between(screening.last_known_well_ts, now);

    let screening_score = screening.screening_score;
    let suspected_lvo = screening_score
        .map(|score| score >= LVO_SUSPICION_SCORE)
        .unwrap_or(false);

    Ok(FeatureVector {
        case_id: reading.case_id.clone(),
        patient_id: reading.patient_id.clone(),
        unit_id: reading.unit_id.clone(),

        heart_rate_bpm: reading.heart_rate_bpm,
        systolic_bp_mmhg: reading.systolic_bp_mmhg,
        diastolic_bp_mmhg: reading.diastolic_bp_mmhg,
        respiratory_rate_bpm: reading.respiratory_rate_bpm,
        spo2_pct: reading.spo2_pct,
        gcs_total: reading.gcs_total,
        blood_glucose_mg_dl: reading.blood_glucose_mg_dl,

        face_droop_present: screening.face_droop == neuro_triage_core::types::FaceFinding::Present,
        arm_weakness_any: screening.arm_weakness.any_weakness(),
        speech_abnormal_any: screening.speech_difficulty.any_abnormality(),
        screening_score,

        minutes_since_onset,
        minutes_since_last_known_well,

        distance_km_to_lower_tier: lower_tier.map(|_| routing.distance_km_to_lower_tier),
        distance_km_to_higher_tier: higher_tier.map(|_| routing.distance_km_to_higher_tier),
        travel_min_to_lower_tier: lower_tier.map(|_| routing.travel_min_to_lower_tier),
        travel_min_to_higher_tier: higher_tier.map(|_| routing.travel_min_to_higher_tier),

        lower_tier_extra_door_to_needle_min: lower_tier.and_then(|f| f.extra_door_to_needle_min),
        higher_tier_extra_door_to_needle_min: higher_tier.and_then(|f| f.extra_door_to_needle_min),

        suspected_stroke: screening.suspected_stroke,
        suspected_lvo,

        features_version: engine.features_version.clone(),
    })
}
