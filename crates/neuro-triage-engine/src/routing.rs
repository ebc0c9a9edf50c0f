//! Destination facility selection.
//!
//! When large-vessel occlusion is suspected, a higher-tier facility is chosen
//! whenever one is known and its travel estimate does not exceed the
//! lower-tier estimate by more than the configured detour allowance (or the
//! lower-tier facility is unknown). Otherwise the lower tier wins when known;
//! with no facility known there is no recommendation.

use neuro_triage_core::config::RoutingConfig;
use neuro_triage_core::events::CapacityEvent;
use neuro_triage_core::prediction::{FacilityRecommendation, FeatureVector};
use tracing::debug;

/// Choose the destination facility, if any
pub fn select_facility(
    features: &FeatureVector,
    lower_tier: Option<&CapacityEvent>,
    higher_tier: Option<&CapacityEvent>,
    routing: &RoutingConfig,
) -> Option<FacilityRecommendation> {
    let lower_travel = features.travel_min_to_lower_tier;
    let higher_travel = features.travel_min_to_higher_tier;

    if features.suspected_lvo {
        if let (Some(higher), Some(travel)) = (higher_tier, higher_travel) {
            let acceptable = match lower_travel {
                None => true,
                Some(lower) => travel <= lower + routing.higher_tier_detour_min,
            };
            if acceptable {
                debug!(
                    facility_id = %higher.facility_id,
                    travel_min = travel,
                    "Routing to higher-tier facility for suspected LVO"
                );
                return Some(FacilityRecommendation {
                    facility_id: higher.facility_id.clone(),
                    facility_type: higher.tier.destination_label().to_string(),
                    travel_minutes: Some(travel),
                    extra_door_to_needle_min: higher.extra_door_to_needle_min,
                });
            }
        }
    }

    lower_tier.map(|lower| FacilityRecommendation {
        facility_id: lower.facility_id.clone(),
        facility_type: lower.tier.destination_label().to_string(),
        travel_minutes: lower_travel,
        extra_door_to_needle_min: lower.extra_door_to_needle_min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use neuro_triage_core::types::{CaseId, FacilityId, FacilityTier};

    fn capacity(id: &str, tier: FacilityTier, delay: Option<i32>) -> CapacityEvent {
        CapacityEvent {
            facility_id: FacilityId::from(id),
            facility_name: id.to_string(),
            updated_ts: Utc::now(),
            latitude: 37.7,
            longitude: -122.4,
            tier,
            has_ct_available: true,
            has_cta_available: true,
            can_perform_thrombectomy: tier.is_higher_tier(),
            ed_crowding_score: None,
            current_stroke_cases: None,
            accepting_stroke_now: true,
            extra_door_to_needle_min: delay,
            notes: None,
        }
    }

    fn features(
        suspected_lvo: bool,
        lower_travel: Option<i64>,
        higher_travel: Option<i64>,
    ) -> FeatureVector {
        FeatureVector {
            case_id: CaseId::from("C1"),
            patient_id: "PAT-1".to_string(),
            unit_id: "MEDIC-1".to_string(),
            heart_rate_bpm: None,
            systolic_bp_mmhg: None,
            diastolic_bp_mmhg: None,
            respiratory_rate_bpm: None,
            spo2_pct: None,
            gcs_total: None,
            blood_glucose_mg_dl: None,
            face_droop_present: false,
            arm_weakness_any: false,
            speech_abnormal_any: false,
            screening_score: None,
            minutes_since_onset: None,
            minutes_since_last_known_well: None,
            distance_km_to_lower_tier: None,
            distance_km_to_higher_tier: None,
            travel_min_to_lower_tier: lower_travel,
            travel_min_to_higher_tier: higher_travel,
            lower_tier_extra_door_to_needle_min: None,
            higher_tier_extra_door_to_needle_min: None,
            suspected_stroke: true,
            suspected_lvo,
            features_version: "v1".to_string(),
        }
    }

    #[test]
    fn lvo_suspected_routes_higher_within_detour() {
        let lower = capacity("F-LOW", FacilityTier::Primary, Some(8));
        let higher = capacity("F-HIGH", FacilityTier::Comprehensive, Some(12));
        let config = RoutingConfig::default();

        // 15 <= 8 + 15
        let rec = select_facility(
            &features(true, Some(8), Some(15)),
            Some(&lower),
            Some(&higher),
            &config,
        )
        .unwrap();
        assert_eq!(rec.facility_id.as_str(), "F-HIGH");
        assert_eq!(rec.facility_type, "COMPREHENSIVE_CENTER");
        assert_eq!(rec.travel_minutes, Some(15));
    }

    #[test]
    fn lvo_suspected_but_detour_too_long_routes_lower() {
        let lower = capacity("F-LOW", FacilityTier::Primary, Some(8));
        let higher = capacity("F-HIGH", FacilityTier::Comprehensive, None);
        let config = RoutingConfig::default();

        // 30 > 8 + 15
        let rec = select_facility(
            &features(true, Some(8), Some(30)),
            Some(&lower),
            Some(&higher),
            &config,
        )
        .unwrap();
        assert_eq!(rec.facility_id.as_str(), "F-LOW");
        assert_eq!(rec.facility_type, "PRIMARY_CENTER");
    }

    #[test]
    fn lvo_suspected_with_unknown_lower_routes_higher() {
        let higher = capacity("F-HIGH", FacilityTier::ThrombectomyCapable, Some(5));
        let config = RoutingConfig::default();

        let rec =
            select_facility(&features(true, None, Some(40)), None, Some(&higher), &config).unwrap();
        assert_eq!(rec.facility_id.as_str(), "F-HIGH");
        assert_eq!(rec.facility_type, "THROMBECTOMY_CAPABLE_CENTER");
    }

    #[test]
    fn no_lvo_routes_lower_regardless_of_higher_travel() {
        let lower = capacity("F-LOW", FacilityTier::Primary, Some(8));
        let higher = capacity("F-HIGH", FacilityTier::Comprehensive, Some(2));
        let config = RoutingConfig::default();

        let rec = select_facility(
            &features(false, Some(8), Some(2)),
            Some(&lower),
            Some(&higher),
            &config,
        )
        .unwrap();
        assert_eq!(rec.facility_id.as_str(), "F-LOW");
    }

    #[test]
    fn no_known_facility_yields_no_recommendation() {
        let config = RoutingConfig::default();
        assert!(select_facility(&features(true, None, None), None, None, &config).is_none());
    }
}
