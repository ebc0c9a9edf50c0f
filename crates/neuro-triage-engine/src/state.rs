//! Per-case latest-value store and the shared facility-capacity cache.
//!
//! Ingestion is the single writer; evaluation workers read concurrently.
//! Locks are never held across an await point.

use neuro_triage_core::events::{CapacityEvent, ScreeningEvent, VitalsEvent};
use neuro_triage_core::types::{CaseId, FacilityId};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Per-case evaluation lifecycle.
///
/// `AwaitingData -> Ready -> Evaluated`, with `Evaluated -> Ready` re-entry
/// on every new reading for an already-evaluated case. Screening and
/// capacity updates never move a case out of `Evaluated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPhase {
    /// Required joined data not yet present
    AwaitingData,
    /// Both a current reading and a current screening exist
    Ready,
    /// An enriched prediction has been emitted for the current state
    Evaluated,
}

/// Joined state for one case
#[derive(Debug, Clone)]
pub struct CaseState {
    pub reading: Option<VitalsEvent>,
    pub screening: Option<ScreeningEvent>,
    pub phase: EvaluationPhase,
}

impl CaseState {
    fn new() -> Self {
        Self {
            reading: None,
            screening: None,
            phase: EvaluationPhase::AwaitingData,
        }
    }

    fn is_joined(&self) -> bool {
        self.reading.is_some() && self.screening.is_some()
    }
}

/// Latest-value cache for case-scoped events.
///
/// At most one current reading and one current screening exist per case;
/// later writes overwrite earlier ones. Case state is created on first
/// referencing event and never explicitly destroyed here.
#[derive(Debug, Default)]
pub struct CaseStore {
    cases: RwLock<HashMap<CaseId, CaseState>>,
}

impl CaseStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a reading. Returns `true` when the case should be (re-)evaluated:
    /// readings always retrigger evaluation once the case is joined.
    pub fn apply_vitals(&self, event: VitalsEvent) -> bool {
        let case_id = event.case_id.clone();
        let mut cases = self.cases.write().unwrap();
        let state = cases.entry(case_id.clone()).or_insert_with(CaseState::new);
        state.reading = Some(event);

        if !state.is_joined() {
            debug!(case_id = %case_id, "Reading stored, screening still missing");
            return false;
        }
        if state.phase == EvaluationPhase::Evaluated {
            debug!(case_id = %case_id, "New reading reopens evaluated case");
        }
        state.phase = EvaluationPhase::Ready;
        true
    }

    /// Apply a screening result. Returns `true` when the case should be
    /// evaluated: screenings trigger evaluation only for cases not yet
    /// evaluated.
    pub fn apply_screening(&self, event: ScreeningEvent) -> bool {
        let case_id = event.case_id.clone();
        let mut cases = self.cases.write().unwrap();
        let state = cases.entry(case_id.clone()).or_insert_with(CaseState::new);
        state.screening = Some(event);

        if state.phase == EvaluationPhase::Evaluated {
            debug!(case_id = %case_id, "Screening update for evaluated case, no retrigger");
            return false;
        }
        if state.is_joined() {
            state.phase = EvaluationPhase::Ready;
            true
        } else {
            false
        }
    }

    /// Current phase for a case, if known
    pub fn phase(&self, case_id: &CaseId) -> Option<EvaluationPhase> {
        self.cases.read().unwrap().get(case_id).map(|s| s.phase)
    }

    /// Snapshot the joined state for evaluation. Returns `None` unless the
    /// case is in `Ready` phase with both events present.
    pub fn ready_snapshot(&self, case_id: &CaseId) -> Option<(VitalsEvent, ScreeningEvent)> {
        let cases = self.cases.read().unwrap();
        let state = cases.get(case_id)?;
        if state.phase != EvaluationPhase::Ready {
            return None;
        }
        match (&state.reading, &state.screening) {
            (Some(reading), Some(screening)) => Some((reading.clone(), screening.clone())),
            _ => None,
        }
    }

    /// Mark a case evaluated, unless a newer reading already returned it to
    /// `Ready` (the evaluation for that state is still queued).
    pub fn mark_evaluated(&self, case_id: &CaseId, evaluated_sequence: u64) {
        let mut cases = self.cases.write().unwrap();
        if let Some(state) = cases.get_mut(case_id) {
            let current_sequence = state.reading.as_ref().map(|r| r.sequence_number);
            if current_sequence == Some(evaluated_sequence) {
                state.phase = EvaluationPhase::Evaluated;
            } else {
                debug!(
                    case_id = %case_id,
                    "Newer reading arrived during evaluation, case stays ready"
                );
            }
        }
    }

    /// All cases currently in `Ready` phase (used when a capacity update may
    /// unblock pending evaluations)
    pub fn ready_cases(&self) -> Vec<CaseId> {
        self.cases
            .read()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.phase == EvaluationPhase::Ready)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of tracked cases
    pub fn len(&self) -> usize {
        self.cases.read().unwrap().len()
    }

    /// True when no case has been seen yet
    pub fn is_empty(&self) -> bool {
        self.cases.read().unwrap().is_empty()
    }
}

/// Shared capacity cache keyed by facility id, latest write wins
#[derive(Debug, Default)]
pub struct FacilityCache {
    facilities: RwLock<HashMap<FacilityId, CapacityEvent>>,
}

impl FacilityCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the snapshot for a facility
    pub fn upsert(&self, event: CapacityEvent) {
        let mut facilities = self.facilities.write().unwrap();
        facilities.insert(event.facility_id.clone(), event);
    }

    /// Latest snapshot for a facility
    pub fn get(&self, facility_id: &FacilityId) -> Option<CapacityEvent> {
        self.facilities.read().unwrap().get(facility_id).cloned()
    }

    /// Best known lower-tier facility: least extra processing delay, ties
    /// broken by facility id for determinism.
    pub fn lower_tier(&self) -> Option<CapacityEvent> {
        self.select(|f| !f.tier.is_higher_tier())
    }

    /// Best known higher-tier facility
    pub fn higher_tier(&self) -> Option<CapacityEvent> {
        self.select(|f| f.tier.is_higher_tier())
    }

    fn select(&self, pred: impl Fn(&CapacityEvent) -> bool) -> Option<CapacityEvent> {
        let facilities = self.facilities.read().unwrap();
        facilities
            .values()
            .filter(|f| pred(f))
            .min_by_key(|f| {
                (
                    f.extra_door_to_needle_min.unwrap_or(i32::MAX),
                    f.facility_id.as_str().to_string(),
                )
            })
            .cloned()
    }

    /// Number of known facilities
    pub fn len(&self) -> usize {
        self.facilities.read().unwrap().len()
    }

    /// True when no capacity snapshot has been seen yet
    pub fn is_empty(&self) -> bool {
        self.facilities.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use neuro_triage_core::types::{
        ArmFinding, FaceFinding, FacilityTier, SpeechFinding,
    };

    fn reading(case: &str, sequence: u64) -> VitalsEvent {
        VitalsEvent {
            case_id: CaseId::from(case),
            patient_id: "PAT-1".to_string(),
            unit_id: "MEDIC-1".to_string(),
            event_ts: Utc::now(),
            sequence_number: sequence,
            heart_rate_bpm: Some(90),
            systolic_bp_mmhg: Some(140),
            diastolic_bp_mmhg: Some(85),
            respiratory_rate_bpm: Some(16),
            spo2_pct: Some(97),
            temperature_c: None,
            gcs_total: Some(15),
            blood_glucose_mg_dl: None,
            ecg_rhythm: None,
            is_artifact_suspected: false,
            source_device: None,
        }
    }

    fn screening(case: &str) -> ScreeningEvent {
        ScreeningEvent {
            case_id: CaseId::from(case),
            patient_id: "PAT-1".to_string(),
            unit_id: "MEDIC-1".to_string(),
            exam_ts: Utc::now(),
            face_droop: FaceFinding::Present,
            arm_weakness: ArmFinding::Left,
            speech_difficulty: SpeechFinding::Absent,
            symptom_onset_ts: None,
            last_known_well_ts: None,
            prestroke_disability: None,
            suspected_stroke_side: None,
            screening_score: Some(2),
            suspected_stroke: true,
            notes: None,
        }
    }

    fn capacity(id: &str, tier: FacilityTier, delay: Option<i32>) -> CapacityEvent {
        CapacityEvent {
            facility_id: FacilityId::from(id),
            facility_name: format!("Facility {id}"),
            updated_ts: Utc::now(),
            latitude: 37.7,
            longitude: -122.4,
            tier,
            has_ct_available: true,
            has_cta_available: true,
            can_perform_thrombectomy: tier.is_higher_tier(),
            ed_crowding_score: Some(30),
            current_stroke_cases: Some(1),
            accepting_stroke_now: true,
            extra_door_to_needle_min: delay,
            notes: None,
        }
    }

    #[test]
    fn reading_alone_does_not_trigger() {
        let store = CaseStore::new();
        assert!(!store.apply_vitals(reading("C1", 1)));
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::AwaitingData));
    }

    #[test]
    fn join_completes_via_screening() {
        let store = CaseStore::new();
        store.apply_vitals(reading("C1", 1));
        assert!(store.apply_screening(screening("C1")));
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::Ready));
        assert!(store.ready_snapshot(&CaseId::from("C1")).is_some());
    }

    #[test]
    fn join_completes_via_reading() {
        let store = CaseStore::new();
        assert!(!store.apply_screening(screening("C2")));
        assert!(store.apply_vitals(reading("C2", 1)));
    }

    #[test]
    fn reading_retriggers_evaluated_case() {
        let store = CaseStore::new();
        store.apply_vitals(reading("C1", 1));
        store.apply_screening(screening("C1"));
        store.mark_evaluated(&CaseId::from("C1"), 1);
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::Evaluated));

        assert!(store.apply_vitals(reading("C1", 2)));
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::Ready));
    }

    #[test]
    fn screening_does_not_retrigger_evaluated_case() {
        let store = CaseStore::new();
        store.apply_vitals(reading("C1", 1));
        store.apply_screening(screening("C1"));
        store.mark_evaluated(&CaseId::from("C1"), 1);

        assert!(!store.apply_screening(screening("C1")));
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::Evaluated));
    }

    #[test]
    fn mark_evaluated_skipped_when_newer_reading_arrived() {
        let store = CaseStore::new();
        store.apply_vitals(reading("C1", 1));
        store.apply_screening(screening("C1"));

        // A newer reading lands while the evaluation for sequence 1 runs
        store.apply_vitals(reading("C1", 2));
        store.mark_evaluated(&CaseId::from("C1"), 1);
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::Ready));

        store.mark_evaluated(&CaseId::from("C1"), 2);
        assert_eq!(store.phase(&CaseId::from("C1")), Some(EvaluationPhase::Evaluated));
    }

    #[test]
    fn ready_snapshot_requires_ready_phase() {
        let store = CaseStore::new();
        store.apply_vitals(reading("C1", 1));
        assert!(store.ready_snapshot(&CaseId::from("C1")).is_none());

        store.apply_screening(screening("C1"));
        assert!(store.ready_snapshot(&CaseId::from("C1")).is_some());

        store.mark_evaluated(&CaseId::from("C1"), 1);
        assert!(store.ready_snapshot(&CaseId::from("C1")).is_none());
    }

    #[test]
    fn facility_upsert_replaces_by_id() {
        let cache = FacilityCache::new();
        cache.upsert(capacity("F1", FacilityTier::Primary, Some(20)));
        cache.upsert(capacity("F1", FacilityTier::Primary, Some(5)));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache
                .get(&FacilityId::from("F1"))
                .unwrap()
                .extra_door_to_needle_min,
            Some(5)
        );
    }

    #[test]
    fn tier_selection_prefers_least_delay() {
        let cache = FacilityCache::new();
        cache.upsert(capacity("F-LOW-A", FacilityTier::Primary, Some(25)));
        cache.upsert(capacity("F-LOW-B", FacilityTier::Primary, Some(10)));
        cache.upsert(capacity("F-HIGH-A", FacilityTier::Comprehensive, Some(15)));
        cache.upsert(capacity("F-HIGH-B", FacilityTier::ThrombectomyCapable, None));

        assert_eq!(cache.lower_tier().unwrap().facility_id.as_str(), "F-LOW-B");
        assert_eq!(cache.higher_tier().unwrap().facility_id.as_str(), "F-HIGH-A");
    }
}
