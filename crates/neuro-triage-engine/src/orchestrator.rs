//! Correlation and prediction orchestration.
//!
//! Consumes dispatched events, updates the case store and trend analyzer,
//! decides readiness, and runs the evaluation pipeline: feature vector,
//! breaker-protected prediction with deterministic fallback, trend-based
//! probability adjustment, risk categorization, confidence and importance
//! scoring, facility routing, breaker-protected explanation with template
//! fallback, and emission of the enriched result.
//!
//! Failure semantics: feature-building problems are local (logged, the case
//! stays ready for the next trigger); external-call failures are fully
//! absorbed by the breaker/fallback path and never propagate past this
//! module.

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::features::build_feature_vector;
use crate::risk::{
    categorize_risk, feature_importance, prediction_confidence, risk_factors, window_assessment,
};
use crate::routing::select_facility;
use crate::services::{fallback_explanation, ExplanationService, HeuristicPredictor, PredictionService};
use crate::state::{CaseStore, FacilityCache};
use crate::trend::{TrendAnalyzer, VitalSample};
use chrono::Utc;
use neuro_triage_core::config::TriageConfig;
use neuro_triage_core::events::ChannelEvent;
use neuro_triage_core::prediction::{PredictionResult, Probabilities};
use neuro_triage_core::types::CaseId;
use neuro_triage_core::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Source label stamped on predictions that used the template fallback
const FALLBACK_EXPLANATION_SOURCE: &str = "template-fallback";

/// The main correlation engine, shared between the dispatch loop (writes)
/// and the evaluation workers (reads + evaluation)
pub struct CorrelationEngine {
    config: TriageConfig,
    store: CaseStore,
    facilities: FacilityCache,
    trends: TrendAnalyzer,

    predictor: Arc<dyn PredictionService>,
    explainer: Arc<dyn ExplanationService>,
    prediction_breaker: CircuitBreaker,
    explanation_breaker: CircuitBreaker,

    sink: mpsc::Sender<PredictionResult>,
}

impl std::fmt::Debug for CorrelationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationEngine")
            .field("cases", &self.store.len())
            .field("facilities", &self.facilities.len())
            .finish()
    }
}

impl CorrelationEngine {
    /// Create an engine with injected services and an emission sink
    pub fn new(
        config: TriageConfig,
        predictor: Arc<dyn PredictionService>,
        explainer: Arc<dyn ExplanationService>,
        sink: mpsc::Sender<PredictionResult>,
    ) -> Self {
        let prediction_breaker = CircuitBreaker::new(
            "prediction",
            BreakerConfig {
                failure_threshold: config.prediction.failure_threshold,
                success_threshold: config.prediction.success_threshold,
                timeout: config.prediction.recovery_timeout(),
            },
        );
        let explanation_breaker = CircuitBreaker::new(
            "explanation",
            BreakerConfig {
                failure_threshold: config.explanation.failure_threshold,
                success_threshold: config.explanation.success_threshold,
                timeout: config.explanation.recovery_timeout(),
            },
        );
        let trends = TrendAnalyzer::new(config.engine.trend_window);

        info!(
            predictor = predictor.name(),
            explainer = explainer.name(),
            trend_window = config.engine.trend_window,
            "Correlation engine initialized"
        );

        Self {
            config,
            store: CaseStore::new(),
            facilities: FacilityCache::new(),
            trends,
            predictor,
            explainer,
            prediction_breaker,
            explanation_breaker,
            sink,
        }
    }

    /// Apply one dispatched event. Returns the cases whose evaluation should
    /// be enqueued:
    /// - readings always retrigger their case once it is joined
    /// - screenings trigger only not-yet-evaluated cases
    /// - capacity snapshots may unblock any case still awaiting evaluation
    pub fn handle_event(&self, event: ChannelEvent) -> Vec<CaseId> {
        match event {
            ChannelEvent::Vitals(reading) => {
                let case_id = reading.case_id.clone();
                self.trends.record(&case_id, VitalSample::from(&reading));
                if self.store.apply_vitals(reading) {
                    vec![case_id]
                } else {
                    Vec::new()
                }
            }
            ChannelEvent::Screening(screening) => {
                let case_id = screening.case_id.clone();
                if self.store.apply_screening(screening) {
                    vec![case_id]
                } else {
                    Vec::new()
                }
            }
            ChannelEvent::Capacity(capacity) => {
                debug!(facility_id = %capacity.facility_id, "Capacity snapshot updated");
                self.facilities.upsert(capacity);
                self.store.ready_cases()
            }
        }
    }

    /// Run one evaluation for a case. A no-op when the case is not in ready
    /// phase (not yet joined, or a stale queue entry after evaluation).
    pub async fn evaluate(&self, case_id: &CaseId) -> Result<()> {
        let Some((reading, screening)) = self.store.ready_snapshot(case_id) else {
            debug!(case_id = %case_id, "Skipping evaluation, case not ready");
            return Ok(());
        };
        let evaluated_sequence = reading.sequence_number;

        let trend_indicators = self.trends.trends(case_id);
        let anomalies = self.trends.anomalies(case_id);

        let lower_tier = self.facilities.lower_tier();
        let higher_tier = self.facilities.higher_tier();

        let features = match build_feature_vector(
            &reading,
            &screening,
            lower_tier.as_ref(),
            higher_tier.as_ref(),
            &self.config.engine,
            &self.config.routing,
        ) {
            Ok(features) => features,
            Err(err) => {
                // Local failure: the case stays ready for the next trigger
                error!(case_id = %case_id, error = %err, "Feature vector build failed");
                ::metrics::counter!("triage_feature_build_failures_total").increment(1);
                return Ok(());
            }
        };

        // Breaker-protected prediction with deterministic degraded path
        let raw_probs = match self
            .prediction_breaker
            .call(self.predictor.predict(&features))
            .await
        {
            Ok(probs) => probs,
            Err(err) => {
                warn!(
                    case_id = %case_id,
                    error = %err,
                    breaker_open = err.is_breaker_open(),
                    "Prediction call failed, using heuristic fallback"
                );
                ::metrics::counter!("triage_prediction_fallbacks_total").increment(1);
                HeuristicPredictor::score(&features)
            }
        };

        let probs = self.adjust_for_trends(raw_probs, &trend_indicators);
        let risk = categorize_risk(probs);
        let confidence = prediction_confidence(&features, &trend_indicators);
        let importance = feature_importance(&features);

        let recommendation = select_facility(
            &features,
            lower_tier.as_ref(),
            higher_tier.as_ref(),
            &self.config.routing,
        );
        let facility_id = recommendation.as_ref().map(|r| r.facility_id.clone());

        // Breaker-protected explanation with mandatory template fallback
        let (explanation, explanation_source) = match self
            .explanation_breaker
            .call(self.explainer.explain(&features, probs, risk, facility_id.as_ref()))
            .await
        {
            Ok(explanation) => (explanation, self.explainer.name().to_string()),
            Err(err) => {
                warn!(
                    case_id = %case_id,
                    error = %err,
                    breaker_open = err.is_breaker_open(),
                    "Explanation call failed, using template fallback"
                );
                ::metrics::counter!("triage_explanation_fallbacks_total").increment(1);
                (
                    fallback_explanation(&features, probs, risk, facility_id.as_ref()),
                    FALLBACK_EXPLANATION_SOURCE.to_string(),
                )
            }
        };

        let factors = risk_factors(&features, &trend_indicators, &anomalies);
        let assessment = window_assessment(features.minutes_since_onset);

        let result = PredictionResult {
            prediction_id: new_prediction_id(),
            case_id: case_id.clone(),
            patient_id: features.patient_id.clone(),
            prediction_ts: Utc::now(),
            model_name: self.config.prediction.model_name.clone(),
            model_version: self.config.prediction.model_version.clone(),
            stroke_probability: probs.stroke,
            lvo_probability: probs.lvo,
            risk_category: risk,
            recommended_facility_id: recommendation.as_ref().map(|r| r.facility_id.clone()),
            recommended_facility_type: recommendation.as_ref().map(|r| r.facility_type.clone()),
            travel_minutes: recommendation.as_ref().and_then(|r| r.travel_minutes),
            extra_door_to_needle_min: recommendation
                .as_ref()
                .and_then(|r| r.extra_door_to_needle_min),
            window_assessment: assessment,
            onset_minutes: features.minutes_since_onset,
            risk_factors: factors,
            explanation_summary: explanation.summary,
            recommended_actions: explanation.actions,
            explanation_source,
            confidence,
            trend_indicators,
            anomalies,
            feature_importance: importance,
        };

        info!(
            case_id = %case_id,
            prediction_id = %result.prediction_id,
            risk = %result.risk_category,
            stroke_probability = result.stroke_probability,
            lvo_probability = result.lvo_probability,
            confidence = result.confidence,
            facility = ?result.recommended_facility_id,
            "Evaluation complete"
        );
        ::metrics::counter!("triage_evaluations_total").increment(1);

        if self.sink.send(result).await.is_err() {
            warn!(case_id = %case_id, "Prediction sink closed, result dropped");
        }

        self.store.mark_evaluated(case_id, evaluated_sequence);
        Ok(())
    }

    /// Raise probabilities when consciousness or oxygen-saturation trends are
    /// deteriorating fast enough, capped at 1.0
    fn adjust_for_trends(
        &self,
        probs: Probabilities,
        trends: &neuro_triage_core::prediction::TrendIndicators,
    ) -> Probabilities {
        let engine = &self.config.engine;
        let mut stroke = probs.stroke;
        let mut lvo = probs.lvo;

        if trends.gcs.worsening_faster_than(engine.gcs_deterioration_rate) {
            stroke += engine.gcs_stroke_increment;
            lvo += engine.gcs_lvo_increment;
        }
        if trends.spo2.worsening_faster_than(engine.spo2_deterioration_rate) {
            stroke += engine.spo2_stroke_increment;
        }

        Probabilities::clamped(stroke, lvo)
    }

    /// Shared facility cache (exposed for wiring and inspection)
    pub fn facilities(&self) -> &FacilityCache {
        &self.facilities
    }

    /// Case store (exposed for wiring and inspection)
    pub fn store(&self) -> &CaseStore {
        &self.store
    }
}

fn new_prediction_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("PRED-{}", raw[..10].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use neuro_triage_core::events::{CapacityEvent, ScreeningEvent, VitalsEvent};
    use neuro_triage_core::types::{
        ArmFinding, FaceFinding, FacilityId, FacilityTier, RiskCategory, SpeechFinding,
    };
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Programmable predictor: fixed probabilities, switchable failure
    struct ScriptedPredictor {
        probs: Probabilities,
        fail: AtomicBool,
        calls: AtomicU32,
    }

    impl ScriptedPredictor {
        fn new(stroke: f64, lvo: f64) -> Self {
            Self {
                probs: Probabilities { stroke, lvo },
                fail: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PredictionService for ScriptedPredictor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn predict(&self, _features: &neuro_triage_core::prediction::FeatureVector) -> Result<Probabilities> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(neuro_triage_core::Error::dependency("prediction", "scripted failure"))
            } else {
                Ok(self.probs)
            }
        }
    }

    struct FailingExplainer;

    #[async_trait]
    impl ExplanationService for FailingExplainer {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn explain(
            &self,
            _features: &neuro_triage_core::prediction::FeatureVector,
            _probs: Probabilities,
            _risk: RiskCategory,
            _facility: Option<&FacilityId>,
        ) -> Result<crate::services::Explanation> {
            Err(neuro_triage_core::Error::dependency("explanation", "scripted failure"))
        }
    }

    fn base_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading(case: &str, sequence: u64, minute: i64) -> VitalsEvent {
        VitalsEvent {
            case_id: CaseId::from(case),
            patient_id: "PAT-1".to_string(),
            unit_id: "MEDIC-1".to_string(),
            event_ts: base_time() + Duration::minutes(minute),
            sequence_number: sequence,
            heart_rate_bpm: Some(92),
            systolic_bp_mmhg: Some(150),
            diastolic_bp_mmhg: Some(88),
            respiratory_rate_bpm: Some(16),
            spo2_pct: Some(96),
            temperature_c: None,
            gcs_total: Some(14),
            blood_glucose_mg_dl: Some(110),
            ecg_rhythm: None,
            is_artifact_suspected: false,
            source_device: None,
        }
    }

    fn screening(case: &str, score: i32) -> ScreeningEvent {
        ScreeningEvent {
            case_id: CaseId::from(case),
            patient_id: "PAT-1".to_string(),
            unit_id: "MEDIC-1".to_string(),
            exam_ts: base_time(),
            face_droop: FaceFinding::Present,
            arm_weakness: ArmFinding::Left,
            speech_difficulty: SpeechFinding::Dysarthria,
            symptom_onset_ts: Some(base_time() - Duration::minutes(45)),
            last_known_well_ts: Some(base_time() - Duration::minutes(60)),
            prestroke_disability: Some(0),
            suspected_stroke_side: None,
            screening_score: Some(score),
            suspected_stroke: true,
            notes: None,
        }
    }

    fn capacity(id: &str, tier: FacilityTier, delay: Option<i32>) -> CapacityEvent {
        CapacityEvent {
            facility_id: FacilityId::from(id),
            facility_name: id.to_string(),
            updated_ts: base_time(),
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

    fn engine_with(
        predictor: Arc<dyn PredictionService>,
        explainer: Arc<dyn ExplanationService>,
    ) -> (CorrelationEngine, mpsc::Receiver<PredictionResult>) {
        let (tx, rx) = mpsc::channel(16);
        let engine = CorrelationEngine::new(TriageConfig::default(), predictor, explainer, tx);
        (engine, rx)
    }

    #[tokio::test]
    async fn evaluation_requires_both_streams() {
        let predictor = Arc::new(ScriptedPredictor::new(0.5, 0.1));
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        let triggers = engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        assert!(triggers.is_empty());

        // Even a direct evaluation attempt is a no-op before the join
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        assert_eq!(predictor.calls(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn joined_case_is_evaluated_once() {
        let predictor = Arc::new(ScriptedPredictor::new(0.82, 0.1));
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        let triggers = engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        assert_eq!(triggers.len(), 1);

        engine.evaluate(&triggers[0]).await.unwrap();
        let result = rx.recv().await.unwrap();
        assert_eq!(result.case_id.as_str(), "C1");
        assert_eq!(result.risk_category, RiskCategory::Critical);
        assert_eq!(result.stroke_probability, 0.82);
        assert!(result.prediction_id.starts_with("PRED-"));
        assert_eq!(predictor.calls(), 1);

        // Stale queue entry after evaluation is a no-op
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        assert_eq!(predictor.calls(), 1);
    }

    #[tokio::test]
    async fn new_reading_retriggers_evaluated_case() {
        let predictor = Arc::new(ScriptedPredictor::new(0.4, 0.1));
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        rx.recv().await.unwrap();

        let triggers = engine.handle_event(ChannelEvent::Vitals(reading("C1", 2, 1)));
        assert_eq!(triggers.len(), 1);
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.case_id.as_str(), "C1");
        assert_eq!(predictor.calls(), 2);
    }

    #[tokio::test]
    async fn screening_resend_does_not_retrigger() {
        let predictor = Arc::new(ScriptedPredictor::new(0.4, 0.1));
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        rx.recv().await.unwrap();

        let triggers = engine.handle_event(ChannelEvent::Screening(screening("C1", 3)));
        assert!(triggers.is_empty());
        assert_eq!(predictor.calls(), 1);
    }

    #[tokio::test]
    async fn capacity_update_unblocks_ready_cases() {
        let predictor = Arc::new(ScriptedPredictor::new(0.4, 0.5));
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));

        let triggers = engine.handle_event(ChannelEvent::Capacity(capacity(
            "F-HIGH",
            FacilityTier::Comprehensive,
            Some(10),
        )));
        assert_eq!(triggers, vec![CaseId::from("C1")]);

        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        let result = rx.recv().await.unwrap();
        // LVO suspected (score 2) and only a higher-tier facility known
        assert_eq!(
            result.recommended_facility_id,
            Some(FacilityId::from("F-HIGH"))
        );
        assert_eq!(
            result.recommended_facility_type.as_deref(),
            Some("COMPREHENSIVE_CENTER")
        );
    }

    #[tokio::test]
    async fn prediction_failure_uses_heuristic_fallback() {
        let predictor = Arc::new(ScriptedPredictor::new(0.9, 0.9));
        predictor.set_failing(true);
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(predictor.calls(), 1);
        // Probabilities come from the deterministic rules, not the scripted 0.9
        assert!(result.stroke_probability < 0.9);
        assert!(result.stroke_probability > 0.0);
    }

    #[tokio::test]
    async fn open_breaker_skips_prediction_calls() {
        let predictor = Arc::new(ScriptedPredictor::new(0.9, 0.9));
        predictor.set_failing(true);
        let (engine, mut rx) =
            engine_with(predictor.clone(), Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        // Default failure threshold is 3: three failing evaluations open the
        // breaker, the fourth never reaches the predictor
        for sequence in 1..=4 {
            engine.handle_event(ChannelEvent::Vitals(reading("C1", sequence, sequence as i64)));
            engine.evaluate(&CaseId::from("C1")).await.unwrap();
            rx.recv().await.unwrap();
        }
        assert_eq!(predictor.calls(), 3);
    }

    #[tokio::test]
    async fn explanation_failure_uses_template_fallback() {
        let predictor = Arc::new(ScriptedPredictor::new(0.5, 0.1));
        let (engine, mut rx) = engine_with(predictor, Arc::new(FailingExplainer));

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1, 0)));
        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.explanation_source, "template-fallback");
        assert!(!result.explanation_summary.is_empty());
        assert!(!result.recommended_actions.is_empty());
    }

    #[tokio::test]
    async fn identical_state_yields_identical_decision() {
        let predictor = Arc::new(ScriptedPredictor::new(0.62, 0.3));
        let (engine, mut rx) =
            engine_with(predictor, Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Capacity(capacity(
            "F-LOW",
            FacilityTier::Primary,
            Some(12),
        )));
        engine.handle_event(ChannelEvent::Capacity(capacity(
            "F-HIGH",
            FacilityTier::Comprehensive,
            Some(15),
        )));

        let same_reading = reading("C1", 1, 0);
        engine.handle_event(ChannelEvent::Vitals(same_reading.clone()));
        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        let first = rx.recv().await.unwrap();

        // Re-send the identical reading: same joined state, new evaluation
        engine.handle_event(ChannelEvent::Vitals(same_reading));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(first.stroke_probability, second.stroke_probability);
        assert_eq!(first.lvo_probability, second.lvo_probability);
        assert_eq!(first.risk_category, second.risk_category);
        assert_eq!(first.recommended_facility_id, second.recommended_facility_id);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.feature_importance, second.feature_importance);
    }

    #[tokio::test]
    async fn worsening_gcs_trend_raises_probabilities() {
        let predictor = Arc::new(ScriptedPredictor::new(0.5, 0.2));
        let (engine, mut rx) =
            engine_with(predictor, Arc::new(crate::services::TemplateExplainer::new()));

        engine.handle_event(ChannelEvent::Screening(screening("C1", 2)));

        // GCS falls from 14 to 11 over three minutes: rate -1.0/min
        let mut first = reading("C1", 1, 0);
        first.gcs_total = Some(14);
        engine.handle_event(ChannelEvent::Vitals(first));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        let baseline = rx.recv().await.unwrap();

        let mut second = reading("C1", 2, 3);
        second.gcs_total = Some(11);
        engine.handle_event(ChannelEvent::Vitals(second));
        engine.evaluate(&CaseId::from("C1")).await.unwrap();
        let adjusted = rx.recv().await.unwrap();

        assert!(adjusted.stroke_probability > baseline.stroke_probability);
        assert!(adjusted.lvo_probability > baseline.lvo_probability);
        assert!(adjusted.stroke_probability <= 1.0);
    }
}
