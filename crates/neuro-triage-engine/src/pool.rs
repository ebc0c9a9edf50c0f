//! Striped evaluation worker pool.
//!
//! External prediction/explanation calls must not block ingestion of
//! unrelated events, so evaluations run on a bounded pool of workers. Cases
//! are hashed to a stripe: every evaluation for one case runs on the same
//! worker, giving strict per-case ordering and at most one in-flight
//! evaluation per case, while other stripes keep draining.

use crate::orchestrator::CorrelationEngine;
use neuro_triage_core::types::CaseId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Bounded worker pool keyed by case identifier
#[derive(Debug)]
pub struct EvaluationPool {
    senders: Vec<mpsc::Sender<CaseId>>,
    handles: Vec<JoinHandle<()>>,
}

impl EvaluationPool {
    /// Spawn `workers` evaluation tasks, each with a queue of `queue_depth`
    pub fn spawn(engine: Arc<CorrelationEngine>, workers: usize, queue_depth: usize) -> Self {
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let (tx, mut rx) = mpsc::channel::<CaseId>(queue_depth);
            let engine = engine.clone();
            let handle = tokio::spawn(async move {
                debug!(worker_id, "Evaluation worker started");
                while let Some(case_id) = rx.recv().await {
                    if let Err(err) = engine.evaluate(&case_id).await {
                        error!(worker_id, case_id = %case_id, error = %err, "Evaluation failed");
                    }
                }
                debug!(worker_id, "Evaluation worker stopped");
            });
            senders.push(tx);
            handles.push(handle);
        }

        info!(workers, queue_depth, "Evaluation pool started");
        Self { senders, handles }
    }

    /// Stripe index for a case; equal case ids always map to the same worker
    pub fn stripe(&self, case_id: &CaseId) -> usize {
        let mut hasher = DefaultHasher::new();
        case_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    /// Enqueue an evaluation. Applies backpressure when the stripe's queue is
    /// full; unrelated stripes are unaffected.
    pub async fn enqueue(&self, case_id: CaseId) {
        let stripe = self.stripe(&case_id);
        if self.senders[stripe].send(case_id).await.is_err() {
            error!(stripe, "Evaluation worker queue closed");
        }
    }

    /// Close the queues and wait for all queued evaluations to finish
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Evaluation worker panicked");
            }
        }
        info!("Evaluation pool drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{TemplateExplainer, HeuristicPredictor};
    use chrono::{Duration, TimeZone, Utc};
    use neuro_triage_core::config::TriageConfig;
    use neuro_triage_core::events::{ChannelEvent, ScreeningEvent, VitalsEvent};
    use neuro_triage_core::types::{ArmFinding, FaceFinding, SpeechFinding};

    fn engine() -> (Arc<CorrelationEngine>, mpsc::Receiver<neuro_triage_core::prediction::PredictionResult>) {
        let (tx, rx) = mpsc::channel(64);
        let engine = CorrelationEngine::new(
            TriageConfig::default(),
            Arc::new(HeuristicPredictor::new()),
            Arc::new(TemplateExplainer::new()),
            tx,
        );
        (Arc::new(engine), rx)
    }

    fn base_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading(case: &str, sequence: u64) -> VitalsEvent {
        VitalsEvent {
            case_id: CaseId::from(case),
            patient_id: "PAT-1".to_string(),
            unit_id: "MEDIC-1".to_string(),
            event_ts: base_time() + Duration::minutes(sequence as i64),
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
            exam_ts: base_time(),
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

    #[test]
    fn equal_cases_share_a_stripe() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let (engine, _rx) = engine();
            let pool = EvaluationPool::spawn(engine, 4, 8);
            let a = pool.stripe(&CaseId::from("CASE-42"));
            let b = pool.stripe(&CaseId::from("CASE-42"));
            assert_eq!(a, b);
            pool.shutdown().await;
        });
    }

    #[tokio::test]
    async fn pool_evaluates_enqueued_cases() {
        let (engine, mut rx) = engine();
        let pool = EvaluationPool::spawn(engine.clone(), 2, 16);

        for case in ["C1", "C2", "C3"] {
            engine.handle_event(ChannelEvent::Vitals(reading(case, 1)));
            for trigger in engine.handle_event(ChannelEvent::Screening(screening(case))) {
                pool.enqueue(trigger).await;
            }
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let result = rx.recv().await.unwrap();
            seen.insert(result.case_id.as_str().to_string());
        }
        assert_eq!(seen.len(), 3);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let (engine, mut rx) = engine();
        let pool = EvaluationPool::spawn(engine.clone(), 1, 16);

        engine.handle_event(ChannelEvent::Vitals(reading("C1", 1)));
        for trigger in engine.handle_event(ChannelEvent::Screening(screening("C1"))) {
            pool.enqueue(trigger).await;
        }
        pool.shutdown().await;

        // The queued evaluation completed before shutdown returned
        assert!(rx.try_recv().is_ok());
    }
}
