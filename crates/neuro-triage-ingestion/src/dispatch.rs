//! Sequential dispatch of the multiplexed inbound stream.
//!
//! One consumer processes envelopes strictly in arrival order: events for
//! different cases may interleave, but two events for the same case are
//! never handled concurrently here. Decoding happens at this boundary;
//! malformed payloads are dropped and logged without affecting unrelated
//! cases. Triggered evaluations are enqueued on the striped worker pool so
//! slow external calls never stall the loop.

use crate::source::EventSource;
use neuro_triage_core::events::decode_event;
use neuro_triage_core::Result;
use neuro_triage_engine::metrics::ChannelMetrics;
use neuro_triage_engine::orchestrator::CorrelationEngine;
use neuro_triage_engine::pool::EvaluationPool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The single sequential consumer of the inbound stream
pub struct DispatchLoop<S> {
    source: S,
    engine: Arc<CorrelationEngine>,
    pool: Arc<EvaluationPool>,
    metrics: Arc<ChannelMetrics>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for DispatchLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchLoop")
            .field("source", &self.source)
            .finish()
    }
}

impl<S: EventSource> DispatchLoop<S> {
    /// Create a dispatch loop over a source
    pub fn new(
        source: S,
        engine: Arc<CorrelationEngine>,
        pool: Arc<EvaluationPool>,
        metrics: Arc<ChannelMetrics>,
    ) -> Self {
        Self {
            source,
            engine,
            pool,
            metrics,
        }
    }

    /// Consume the source until it is exhausted.
    ///
    /// Never fails on an individual event: decode errors are counted and
    /// dropped so one bad payload cannot stop the pipeline.
    pub async fn run(mut self) -> Result<()> {
        info!(source = self.source.name(), "Dispatch loop started");

        while let Some(envelope) = self.source.next().await {
            let channel = envelope.channel;
            let latency_ms = envelope.enqueued_at.elapsed().as_secs_f64() * 1000.0;
            self.metrics
                .record_message(channel.as_str(), envelope.payload.len(), Some(latency_ms));

            let event = match decode_event(channel, &envelope.payload) {
                Ok(event) => event,
                Err(err) => {
                    warn!(channel = %channel, error = %err, "Dropping malformed event");
                    ::metrics::counter!(
                        "triage_events_discarded_total",
                        "channel" => channel.as_str()
                    )
                    .increment(1);
                    continue;
                }
            };

            let case_id = event.case_id().cloned();
            let triggers = self.engine.handle_event(event);
            if let Some(case_id) = case_id {
                debug!(channel = %channel, case_id = %case_id, triggers = triggers.len(), "Event dispatched");
            }
            for trigger in triggers {
                self.pool.enqueue(trigger).await;
            }
        }

        info!("Dispatch loop finished, source exhausted");
        Ok(())
    }
}
