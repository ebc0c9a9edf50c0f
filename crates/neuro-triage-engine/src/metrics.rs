//! Per-channel throughput and latency tracking.
//!
//! A supporting component, not part of the correlation logic: the dispatch
//! loop records every inbound message here, and a snapshot can be logged or
//! exported on demand. Counters are additionally mirrored to the `metrics`
//! facade for external exporters.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Instant;

/// Rolling sample cap per channel
const MAX_SAMPLES: usize = 1000;

#[derive(Debug)]
struct ChannelStats {
    started: Instant,
    total_messages: u64,
    total_bytes: u64,
    message_timestamps: VecDeque<Instant>,
    latencies_ms: VecDeque<f64>,
}

impl ChannelStats {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            total_messages: 0,
            total_bytes: 0,
            message_timestamps: VecDeque::with_capacity(MAX_SAMPLES),
            latencies_ms: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    fn record(&mut self, bytes: usize, latency_ms: Option<f64>) {
        self.total_messages += 1;
        self.total_bytes += bytes as u64;

        self.message_timestamps.push_back(Instant::now());
        if self.message_timestamps.len() > MAX_SAMPLES {
            self.message_timestamps.pop_front();
        }

        if let Some(latency) = latency_ms {
            self.latencies_ms.push_back(latency);
            if self.latencies_ms.len() > MAX_SAMPLES {
                self.latencies_ms.pop_front();
            }
        }
    }

    fn snapshot(&self, channel: &str) -> ChannelSnapshot {
        let now = Instant::now();
        let messages_last_second = self
            .message_timestamps
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t).as_secs_f64() < 1.0)
            .count() as u64;

        let mut sorted: Vec<f64> = self.latencies_ms.iter().cloned().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let uptime_secs = self.started.elapsed().as_secs_f64().max(1.0);

        ChannelSnapshot {
            channel: channel.to_string(),
            total_messages: self.total_messages,
            messages_per_second: messages_last_second,
            latency_p50_ms: percentile(&sorted, 0.50),
            latency_p95_ms: percentile(&sorted, 0.95),
            latency_p99_ms: percentile(&sorted, 0.99),
            latency_avg_ms: if sorted.is_empty() {
                0.0
            } else {
                sorted.iter().sum::<f64>() / sorted.len() as f64
            },
            throughput_kbps: (self.total_bytes as f64 / 1024.0) / uptime_secs,
            uptime_secs: uptime_secs as u64,
        }
    }
}

fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * quantile) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Point-in-time metrics for one channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub channel: String,
    pub total_messages: u64,
    pub messages_per_second: u64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_avg_ms: f64,
    pub throughput_kbps: f64,
    pub uptime_secs: u64,
}

/// Aggregated view across all channels
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub channels: Vec<ChannelSnapshot>,
    pub total_messages: u64,
    pub active_channels: usize,
}

/// Centralized per-channel metrics collector
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    channels: RwLock<HashMap<String, ChannelStats>>,
}

impl ChannelMetrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one inbound message for a channel
    pub fn record_message(&self, channel: &str, bytes: usize, latency_ms: Option<f64>) {
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(ChannelStats::new)
            .record(bytes, latency_ms);

        ::metrics::counter!(
            "triage_events_received_total",
            "channel" => channel.to_string()
        )
        .increment(1);
        if let Some(latency) = latency_ms {
            ::metrics::histogram!(
                "triage_dispatch_latency_ms",
                "channel" => channel.to_string()
            )
            .record(latency);
        }
    }

    /// Snapshot all channels, sorted by channel name
    pub fn snapshot(&self) -> MetricsSnapshot {
        let channels = self.channels.read().unwrap();
        let mut snapshots: Vec<ChannelSnapshot> = channels
            .iter()
            .map(|(name, stats)| stats.snapshot(name))
            .collect();
        snapshots.sort_by(|a, b| a.channel.cmp(&b.channel));

        let total_messages = snapshots.iter().map(|s| s.total_messages).sum();
        MetricsSnapshot {
            total_messages,
            active_channels: snapshots.len(),
            channels: snapshots,
        }
    }
}
