//! Temporal trend analysis over the per-case reading history.
//!
//! Maintains a bounded FIFO window of vital-sign samples per case and derives,
//! for each tracked vital (heart rate, systolic pressure, SpO2, GCS):
//! rate of change per minute, a direction normalized to clinical polarity,
//! volatility (coefficient of variation), and a recency-weighted delta using
//! exponential decay with a 2-minute half-life.
//!
//! A separate advisory pass flags anomalous patterns (rapid GCS deterioration,
//! SpO2 decline, extreme heart rate, implausible pressure jumps). Anomalies
//! never block evaluation.

use chrono::{DateTime, Utc};
use neuro_triage_core::events::VitalsEvent;
use neuro_triage_core::prediction::{TrendIndicators, VitalTrend};
use neuro_triage_core::types::{CaseId, TrendDirection};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Rates with absolute value below this are considered stable
const STABLE_RATE_THRESHOLD: f64 = 0.1;

/// Recent-change window in minutes
const RECENT_WINDOW_MINUTES: f64 = 5.0;

/// Exponential-decay half-life for recency weighting, in minutes
const RECENCY_HALF_LIFE_MINUTES: f64 = 2.0;

/// GCS drop across the window flagged as rapid deterioration
const GCS_DETERIORATION_DROP: f64 = 2.0;

/// SpO2 drop across the window flagged as significant decline
const SPO2_DECLINE_DROP: f64 = 5.0;

/// Heart rate bounds outside which the window is flagged extreme
const HR_EXTREME_HIGH: f64 = 150.0;
const HR_EXTREME_LOW: f64 = 40.0;

/// Adjacent systolic delta above which variation is flagged
const BP_VARIATION_JUMP: f64 = 50.0;

/// Which raw direction counts as deterioration for a vital
#[derive(Debug, Clone, Copy)]
enum Polarity {
    /// Rising values indicate deterioration (heart rate, systolic pressure)
    HigherIsWorse,
    /// Falling values indicate deterioration (SpO2, GCS)
    LowerIsWorse,
}

/// One timestamped sample in the history window
#[derive(Debug, Clone)]
pub struct VitalSample {
    pub at: DateTime<Utc>,
    pub heart_rate: Option<f64>,
    pub systolic: Option<f64>,
    pub spo2: Option<f64>,
    pub gcs: Option<f64>,
}

impl From<&VitalsEvent> for VitalSample {
    fn from(event: &VitalsEvent) -> Self {
        Self {
            at: event.event_ts,
            heart_rate: event.heart_rate_bpm.map(f64::from),
            systolic: event.systolic_bp_mmhg.map(f64::from),
            spo2: event.spo2_pct.map(f64::from),
            gcs: event.gcs_total.map(f64::from),
        }
    }
}

/// Bounded per-case history with trend feature extraction
#[derive(Debug)]
pub struct TrendAnalyzer {
    window: usize,
    history: RwLock<HashMap<CaseId, VecDeque<VitalSample>>>,
}

impl TrendAnalyzer {
    /// Create an analyzer retaining at most `window` samples per case
    pub fn new(window: usize) -> Self {
        Self {
            window,
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Append a sample, evicting the oldest beyond capacity
    pub fn record(&self, case_id: &CaseId, sample: VitalSample) {
        let mut history = self.history.write().unwrap();
        let window = history.entry(case_id.clone()).or_default();
        window.push_back(sample);
        while window.len() > self.window {
            window.pop_front();
        }
    }

    /// Samples currently retained for a case
    pub fn history_len(&self, case_id: &CaseId) -> usize {
        self.history
            .read()
            .unwrap()
            .get(case_id)
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// Compute trend features for a case. Individual vitals are undefined
    /// until at least two samples carrying that vital exist.
    pub fn trends(&self, case_id: &CaseId) -> TrendIndicators {
        let history = self.history.read().unwrap();
        let Some(window) = history.get(case_id) else {
            return TrendIndicators::default();
        };

        TrendIndicators {
            heart_rate: vital_trend(window, |s| s.heart_rate, Polarity::HigherIsWorse),
            systolic_pressure: vital_trend(window, |s| s.systolic, Polarity::HigherIsWorse),
            spo2: vital_trend(window, |s| s.spo2, Polarity::LowerIsWorse),
            gcs: vital_trend(window, |s| s.gcs, Polarity::LowerIsWorse),
        }
    }

    /// Advisory anomaly pass over the full window
    pub fn anomalies(&self, case_id: &CaseId) -> Vec<String> {
        let history = self.history.read().unwrap();
        let Some(window) = history.get(case_id) else {
            return Vec::new();
        };

        let mut anomalies = Vec::new();

        let gcs: Vec<f64> = window.iter().filter_map(|s| s.gcs).collect();
        if gcs.len() >= 2 && gcs[0] - gcs[gcs.len() - 1] >= GCS_DETERIORATION_DROP {
            anomalies.push(format!(
                "Rapid GCS deterioration: {:.0} -> {:.0}",
                gcs[0],
                gcs[gcs.len() - 1]
            ));
        }

        let spo2: Vec<f64> = window.iter().filter_map(|s| s.spo2).collect();
        if spo2.len() >= 2 && spo2[0] - spo2[spo2.len() - 1] >= SPO2_DECLINE_DROP {
            anomalies.push(format!(
                "Significant SpO2 decline: {:.0}% -> {:.0}%",
                spo2[0],
                spo2[spo2.len() - 1]
            ));
        }

        let hr: Vec<f64> = window.iter().filter_map(|s| s.heart_rate).collect();
        if !hr.is_empty() {
            let max = hr.iter().cloned().fold(f64::MIN, f64::max);
            let min = hr.iter().cloned().fold(f64::MAX, f64::min);
            if max > HR_EXTREME_HIGH || min < HR_EXTREME_LOW {
                anomalies.push(format!("Extreme heart rate: {min:.0}-{max:.0} bpm"));
            }
        }

        let systolic: Vec<f64> = window.iter().filter_map(|s| s.systolic).collect();
        let max_jump = systolic
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .fold(0.0_f64, f64::max);
        if max_jump > BP_VARIATION_JUMP {
            anomalies.push(format!(
                "Unusual BP variation: {max_jump:.0} mmHg change detected"
            ));
        }

        anomalies
    }
}

/// Extract the (timestamp, value) series for one vital and derive its trend
fn vital_trend(
    window: &VecDeque<VitalSample>,
    extract: impl Fn(&VitalSample) -> Option<f64>,
    polarity: Polarity,
) -> VitalTrend {
    let series: Vec<(DateTime<Utc>, f64)> = window
        .iter()
        .filter_map(|s| extract(s).map(|v| (s.at, v)))
        .collect();

    if series.len() < 2 {
        return VitalTrend::default();
    }

    let rate = rate_of_change(&series);
    let direction = rate.map(|r| direction_for(r, polarity));
    let volatility = volatility(series.iter().map(|(_, v)| *v));
    let recent_change = recency_weighted_change(&series);

    VitalTrend {
        rate_of_change: rate,
        direction,
        volatility,
        recent_change,
    }
}

/// (last - first) / elapsed minutes; undefined when elapsed is zero
fn rate_of_change(series: &[(DateTime<Utc>, f64)]) -> Option<f64> {
    let (first_ts, first) = series[0];
    let (last_ts, last) = series[series.len() - 1];
    let elapsed_min = (last_ts - first_ts).num_milliseconds() as f64 / 60_000.0;
    if elapsed_min == 0.0 {
        return None;
    }
    Some((last - first) / elapsed_min)
}

fn direction_for(rate: f64, polarity: Polarity) -> TrendDirection {
    if rate.abs() < STABLE_RATE_THRESHOLD {
        return TrendDirection::Stable;
    }
    let deteriorating = match polarity {
        Polarity::HigherIsWorse => rate > 0.0,
        Polarity::LowerIsWorse => rate < 0.0,
    };
    if deteriorating {
        TrendDirection::Worsening
    } else {
        TrendDirection::Improving
    }
}

/// Population standard deviation over mean; undefined for <2 points or zero
/// mean
fn volatility(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}

/// Exponential-decay weighted average over the recent window, minus the
/// earliest recent value
fn recency_weighted_change(series: &[(DateTime<Utc>, f64)]) -> Option<f64> {
    let latest = series[series.len() - 1].0;
    let recent: Vec<(f64, f64)> = series
        .iter()
        .map(|(ts, v)| ((latest - *ts).num_milliseconds() as f64 / 60_000.0, *v))
        .filter(|(age_min, _)| *age_min <= RECENT_WINDOW_MINUTES)
        .collect();

    if recent.len() < 2 {
        return None;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (age_min, value) in &recent {
        let weight = (-age_min / RECENCY_HALF_LIFE_MINUTES).exp();
        weighted_sum += value * weight;
        total_weight += weight;
    }
    if total_weight == 0.0 {
        return None;
    }

    // recent[0] is the oldest sample inside the window
    Some(weighted_sum / total_weight - recent[0].1)
}
