//! Inbound event types and the decode/validation boundary.
//!
//! Events arrive on one arrival-ordered stream, multiplexed across three
//! channels. Each channel carries its own payload shape, decoded here into a
//! tagged [`ChannelEvent`]. Malformed payloads yield [`Error::Decode`] and are
//! dropped by the dispatch loop without affecting unrelated cases.

use crate::error::{Error, Result};
use crate::types::{
    ArmFinding, CaseId, FaceFinding, FacilityId, FacilityTier, HeartRhythm, SpeechFinding,
    SuspectedSide,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inbound channel discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Continuous vital-sign readings
    Vitals,
    /// One-time neurological screening results
    Screening,
    /// Shared facility-capacity snapshots
    Capacity,
}

impl Channel {
    /// Stable channel name used in logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vitals => "vitals",
            Self::Screening => "screening",
            Self::Capacity => "capacity",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vitals" => Ok(Self::Vitals),
            "screening" => Ok(Self::Screening),
            "capacity" => Ok(Self::Capacity),
            other => Err(Error::validation(format!("unknown channel '{other}'"))),
        }
    }
}

/// A single timestamped vital-sign reading from the transporting unit.
///
/// Readings arrive repeatedly per case, ordered by `sequence_number`. Only
/// the latest is authoritative for feature building; a bounded history is
/// retained by the trend analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsEvent {
    pub case_id: CaseId,
    pub patient_id: String,
    pub unit_id: String,
    pub event_ts: DateTime<Utc>,
    pub sequence_number: u64,

    pub heart_rate_bpm: Option<i32>,
    pub systolic_bp_mmhg: Option<i32>,
    pub diastolic_bp_mmhg: Option<i32>,
    pub respiratory_rate_bpm: Option<i32>,
    pub spo2_pct: Option<i32>,
    pub temperature_c: Option<f64>,

    pub gcs_total: Option<i32>,
    pub blood_glucose_mg_dl: Option<i32>,
    pub ecg_rhythm: Option<HeartRhythm>,

    #[serde(default)]
    pub is_artifact_suspected: bool,
    pub source_device: Option<String>,
}

impl VitalsEvent {
    fn validate(&self) -> Result<()> {
        if self.case_id.is_empty() {
            return Err(Error::validation("case_id must not be empty"));
        }
        if let Some(gcs) = self.gcs_total {
            if !(3..=15).contains(&gcs) {
                return Err(Error::validation(format!(
                    "gcs_total {gcs} outside valid range 3..=15"
                )));
            }
        }
        if let Some(spo2) = self.spo2_pct {
            if !(0..=100).contains(&spo2) {
                return Err(Error::validation(format!(
                    "spo2_pct {spo2} outside valid range 0..=100"
                )));
            }
        }
        if let Some(hr) = self.heart_rate_bpm {
            if !(0..=400).contains(&hr) {
                return Err(Error::validation(format!("heart_rate_bpm {hr} implausible")));
            }
        }
        Ok(())
    }
}

/// One-time (occasionally re-sent) neurological screening result.
/// Latest write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningEvent {
    pub case_id: CaseId,
    pub patient_id: String,
    pub unit_id: String,
    pub exam_ts: DateTime<Utc>,

    pub face_droop: FaceFinding,
    pub arm_weakness: ArmFinding,
    pub speech_difficulty: SpeechFinding,

    pub symptom_onset_ts: Option<DateTime<Utc>>,
    pub last_known_well_ts: Option<DateTime<Utc>>,

    pub prestroke_disability: Option<i32>,
    pub suspected_stroke_side: Option<SuspectedSide>,
    pub screening_score: Option<i32>,

    #[serde(default)]
    pub suspected_stroke: bool,
    pub notes: Option<String>,
}

impl ScreeningEvent {
    fn validate(&self) -> Result<()> {
        if self.case_id.is_empty() {
            return Err(Error::validation("case_id must not be empty"));
        }
        if let Some(score) = self.screening_score {
            if !(0..=3).contains(&score) {
                return Err(Error::validation(format!(
                    "screening_score {score} outside valid range 0..=3"
                )));
            }
        }
        if let Some(disability) = self.prestroke_disability {
            if !(0..=6).contains(&disability) {
                return Err(Error::validation(format!(
                    "prestroke_disability {disability} outside valid range 0..=6"
                )));
            }
        }
        Ok(())
    }

    /// Screening score with missing treated as zero findings
    pub fn score_or_zero(&self) -> i32 {
        self.screening_score.unwrap_or(0)
    }
}

/// Per-facility capacity snapshot. Not case-scoped; upserted into the shared
/// facility cache, latest write wins per facility id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityEvent {
    pub facility_id: FacilityId,
    pub facility_name: String,
    pub updated_ts: DateTime<Utc>,

    pub latitude: f64,
    pub longitude: f64,

    pub tier: FacilityTier,
    pub has_ct_available: bool,
    pub has_cta_available: bool,
    pub can_perform_thrombectomy: bool,

    pub ed_crowding_score: Option<i32>,
    pub current_stroke_cases: Option<i32>,

    #[serde(default = "default_true")]
    pub accepting_stroke_now: bool,
    pub extra_door_to_needle_min: Option<i32>,

    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CapacityEvent {
    fn validate(&self) -> Result<()> {
        if self.facility_id.is_empty() {
            return Err(Error::validation("facility_id must not be empty"));
        }
        if let Some(crowding) = self.ed_crowding_score {
            if !(0..=100).contains(&crowding) {
                return Err(Error::validation(format!(
                    "ed_crowding_score {crowding} outside valid range 0..=100"
                )));
            }
        }
        Ok(())
    }
}

/// Decoded event tagged with its channel
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Vitals(VitalsEvent),
    Screening(ScreeningEvent),
    Capacity(CapacityEvent),
}

impl ChannelEvent {
    /// Channel this event arrived on
    pub fn channel(&self) -> Channel {
        match self {
            Self::Vitals(_) => Channel::Vitals,
            Self::Screening(_) => Channel::Screening,
            Self::Capacity(_) => Channel::Capacity,
        }
    }

    /// Case identifier, when the event is case-scoped
    pub fn case_id(&self) -> Option<&CaseId> {
        match self {
            Self::Vitals(ev) => Some(&ev.case_id),
            Self::Screening(ev) => Some(&ev.case_id),
            Self::Capacity(_) => None,
        }
    }
}

/// Decode and validate a raw payload for the given channel.
///
/// This is the single validation boundary: everything downstream operates on
/// typed events that already passed range and identifier checks.
pub fn decode_event(channel: Channel, payload: &[u8]) -> Result<ChannelEvent> {
    let decoded = match channel {
        Channel::Vitals => {
            let ev: VitalsEvent = serde_json::from_slice(payload)
                .map_err(|e| Error::decode(channel.as_str(), e.to_string()))?;
            ev.validate()
                .map_err(|e| Error::decode(channel.as_str(), e.to_string()))?;
            ChannelEvent::Vitals(ev)
        }
        Channel::Screening => {
            let ev: ScreeningEvent = serde_json::from_slice(payload)
                .map_err(|e| Error::decode(channel.as_str(), e.to_string()))?;
            ev.validate()
                .map_err(|e| Error::decode(channel.as_str(), e.to_string()))?;
            ChannelEvent::Screening(ev)
        }
        Channel::Capacity => {
            let ev: CapacityEvent = serde_json::from_slice(payload)
                .map_err(|e| Error::decode(channel.as_str(), e.to_string()))?;
            ev.validate()
                .map_err(|e| Error::decode(channel.as_str(), e.to_string()))?;
            ChannelEvent::Capacity(ev)
        }
    };
    Ok(decoded)
}
