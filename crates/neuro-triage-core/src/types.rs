//! Identifier newtypes and clinical enumerations shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier correlating the three streams for one encounter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Create a case identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty (rejected at the decode boundary)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier for a receiving facility
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(String);

impl FacilityId {
    /// Create a facility identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Facial asymmetry finding from the neurological screening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaceFinding {
    Absent,
    Present,
    Unknown,
}

/// Arm weakness finding from the neurological screening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmFinding {
    Absent,
    Left,
    Right,
    Bilateral,
    Unknown,
}

impl ArmFinding {
    /// True when any weakness was observed
    pub fn any_weakness(&self) -> bool {
        matches!(self, Self::Left | Self::Right | Self::Bilateral)
    }
}

/// Speech finding from the neurological screening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeechFinding {
    Absent,
    Dysarthria,
    AphasiaSuspected,
    Unknown,
}

impl SpeechFinding {
    /// True when any speech abnormality was observed
    pub fn any_abnormality(&self) -> bool {
        matches!(self, Self::Dysarthria | Self::AphasiaSuspected)
    }
}

/// Suspected stroke side, contralateral to the observed weakness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspectedSide {
    Left,
    Right,
}

/// Heart rhythm classification reported by the monitoring device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartRhythm {
    Normal,
    SinusTachycardia,
    SinusBradycardia,
    AtrialFibrillation,
    VentricularTachycardia,
    #[serde(other)]
    Unclassified,
}

/// Stroke treatment capability tier of a facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacilityTier {
    /// Lower tier: thrombolysis only
    Primary,
    /// Higher tier: full stroke service including thrombectomy
    Comprehensive,
    /// Higher tier: thrombectomy capability without full comprehensive status
    ThrombectomyCapable,
}

impl FacilityTier {
    /// True for tiers able to perform mechanical thrombectomy
    pub fn is_higher_tier(&self) -> bool {
        matches!(self, Self::Comprehensive | Self::ThrombectomyCapable)
    }

    /// Destination label used in emitted predictions
    pub fn destination_label(&self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY_CENTER",
            Self::Comprehensive => "COMPREHENSIVE_CENTER",
            Self::ThrombectomyCapable => "THROMBECTOMY_CAPABLE_CENTER",
        }
    }
}

impl fmt::Display for FacilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.destination_label())
    }
}

/// Clinical risk category derived from the predicted probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
    Critical,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Direction of a vital-sign trend, normalized to clinical polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Worsening,
    Stable,
    Improving,
}

impl TrendDirection {
    /// True when the trend indicates deterioration
    pub fn is_worsening(&self) -> bool {
        matches!(self, Self::Worsening)
    }
}
