//! Core entity types shared by every stage.
//!
//! Entities are flat so they serialize directly to CSV rows; the composite
//! `(participant_id, gesture_id)` key is recovered through `key()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Composite primary key of a gesture within the study
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub participant_id: String,
    pub gesture_id: String,
}

impl RecordKey {
    pub fn new(participant_id: impl Into<String>, gesture_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            gesture_id: gesture_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.participant_id, self.gesture_id)
    }
}

/// One elicited gesture and the command it was designed to trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureRecord {
    pub participant_id: String,
    pub gesture_id: String,
    /// Interaction channel the gesture was elicited through
    pub modality: String,
    /// Reference label
    pub ground_truth_command: String,
}

impl GestureRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.participant_id, &self.gesture_id)
    }
}

/// Where a description came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DescriptionSource {
    /// Built from labeled annotation fields
    HumanStructured,
    /// Free-text human annotation
    HumanUnstructured,
    /// Generated by a model; the name may carry a pose-stage suffix
    Model(String),
}

impl DescriptionSource {
    pub fn model(name: impl Into<String>) -> Self {
        Self::Model(name.into())
    }

    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }
}

impl fmt::Display for DescriptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HumanStructured => f.write_str("human-structured"),
            Self::HumanUnstructured => f.write_str("human-unstructured"),
            Self::Model(name) => write!(f, "model:{}", name),
        }
    }
}

impl FromStr for DescriptionSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "human-structured" => Ok(Self::HumanStructured),
            "human-unstructured" => Ok(Self::HumanUnstructured),
            other => match other.strip_prefix("model:") {
                Some(name) if !name.trim().is_empty() => Ok(Self::Model(name.trim().to_string())),
                _ => Err(crate::Error::Schema(format!(
                    "unknown description source {:?}",
                    s
                ))),
            },
        }
    }
}

impl TryFrom<String> for DescriptionSource {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DescriptionSource> for String {
    fn from(value: DescriptionSource) -> Self {
        value.to_string()
    }
}

/// Who produced a command prediction
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PredictorSource {
    /// Recorded guess of a human rater
    Human,
    /// Classification by a model
    Model(String),
}

impl PredictorSource {
    pub fn model(name: impl Into<String>) -> Self {
        Self::Model(name.into())
    }
}

impl fmt::Display for PredictorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => f.write_str("human"),
            Self::Model(name) => write!(f, "model:{}", name),
        }
    }
}

impl FromStr for PredictorSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "human" => Ok(Self::Human),
            other => match other.strip_prefix("model:") {
                Some(name) if !name.trim().is_empty() => Ok(Self::Model(name.trim().to_string())),
                _ => Err(crate::Error::Schema(format!("unknown predictor source {:?}", s))),
            },
        }
    }
}

impl TryFrom<String> for PredictorSource {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PredictorSource> for String {
    fn from(value: PredictorSource) -> Self {
        value.to_string()
    }
}

/// Normalized free-text description of one gesture from one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub participant_id: String,
    pub gesture_id: String,
    pub source: DescriptionSource,
    pub text: String,
}

impl Description {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.participant_id, &self.gesture_id)
    }
}

/// A predicted command label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PredictedCommand {
    /// Member of the closed command vocabulary
    Known(String),
    /// Response that could not be mapped; keeps the raw text for review
    Unrecognized(String),
}

impl PredictedCommand {
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Vocabulary label, if recognized
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Known(label) => Some(label),
            Self::Unrecognized(_) => None,
        }
    }
}

/// Command prediction made from one description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub participant_id: String,
    pub gesture_id: String,
    pub source: PredictorSource,
    pub description_source: DescriptionSource,
    pub predicted_command: PredictedCommand,
}

impl Prediction {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.participant_id, &self.gesture_id)
    }
}

/// Per-prediction score joined against ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub participant_id: String,
    pub gesture_id: String,
    pub source: PredictorSource,
    pub description_source: DescriptionSource,
    pub is_correct: bool,
    /// Similarity in [0, 1] to the reference description, when defined
    pub similarity_score: Option<f64>,
}

impl ScoreRow {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.participant_id, &self.gesture_id)
    }
}

/// One aggregated metric for one group of score rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub grouping_key: String,
    pub metric_name: String,
    pub value: f64,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
}

impl AggregateStat {
    pub fn new(grouping_key: impl Into<String>, metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            grouping_key: grouping_key.into(),
            metric_name: metric_name.into(),
            value,
            ci_lower: None,
            ci_upper: None,
        }
    }

    pub fn with_interval(mut self, interval: Option<(f64, f64)>) -> Self {
        if let Some((lower, upper)) = interval {
            self.ci_lower = Some(lower);
            self.ci_upper = Some(upper);
        }
        self
    }

    pub fn confidence_interval(&self) -> Option<(f64, f64)> {
        self.ci_lower.zip(self.ci_upper)
    }
}
