//! Per-modality generation output, normalized to a millisecond timeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One independent output channel of a performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Visual,
    Audio,
    Animation,
}

impl Modality {
    /// All modalities in pipeline order.
    pub const ALL: [Modality; 3] = [Modality::Visual, Modality::Audio, Modality::Animation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Visual => "visual",
            Modality::Audio => "audio",
            Modality::Animation => "animation",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported quality record; every score is in [0, 1].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityReport {
    pub overall: f64,
    pub sub_scores: BTreeMap<String, f64>,
}

impl QualityReport {
    pub fn new(overall: f64) -> Self {
        Self {
            overall: clamp_unit(overall),
            sub_scores: BTreeMap::new(),
        }
    }

    pub fn with_sub_score(mut self, name: impl Into<String>, score: f64) -> Self {
        self.sub_scores.insert(name.into(), clamp_unit(score));
        self
    }
}

/// A notable moment in a modality's native timeline (viseme, keyframe, pose).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineEvent {
    pub id: String,
    /// Position in the modality's own (unwarped) timeline.
    pub timestamp_ms: u64,
    pub label: String,
}

/// Backend provenance attached to every performance for reproducibility debugging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationMetadata {
    pub model: String,
    /// Seed used by the backend, if it sampled.
    pub seed: Option<u64>,
    /// Cost of the backend call in the backend's billing unit.
    pub cost: f64,
    /// Native timeline unit before normalization, e.g. `"frames@24"`.
    pub native_unit: String,
    pub notes: BTreeMap<String, String>,
}

/// Normalized output of one modality generator.
///
/// Created once per run by its adapter and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModalityPerformance {
    pub modality: Modality,
    /// Reference to the rendered media (URI, object key, path).
    pub base_payload: String,
    pub quality: QualityReport,
    pub duration_ms: u64,
    /// Events in native-timeline order.
    pub events: Vec<TimelineEvent>,
    /// Identity embedding extracted from the output (face, voice, motion).
    pub identity_signal: Vec<f32>,
    /// Emotional intensity the output expresses, 0–100, if measured.
    pub emotional_intensity: Option<f64>,
    pub metadata: GenerationMetadata,
}

/// Clamp a score into [0, 1]; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
