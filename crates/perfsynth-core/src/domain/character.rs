//! Read-only character snapshot produced by the character-definition pipeline.
//!
//! The pipeline owns and versions these records; synthesis only reads them.
//! Every field defaults when absent so that partially populated profiles
//! never abort a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable character snapshot consumed by a synthesis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CharacterModel {
    /// Identifier that instruction sets must reference.
    pub character_id: String,

    /// Version assigned by the character pipeline.
    pub version: u32,

    pub base_appearance: BaseAppearance,
    pub base_voice: BaseVoice,
    pub base_animation: BaseAnimation,

    /// Identity baselines used by consistency scoring.
    pub consistency_parameters: ConsistencyParameters,
}

impl CharacterModel {
    /// Minimal model with the given identifier; everything else defaulted.
    pub fn new(character_id: impl Into<String>) -> Self {
        Self {
            character_id: character_id.into(),
            ..Self::default()
        }
    }

    /// Attach identity baselines.
    pub fn with_consistency(mut self, params: ConsistencyParameters) -> Self {
        self.consistency_parameters = params;
        self
    }
}

/// Visual baseline for the character.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaseAppearance {
    pub description: String,
    pub style: String,
    /// Free-form feature tags (`hair = "auburn"`, `build = "slight"`, …).
    pub features: BTreeMap<String, String>,
}

/// Voice baseline for the character.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaseVoice {
    pub voice_id: String,
    pub accent: String,
    /// Relative pitch multiplier (1.0 = neutral).
    pub pitch: f32,
    /// Relative speaking-rate multiplier (1.0 = neutral).
    pub rate: f32,
}

impl Default for BaseVoice {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            accent: String::new(),
            pitch: 1.0,
            rate: 1.0,
        }
    }
}

/// Motion baseline for the character.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaseAnimation {
    pub rig: String,
    pub idle_style: String,
    /// Overall movement energy in [0, 1].
    pub energy: f32,
}

impl Default for BaseAnimation {
    fn default() -> Self {
        Self {
            rig: String::new(),
            idle_style: String::new(),
            energy: 0.5,
        }
    }
}

/// Fixed-length reference vectors used as similarity baselines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsistencyParameters {
    pub facial_vector: Vec<f32>,
    pub voice_signature: Vec<f32>,
    pub motion_signature: Vec<f32>,
}
