//! Animation adapter: motion-synthesis backends reporting capture frames.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_rate, units_to_ms, BackendError, GenerationContext, GenerationError, ModalityGenerator};
use crate::domain::{
    ActionCue, BaseAnimation, CharacterModel, GenerationMetadata, Modality, ModalityPerformance,
    PerformanceInstructionSet, PhysicalState, QualityReport, TimelineEvent,
};

/// Request sent to a motion backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotionRequest {
    pub character_id: String,
    pub animation: BaseAnimation,
    pub physical_state: PhysicalState,
    pub actions: Vec<ActionCue>,
    pub emotion: String,
    pub intensity: u8,
    pub directions: Vec<String>,
}

impl MotionRequest {
    pub fn build(character: &CharacterModel, instructions: &PerformanceInstructionSet) -> Self {
        Self {
            character_id: character.character_id.clone(),
            animation: character.base_animation.clone(),
            physical_state: instructions.physical_state.clone(),
            actions: instructions.actions.clone(),
            emotion: instructions.emotional_state.primary.clone(),
            intensity: instructions.emotional_state.intensity,
            directions: instructions.modality_instructions.animation.clone(),
        }
    }
}

/// A key pose position in motion frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyPose {
    pub frame: u64,
    pub pose: String,
}

/// Raw motion backend output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotionRender {
    pub clip_ref: String,
    pub frame_count: u64,
    pub frame_rate: f64,
    pub quality: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub motion_signature: Vec<f32>,
    #[serde(default)]
    pub key_poses: Vec<KeyPose>,
    #[serde(default)]
    pub expressed_intensity: Option<f64>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub cost: f64,
}

#[async_trait]
pub trait MotionBackend: Send + Sync {
    async fn animate(&self, request: &MotionRequest) -> Result<MotionRender, BackendError>;
}

/// Adapts a [`MotionBackend`] to [`ModalityGenerator`].
pub struct AnimationAdapter<B> {
    backend: B,
}

impl<B: MotionBackend> AnimationAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn normalize(render: MotionRender) -> Result<ModalityPerformance, GenerationError> {
        check_rate(Modality::Animation, "frame_rate", render.frame_rate)?;
        let rate = render.frame_rate;

        // Backends may emit poses out of order; the native timeline is sorted.
        let mut poses = render.key_poses;
        poses.sort_by_key(|p| p.frame);
        let events = poses
            .iter()
            .enumerate()
            .map(|(i, p)| TimelineEvent {
                id: format!("animation:pose{i}"),
                timestamp_ms: units_to_ms(p.frame, rate),
                label: p.pose.clone(),
            })
            .collect();

        let mut quality = QualityReport::new(render.quality);
        for (name, score) in render.sub_scores {
            quality = quality.with_sub_score(name, score);
        }

        Ok(ModalityPerformance {
            modality: Modality::Animation,
            base_payload: render.clip_ref,
            quality,
            duration_ms: units_to_ms(render.frame_count, rate),
            events,
            identity_signal: render.motion_signature,
            emotional_intensity: render.expressed_intensity,
            metadata: GenerationMetadata {
                model: render.model,
                seed: render.seed,
                cost: render.cost,
                native_unit: format!("motion_frames@{rate}"),
                notes: BTreeMap::new(),
            },
        })
    }
}

#[async_trait]
impl<B: MotionBackend> ModalityGenerator for AnimationAdapter<B> {
    fn modality(&self) -> Modality {
        Modality::Animation
    }

    async fn generate(
        &self,
        character: &CharacterModel,
        instructions: &PerformanceInstructionSet,
        ctx: &GenerationContext,
    ) -> Result<ModalityPerformance, GenerationError> {
        let request = MotionRequest::build(character, instructions);
        let render = ctx
            .guard(Modality::Animation, self.backend.animate(&request))
            .await?;
        Self::normalize(render)
    }
}
