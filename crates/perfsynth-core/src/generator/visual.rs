//! Visual adapter: frame-based image/video backends.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_rate, units_to_ms, BackendError, GenerationContext, GenerationError, ModalityGenerator};
use crate::domain::{
    BaseAppearance, CharacterModel, GenerationMetadata, Modality, ModalityPerformance,
    PerformanceInstructionSet, QualityReport, SceneContext, TimelineEvent,
};

/// Request sent to a visual backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualRequest {
    pub character_id: String,
    pub appearance: BaseAppearance,
    pub scene: SceneContext,
    pub emotion: String,
    pub intensity: u8,
    pub actions: Vec<String>,
    pub directions: Vec<String>,
}

impl VisualRequest {
    pub fn build(character: &CharacterModel, instructions: &PerformanceInstructionSet) -> Self {
        Self {
            character_id: character.character_id.clone(),
            appearance: character.base_appearance.clone(),
            scene: instructions.scene_context.clone(),
            emotion: instructions.emotional_state.primary.clone(),
            intensity: instructions.emotional_state.intensity,
            actions: instructions
                .actions
                .iter()
                .map(|a| a.description.clone())
                .collect(),
            directions: instructions.modality_instructions.visual.clone(),
        }
    }
}

/// A keyframe position in frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Keyframe {
    pub frame: u64,
    pub label: String,
}

/// Raw visual backend output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualRender {
    pub media_ref: String,
    pub frame_count: u64,
    pub fps: f64,
    pub quality: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub facial_embedding: Vec<f32>,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
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
pub trait VisualBackend: Send + Sync {
    async fn render(&self, request: &VisualRequest) -> Result<VisualRender, BackendError>;
}

/// Adapts a [`VisualBackend`] to [`ModalityGenerator`].
pub struct VisualAdapter<B> {
    backend: B,
}

impl<B: VisualBackend> VisualAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn normalize(render: VisualRender) -> Result<ModalityPerformance, GenerationError> {
        check_rate(Modality::Visual, "fps", render.fps)?;
        let fps = render.fps;

        let events = render
            .keyframes
            .iter()
            .enumerate()
            .map(|(i, k)| TimelineEvent {
                id: format!("visual:kf{i}"),
                timestamp_ms: units_to_ms(k.frame, fps),
                label: k.label.clone(),
            })
            .collect();

        let mut quality = QualityReport::new(render.quality);
        for (name, score) in render.sub_scores {
            quality = quality.with_sub_score(name, score);
        }

        Ok(ModalityPerformance {
            modality: Modality::Visual,
            base_payload: render.media_ref,
            quality,
            duration_ms: units_to_ms(render.frame_count, fps),
            events,
            identity_signal: render.facial_embedding,
            emotional_intensity: render.expressed_intensity,
            metadata: GenerationMetadata {
                model: render.model,
                seed: render.seed,
                cost: render.cost,
                native_unit: format!("frames@{fps}"),
                notes: BTreeMap::from([("frame_count".to_string(), render.frame_count.to_string())]),
            },
        })
    }
}

#[async_trait]
impl<B: VisualBackend> ModalityGenerator for VisualAdapter<B> {
    fn modality(&self) -> Modality {
        Modality::Visual
    }

    async fn generate(
        &self,
        character: &CharacterModel,
        instructions: &PerformanceInstructionSet,
        ctx: &GenerationContext,
    ) -> Result<ModalityPerformance, GenerationError> {
        let request = VisualRequest::build(character, instructions);
        let render = ctx
            .guard(Modality::Visual, self.backend.render(&request))
            .await?;
        Self::normalize(render)
    }
}
