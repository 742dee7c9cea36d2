//! Audio adapter: sample-based speech backends.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_rate, units_to_ms, BackendError, GenerationContext, GenerationError, ModalityGenerator};
use crate::domain::{
    BaseVoice, CharacterModel, DialogueLine, GenerationMetadata, Modality, ModalityPerformance,
    PerformanceInstructionSet, QualityReport, TimelineEvent,
};

/// Request sent to a speech backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioRequest {
    pub character_id: String,
    pub voice: BaseVoice,
    pub lines: Vec<DialogueLine>,
    pub emotion: String,
    pub intensity: u8,
    pub directions: Vec<String>,
}

impl AudioRequest {
    pub fn build(character: &CharacterModel, instructions: &PerformanceInstructionSet) -> Self {
        Self {
            character_id: character.character_id.clone(),
            voice: character.base_voice.clone(),
            lines: instructions.dialogue.clone(),
            emotion: instructions.emotional_state.primary.clone(),
            intensity: instructions.emotional_state.intensity,
            directions: instructions.modality_instructions.audio.clone(),
        }
    }
}

/// Word onset in samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTiming {
    pub sample_offset: u64,
    pub word: String,
}

/// Raw speech backend output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioRender {
    pub media_ref: String,
    pub sample_count: u64,
    pub sample_rate: u32,
    pub quality: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub voice_embedding: Vec<f32>,
    #[serde(default)]
    pub word_timings: Vec<WordTiming>,
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
pub trait AudioBackend: Send + Sync {
    async fn speak(&self, request: &AudioRequest) -> Result<AudioRender, BackendError>;
}

/// Adapts an [`AudioBackend`] to [`ModalityGenerator`].
pub struct AudioAdapter<B> {
    backend: B,
}

impl<B: AudioBackend> AudioAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn normalize(render: AudioRender) -> Result<ModalityPerformance, GenerationError> {
        let rate = f64::from(render.sample_rate);
        check_rate(Modality::Audio, "sample_rate", rate)?;

        let events = render
            .word_timings
            .iter()
            .enumerate()
            .map(|(i, w)| TimelineEvent {
                id: format!("audio:w{i}"),
                timestamp_ms: units_to_ms(w.sample_offset, rate),
                label: w.word.clone(),
            })
            .collect();

        let mut quality = QualityReport::new(render.quality);
        for (name, score) in render.sub_scores {
            quality = quality.with_sub_score(name, score);
        }

        Ok(ModalityPerformance {
            modality: Modality::Audio,
            base_payload: render.media_ref,
            quality,
            duration_ms: units_to_ms(render.sample_count, rate),
            events,
            identity_signal: render.voice_embedding,
            emotional_intensity: render.expressed_intensity,
            metadata: GenerationMetadata {
                model: render.model,
                seed: render.seed,
                cost: render.cost,
                native_unit: format!("samples@{}", render.sample_rate),
                notes: BTreeMap::from([(
                    "sample_count".to_string(),
                    render.sample_count.to_string(),
                )]),
            },
        })
    }
}

#[async_trait]
impl<B: AudioBackend> ModalityGenerator for AudioAdapter<B> {
    fn modality(&self) -> Modality {
        Modality::Audio
    }

    async fn generate(
        &self,
        character: &CharacterModel,
        instructions: &PerformanceInstructionSet,
        ctx: &GenerationContext,
    ) -> Result<ModalityPerformance, GenerationError> {
        let request = AudioRequest::build(character, instructions);
        let render = ctx.guard(Modality::Audio, self.backend.speak(&request)).await?;
        Self::normalize(render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationScope;
    use crate::generator::GenerationCause;
    use std::time::Duration;
    use tokio::time::Instant;

    struct RejectingBackend;

    #[async_trait]
    impl AudioBackend for RejectingBackend {
        async fn speak(&self, _request: &AudioRequest) -> Result<AudioRender, BackendError> {
            Err(BackendError::Rejected("voice clone not permitted".into()))
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl AudioBackend for SlowBackend {
        async fn speak(&self, _request: &AudioRequest) -> Result<AudioRender, BackendError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(BackendError::Unavailable("unreachable".into()))
        }
    }

    struct FixedBackend;

    #[async_trait]
    impl AudioBackend for FixedBackend {
        async fn speak(&self, request: &AudioRequest) -> Result<AudioRender, BackendError> {
            Ok(AudioRender {
                media_ref: format!("audio/{}.wav", request.character_id),
                sample_count: 48_000 * 2,
                sample_rate: 48_000,
                quality: 0.85,
                sub_scores: BTreeMap::new(),
                voice_embedding: vec![0.5, 0.5],
                word_timings: vec![
                    WordTiming { sample_offset: 0, word: "I".into() },
                    WordTiming { sample_offset: 24_000, word: "know".into() },
                ],
                expressed_intensity: None,
                model: "tts-x".into(),
                seed: None,
                cost: 0.01,
            })
        }
    }

    fn ctx(within: Duration) -> GenerationContext {
        GenerationContext::new(Instant::now() + within, CancellationScope::new())
    }

    #[tokio::test]
    async fn test_samples_normalized_to_milliseconds() {
        let adapter = AudioAdapter::new(FixedBackend);
        let perf = adapter
            .generate(
                &CharacterModel::new("mara"),
                &PerformanceInstructionSet::default(),
                &ctx(Duration::from_secs(1)),
            )
            .await
            .unwrap();
        assert_eq!(perf.duration_ms, 2000);
        assert_eq!(perf.events[1].timestamp_ms, 500);
        assert_eq!(perf.base_payload, "audio/mara.wav");
        assert_eq!(perf.metadata.native_unit, "samples@48000");
    }

    #[tokio::test]
    async fn test_rejection_maps_to_rejected_cause() {
        let adapter = AudioAdapter::new(RejectingBackend);
        let err = adapter
            .generate(
                &CharacterModel::new("mara"),
                &PerformanceInstructionSet::default(),
                &ctx(Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.modality, Modality::Audio);
        assert!(matches!(err.cause, GenerationCause::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_hits_deadline() {
        let adapter = AudioAdapter::new(SlowBackend);
        let err = adapter
            .generate(
                &CharacterModel::new("mara"),
                &PerformanceInstructionSet::default(),
                &ctx(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
