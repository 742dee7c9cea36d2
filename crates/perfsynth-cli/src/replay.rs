//! Replay backends: serve recorded backend outputs from a JSON manifest.
//!
//! A manifest holds one entry per modality. Each entry is either a recorded
//! render or a recorded failure, plus an optional latency, so a production
//! run (including a slow or failing backend) can be reproduced offline.
//!
//! ```json
//! {
//!   "visual":    { "latency_ms": 120, "outcome": { "render": { ... } } },
//!   "audio":     { "outcome": { "failure": { "kind": "rejected", "message": "..." } } },
//!   "animation": { "outcome": { "render": { ... } } }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use perfsynth_core::{
    AnimationAdapter, AudioAdapter, AudioBackend, AudioRender, AudioRequest, BackendError,
    GeneratorSet, MotionBackend, MotionRender, MotionRequest, VisualAdapter, VisualBackend,
    VisualRender, VisualRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Rejected,
    Unavailable,
    Malformed,
}

/// What the backend did on the recorded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recorded<T> {
    Render(T),
    Failure { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry<T> {
    /// Simulated backend latency.
    #[serde(default)]
    pub latency_ms: u64,
    pub outcome: Recorded<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderManifest {
    pub visual: ReplayEntry<VisualRender>,
    pub audio: ReplayEntry<AudioRender>,
    pub animation: ReplayEntry<MotionRender>,
}

impl RenderManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read render manifest {:?}", path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse render manifest {:?}", path))
    }

    /// Wrap every entry in its modality adapter.
    pub fn into_generators(self) -> Result<GeneratorSet> {
        GeneratorSet::new(
            Arc::new(VisualAdapter::new(ReplayBackend::new(self.visual))),
            Arc::new(AudioAdapter::new(ReplayBackend::new(self.audio))),
            Arc::new(AnimationAdapter::new(ReplayBackend::new(self.animation))),
        )
        .context("Failed to assemble replay generators")
    }
}

/// A backend that answers every request with one recorded entry.
pub struct ReplayBackend<T> {
    entry: ReplayEntry<T>,
}

impl<T: Clone + Send + Sync> ReplayBackend<T> {
    pub fn new(entry: ReplayEntry<T>) -> Self {
        Self { entry }
    }

    async fn replay(&self) -> Result<T, BackendError> {
        if self.entry.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.entry.latency_ms)).await;
        }
        match &self.entry.outcome {
            Recorded::Render(render) => Ok(render.clone()),
            Recorded::Failure { kind, message } => Err(match kind {
                FailureKind::Rejected => BackendError::Rejected(message.clone()),
                FailureKind::Unavailable => BackendError::Unavailable(message.clone()),
                FailureKind::Malformed => BackendError::Malformed(message.clone()),
            }),
        }
    }
}

#[async_trait]
impl VisualBackend for ReplayBackend<VisualRender> {
    async fn render(&self, _request: &VisualRequest) -> Result<VisualRender, BackendError> {
        self.replay().await
    }
}

#[async_trait]
impl AudioBackend for ReplayBackend<AudioRender> {
    async fn speak(&self, _request: &AudioRequest) -> Result<AudioRender, BackendError> {
        self.replay().await
    }
}

#[async_trait]
impl MotionBackend for ReplayBackend<MotionRender> {
    async fn animate(&self, _request: &MotionRequest) -> Result<MotionRender, BackendError> {
        self.replay().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use perfsynth_core::{
        CancellationScope, CharacterModel, GenerationCause, GenerationContext, Modality,
        PerformanceInstructionSet,
    };
    use serde_json::json;
    use tokio::time::Instant;

    /// A manifest whose three renders all last two seconds.
    pub(crate) fn manifest_json() -> serde_json::Value {
        json!({
            "visual": {
                "latency_ms": 50,
                "outcome": { "render": {
                    "media_ref": "renders/mara.mp4",
                    "frame_count": 48,
                    "fps": 24.0,
                    "quality": 0.9,
                    "keyframes": [{ "frame": 12, "label": "glance" }],
                    "expressed_intensity": 60.0,
                    "model": "vis-2"
                }}
            },
            "audio": {
                "outcome": { "render": {
                    "media_ref": "renders/mara.wav",
                    "sample_count": 96000,
                    "sample_rate": 48000,
                    "quality": 0.88,
                    "word_timings": [{ "sample_offset": 24000, "word": "now" }],
                    "expressed_intensity": 55.0,
                    "model": "tts-x"
                }}
            },
            "animation": {
                "outcome": { "render": {
                    "clip_ref": "renders/mara.bvh",
                    "frame_count": 120,
                    "frame_rate": 60.0,
                    "quality": 0.86,
                    "expressed_intensity": 58.0,
                    "model": "motion-3"
                }}
            }
        })
    }

    #[test]
    fn test_manifest_parses() {
        let manifest: RenderManifest = serde_json::from_value(manifest_json()).unwrap();
        assert_eq!(manifest.visual.latency_ms, 50);
        assert_eq!(manifest.audio.latency_ms, 0);
        assert!(matches!(manifest.animation.outcome, Recorded::Render(ref r) if r.frame_rate == 60.0));
    }

    #[tokio::test]
    async fn test_recorded_failure_is_replayed() {
        let backend: ReplayBackend<AudioRender> = ReplayBackend::new(ReplayEntry {
            latency_ms: 0,
            outcome: Recorded::Failure {
                kind: FailureKind::Rejected,
                message: "voice not licensed".into(),
            },
        });
        let adapter = AudioAdapter::new(backend);
        let ctx = GenerationContext::new(
            Instant::now() + Duration::from_secs(1),
            CancellationScope::new(),
        );
        let err = perfsynth_core::ModalityGenerator::generate(
            &adapter,
            &CharacterModel::new("mara"),
            &PerformanceInstructionSet::default(),
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.modality, Modality::Audio);
        assert_eq!(err.cause, GenerationCause::Rejected("voice not licensed".into()));
    }

    #[test]
    fn test_manifest_load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renders.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = RenderManifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse render manifest"));
    }
}
