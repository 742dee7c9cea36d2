//! Modality generators.
//!
//! A [`ModalityGenerator`] turns a character and an instruction set into one
//! [`ModalityPerformance`]. Three concrete adapters wrap black-box backends
//! that report in their own native units:
//!
//! - [`visual`]: frames at a frame rate
//! - [`audio`]: samples at a sample rate
//! - [`animation`]: motion frames at a capture rate
//!
//! Adapters normalize every backend to a millisecond timeline and race the
//! backend call against the request's deadline and cancellation scope, so a
//! slow or hung backend never blocks the orchestrator.

pub mod animation;
pub mod audio;
pub mod visual;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cancel::CancellationScope;
use crate::config::ConfigError;
use crate::domain::{CharacterModel, Modality, ModalityPerformance, PerformanceInstructionSet};

pub use animation::{AnimationAdapter, KeyPose, MotionBackend, MotionRender, MotionRequest};
pub use audio::{AudioAdapter, AudioBackend, AudioRender, AudioRequest, WordTiming};
pub use visual::{Keyframe, VisualAdapter, VisualBackend, VisualRender, VisualRequest};

/// Failure reported by a backend service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused the request (policy, invalid input). Never retried.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Why a generation attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationCause {
    #[error("deadline exceeded")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("invalid backend output: {0}")]
    InvalidOutput(String),
}

/// A failed generation, tagged with the modality that failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{modality} generation failed: {cause}")]
pub struct GenerationError {
    pub modality: Modality,
    pub cause: GenerationCause,
}

impl GenerationError {
    pub fn new(modality: Modality, cause: GenerationCause) -> Self {
        Self { modality, cause }
    }

    pub fn from_backend(modality: Modality, err: BackendError) -> Self {
        let cause = match err {
            BackendError::Rejected(msg) => GenerationCause::Rejected(msg),
            BackendError::Unavailable(msg) => GenerationCause::Backend(msg),
            BackendError::Malformed(msg) => GenerationCause::InvalidOutput(msg),
        };
        Self::new(modality, cause)
    }

    pub fn invalid_output(modality: Modality, message: impl Into<String>) -> Self {
        Self::new(modality, GenerationCause::InvalidOutput(message.into()))
    }

    /// Timeouts are the only retryable cause.
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, GenerationCause::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, GenerationCause::Cancelled)
    }
}

/// Per-attempt execution context handed to a generator.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Instant after which the attempt must give up.
    pub deadline: Instant,
    /// Request-wide cancellation.
    pub cancel: CancellationScope,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl GenerationContext {
    pub fn new(deadline: Instant, cancel: CancellationScope) -> Self {
        Self {
            deadline,
            cancel,
            attempt: 1,
        }
    }

    /// Drive `fut` until it completes, the deadline passes, or the scope is cancelled.
    pub async fn guard<T, F>(&self, modality: Modality, fut: F) -> Result<T, GenerationError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::new(modality, GenerationCause::Cancelled));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(GenerationError::new(modality, GenerationCause::Cancelled))
            }
            outcome = tokio::time::timeout_at(self.deadline, fut) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(GenerationError::from_backend(modality, err)),
                Err(_elapsed) => Err(GenerationError::new(modality, GenerationCause::Timeout)),
            },
        }
    }
}

/// A service that produces one modality of a performance.
#[async_trait]
pub trait ModalityGenerator: Send + Sync {
    /// Which modality this generator produces.
    fn modality(&self) -> Modality;

    async fn generate(
        &self,
        character: &CharacterModel,
        instructions: &PerformanceInstructionSet,
        ctx: &GenerationContext,
    ) -> Result<ModalityPerformance, GenerationError>;
}

/// The three generators of a pipeline, one per modality tag.
#[derive(Clone)]
pub struct GeneratorSet {
    visual: Arc<dyn ModalityGenerator>,
    audio: Arc<dyn ModalityGenerator>,
    animation: Arc<dyn ModalityGenerator>,
}

impl std::fmt::Debug for GeneratorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorSet").finish_non_exhaustive()
    }
}

impl GeneratorSet {
    /// Bundle three generators, rejecting any registered under the wrong tag.
    pub fn new(
        visual: Arc<dyn ModalityGenerator>,
        audio: Arc<dyn ModalityGenerator>,
        animation: Arc<dyn ModalityGenerator>,
    ) -> Result<Self, ConfigError> {
        for (slot, generator) in [
            (Modality::Visual, &visual),
            (Modality::Audio, &audio),
            (Modality::Animation, &animation),
        ] {
            let reported = generator.modality();
            if reported != slot {
                return Err(ConfigError::GeneratorMismatch { slot, reported });
            }
        }
        Ok(Self {
            visual,
            audio,
            animation,
        })
    }

    pub fn get(&self, modality: Modality) -> &Arc<dyn ModalityGenerator> {
        match modality {
            Modality::Visual => &self.visual,
            Modality::Audio => &self.audio,
            Modality::Animation => &self.animation,
        }
    }
}

/// Convert a count of native units at `rate` units/second to milliseconds.
pub(crate) fn units_to_ms(units: u64, rate: f64) -> u64 {
    ((units as f64) * 1000.0 / rate).round() as u64
}

/// Rates must be finite and positive before any conversion.
pub(crate) fn check_rate(modality: Modality, name: &str, rate: f64) -> Result<(), GenerationError> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(GenerationError::invalid_output(
            modality,
            format!("{name} must be positive, got {rate}"),
        ));
    }
    Ok(())
}
