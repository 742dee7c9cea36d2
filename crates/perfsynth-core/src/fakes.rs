//! Scripted generators for tests and offline runs.
//!
//! A [`ScriptedGenerator`] plays back a queue of [`ScriptStep`]s, one per
//! `generate` call, and counts how often it was called and how often it saw
//! its request being cancelled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    CharacterModel, GenerationMetadata, Modality, ModalityPerformance, PerformanceInstructionSet,
    QualityReport,
};
use crate::generator::{GenerationCause, GenerationContext, GenerationError, ModalityGenerator};

/// What a scripted generator does on one call.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Wait `after`, then return `performance`.
    Succeed {
        after: Duration,
        performance: ModalityPerformance,
    },
    /// Wait `after`, then fail with `cause`.
    Fail { after: Duration, cause: GenerationCause },
    /// Never finish; resolve with `Cancelled` once the request is cancelled.
    Hang,
    /// Never finish, ignoring cancellation.
    Stall,
}

impl ScriptStep {
    pub fn succeed(performance: ModalityPerformance) -> Self {
        Self::Succeed {
            after: Duration::ZERO,
            performance,
        }
    }

    pub fn succeed_after(after_ms: u64, performance: ModalityPerformance) -> Self {
        Self::Succeed {
            after: Duration::from_millis(after_ms),
            performance,
        }
    }

    pub fn fail(cause: GenerationCause) -> Self {
        Self::Fail {
            after: Duration::ZERO,
            cause,
        }
    }

    pub fn fail_after(after_ms: u64, cause: GenerationCause) -> Self {
        Self::Fail {
            after: Duration::from_millis(after_ms),
            cause,
        }
    }
}

/// Generator that plays back a script. Calls past the end of the script fail
/// with a backend error.
#[derive(Debug)]
pub struct ScriptedGenerator {
    modality: Modality,
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicU32,
    cancellations: AtomicU32,
}

impl ScriptedGenerator {
    pub fn new(modality: Modality, steps: Vec<ScriptStep>) -> Self {
        Self {
            modality,
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
            cancellations: AtomicU32::new(0),
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that ended by observing cancellation.
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<ScriptStep> {
        self.steps.lock().unwrap().pop_front()
    }

    fn cancelled(&self) -> GenerationError {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        GenerationError::new(self.modality, GenerationCause::Cancelled)
    }

    async fn wait(&self, after: Duration, ctx: &GenerationContext) -> Result<(), GenerationError> {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(after) => Ok(()),
        }
    }
}

#[async_trait]
impl ModalityGenerator for ScriptedGenerator {
    fn modality(&self) -> Modality {
        self.modality
    }

    async fn generate(
        &self,
        _character: &CharacterModel,
        _instructions: &PerformanceInstructionSet,
        ctx: &GenerationContext,
    ) -> Result<ModalityPerformance, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(ScriptStep::Succeed { after, performance }) => {
                self.wait(after, ctx).await?;
                Ok(performance)
            }
            Some(ScriptStep::Fail { after, cause }) => {
                self.wait(after, ctx).await?;
                Err(GenerationError::new(self.modality, cause))
            }
            Some(ScriptStep::Hang) => {
                ctx.cancel.cancelled().await;
                Err(self.cancelled())
            }
            Some(ScriptStep::Stall) => std::future::pending().await,
            None => Err(GenerationError::new(
                self.modality,
                GenerationCause::Backend("script exhausted".into()),
            )),
        }
    }
}

/// A plain performance: no events, no identity signal, an expressed
/// intensity of 50.
pub fn performance_fixture(modality: Modality, duration_ms: u64, quality: f64) -> ModalityPerformance {
    ModalityPerformance {
        modality,
        base_payload: format!("fixture://{modality}"),
        quality: QualityReport::new(quality),
        duration_ms,
        events: Vec::new(),
        identity_signal: Vec::new(),
        emotional_intensity: Some(50.0),
        metadata: GenerationMetadata {
            model: format!("{modality}-fixture"),
            cost: 0.01,
            native_unit: "ms".into(),
            ..GenerationMetadata::default()
        },
    }
}
