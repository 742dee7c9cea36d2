//! perfsynth core library
//!
//! Multi-modal performance synthesis: three modality generators run in
//! parallel, their outputs are time-warped onto one timeline, and the result
//! is gated on quality and character consistency.

pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod generator;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod sync;
pub mod telemetry;
pub mod validate;

pub use cancel::CancellationScope;

pub use config::{
    ConfigError, ConsistencyGateConfig, ConsistencyWeights, GeneratorPolicies, GeneratorPolicy,
    QualityGateConfig, QualityWeights, SyncConfig, SynthesisConfig,
};

pub use domain::{
    request_digest, ActionCue, BaseAnimation, BaseAppearance, BaseVoice, CharacterModel,
    ConsistencyParameters, DialogueLine, EmotionalState, GenerationMetadata, HintList, Modality,
    ModalityInstructions, ModalityPerformance, PerformanceInstructionSet, PhysicalState,
    QualityReport, SceneContext, TimelineEvent, TimingViolation,
};

pub use error::{SynthesisError, SynthesisResult};

pub use generator::{
    AnimationAdapter, AudioAdapter, AudioBackend, AudioRender, AudioRequest, BackendError,
    GenerationCause, GenerationContext, GenerationError, GeneratorSet, KeyPose, Keyframe,
    ModalityGenerator, MotionBackend, MotionRender, MotionRequest, VisualAdapter, VisualBackend,
    VisualRender, VisualRequest, WordTiming,
};

pub use orchestrator::{FinalPerformance, SynthesisOrchestrator, SynthesisSummary};

pub use sync::{
    AnchorSource, EventRef, SyncError, SyncPoint, SynchronizationEngine, SynchronizedPerformance,
    TimeWarp,
};

pub use validate::{
    ConsistencyCheck, ConsistencyValidator, EmotionalConsistency, QualityMetrics, QualityValidator,
};

pub use metrics::SYNTH_METRICS;
pub use obs::SynthesisSpan;
pub use telemetry::init_tracing;

/// perfsynth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
