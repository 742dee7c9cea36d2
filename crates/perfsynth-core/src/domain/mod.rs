//! Domain models for performance synthesis.
//!
//! - `CharacterModel`: read-only character snapshot
//! - `PerformanceInstructionSet`: one synthesis request
//! - `ModalityPerformance`: normalized per-modality generator output
//! - request digests for external caching

pub mod character;
pub mod digest;
pub mod instructions;
pub mod performance;

pub use character::{BaseAnimation, BaseAppearance, BaseVoice, CharacterModel, ConsistencyParameters};
pub use digest::{canonical_json, compute_digest, request_digest};
pub use instructions::{
    ActionCue, DialogueLine, EmotionalState, HintList, ModalityInstructions,
    PerformanceInstructionSet, PhysicalState, SceneContext, TimingViolation, MAX_INTENSITY,
};
pub use performance::{
    clamp_unit, GenerationMetadata, Modality, ModalityPerformance, QualityReport, TimelineEvent,
};
