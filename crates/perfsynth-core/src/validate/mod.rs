//! Post-synchronization validators.
//!
//! Both validators are pure functions of an immutable
//! [`SynchronizedPerformance`](crate::sync::SynchronizedPerformance), so the
//! orchestrator runs them concurrently and scoring the same input twice gives
//! bit-identical scorecards.

pub mod consistency;
pub mod quality;

pub use consistency::{
    cosine_similarity, identity_similarity, ConsistencyCheck, ConsistencyValidator,
    EmotionalConsistency,
};
pub use quality::{QualityMetrics, QualityValidator};
