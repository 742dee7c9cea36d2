//! Identity and emotional consistency scoring.
//!
//! Identity: cosine similarity between each modality's identity signal and
//! the character's baseline, mapped from [-1, 1] to [0, 1]. Vectors of
//! different length are compared over their common prefix. A character
//! without a baseline for a dimension imposes no constraint (score 1.0); a
//! baseline with no usable produced signal scores 0.0.
//!
//! Emotion: each modality's reported intensity is compared with the requested
//! one as `1 − |reported − requested| / 100`.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConsistencyWeights};
use crate::domain::{clamp_unit, CharacterModel, ModalityPerformance, PerformanceInstructionSet};
use crate::sync::SynchronizedPerformance;

/// Per-modality agreement with the requested emotional intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalConsistency {
    /// `None` when the modality did not report an intensity.
    pub visual: Option<f64>,
    pub audio: Option<f64>,
    pub animation: Option<f64>,
    /// Mean over the modalities that reported; 0.0 if none did.
    pub cross_modal: f64,
}

/// Consistency scorecard; every value is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    pub visual_identity: f64,
    pub voice_identity: f64,
    pub motion_identity: f64,
    pub emotional_consistency: EmotionalConsistency,
    pub aggregate: f64,
}

/// Cosine similarity over the common prefix of `a` and `b`.
///
/// `None` when the prefix is empty or either side has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    let len = a.len().min(b.len());
    if len == 0 {
        return None;
    }
    let (a, b) = (&a[..len], &b[..len]);

    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        Some(dot / (norm_a * norm_b))
    } else {
        None
    }
}

/// Identity similarity of a produced signal against a baseline, in [0, 1].
pub fn identity_similarity(baseline: &[f32], produced: &[f32]) -> f64 {
    if baseline.iter().all(|x| *x == 0.0) {
        return 1.0;
    }
    match cosine_similarity(baseline, produced) {
        Some(cos) => clamp_unit((cos + 1.0) / 2.0),
        None => 0.0,
    }
}

fn emotional_agreement(perf: &ModalityPerformance, requested: u8) -> Option<f64> {
    perf.emotional_intensity.map(|reported| {
        let reported = if reported.is_nan() { 0.0 } else { reported.clamp(0.0, 100.0) };
        clamp_unit(1.0 - (reported - f64::from(requested)).abs() / 100.0)
    })
}

/// Weighted-mean consistency scorer. Pure and infallible once constructed.
#[derive(Debug, Clone)]
pub struct ConsistencyValidator {
    weights: ConsistencyWeights,
}

impl ConsistencyValidator {
    pub fn new(weights: ConsistencyWeights) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &ConsistencyWeights {
        &self.weights
    }

    pub fn score(
        &self,
        character: &CharacterModel,
        instructions: &PerformanceInstructionSet,
        synced: &SynchronizedPerformance,
    ) -> ConsistencyCheck {
        let baseline = &character.consistency_parameters;
        let visual_identity =
            identity_similarity(&baseline.facial_vector, &synced.visual.identity_signal);
        let voice_identity =
            identity_similarity(&baseline.voice_signature, &synced.audio.identity_signal);
        let motion_identity =
            identity_similarity(&baseline.motion_signature, &synced.animation.identity_signal);

        let requested = instructions.emotional_state.intensity;
        let visual = emotional_agreement(&synced.visual, requested);
        let audio = emotional_agreement(&synced.audio, requested);
        let animation = emotional_agreement(&synced.animation, requested);

        let reported: Vec<f64> = [visual, audio, animation].into_iter().flatten().collect();
        let cross_modal = if reported.is_empty() {
            0.0
        } else {
            reported.iter().sum::<f64>() / reported.len() as f64
        };

        let w = &self.weights;
        let aggregate = clamp_unit(
            w.visual_identity * visual_identity
                + w.voice_identity * voice_identity
                + w.motion_identity * motion_identity
                + w.emotional * cross_modal,
        );

        ConsistencyCheck {
            visual_identity,
            voice_identity,
            motion_identity,
            emotional_consistency: EmotionalConsistency {
                visual,
                audio,
                animation,
                cross_modal,
            },
            aggregate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::domain::{ConsistencyParameters, GenerationMetadata, Modality, QualityReport};
    use crate::sync::SynchronizationEngine;

    fn perf(modality: Modality, signal: Vec<f32>, intensity: Option<f64>) -> ModalityPerformance {
        ModalityPerformance {
            modality,
            base_payload: String::new(),
            quality: QualityReport::new(1.0),
            duration_ms: 1000,
            events: vec![],
            identity_signal: signal,
            emotional_intensity: intensity,
            metadata: GenerationMetadata::default(),
        }
    }

    fn character() -> CharacterModel {
        CharacterModel::new("mara").with_consistency(ConsistencyParameters {
            facial_vector: vec![1.0, 0.0, 0.0],
            voice_signature: vec![0.0, 1.0],
            motion_signature: vec![1.0, 1.0],
        })
    }

    fn instructions(intensity: u8) -> PerformanceInstructionSet {
        let mut set = PerformanceInstructionSet::default();
        set.emotional_state.intensity = intensity;
        set
    }

    fn synced(
        visual: ModalityPerformance,
        audio: ModalityPerformance,
        animation: ModalityPerformance,
    ) -> SynchronizedPerformance {
        SynchronizationEngine::new(SyncConfig::default())
            .unwrap()
            .synchronize(visual, audio, animation, &PerformanceInstructionSet::default())
            .unwrap()
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), Some(-1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[1.0]), None);
        // common prefix only
        assert_eq!(cosine_similarity(&[1.0, 0.0, 5.0], &[1.0, 0.0]), Some(1.0));
    }

    #[test]
    fn test_identity_similarity_mapping() {
        assert_eq!(identity_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(identity_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((identity_similarity(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-12);
        assert_eq!(identity_similarity(&[], &[0.3, 0.4]), 1.0);
        assert_eq!(identity_similarity(&[1.0], &[]), 0.0);
    }

    #[test]
    fn test_full_scorecard() {
        let validator = ConsistencyValidator::new(ConsistencyWeights::default()).unwrap();
        let s = synced(
            perf(Modality::Visual, vec![1.0, 0.0, 0.0], Some(70.0)),
            perf(Modality::Audio, vec![1.0, 0.0], Some(50.0)),
            perf(Modality::Animation, vec![2.0, 2.0], None),
        );
        let check = validator.score(&character(), &instructions(60), &s);

        assert_eq!(check.visual_identity, 1.0);
        assert!((check.voice_identity - 0.5).abs() < 1e-12);
        assert!((check.motion_identity - 1.0).abs() < 1e-12);
        assert!((check.emotional_consistency.visual.unwrap() - 0.9).abs() < 1e-12);
        assert!((check.emotional_consistency.audio.unwrap() - 0.9).abs() < 1e-12);
        assert!(check.emotional_consistency.animation.is_none());
        assert!((check.emotional_consistency.cross_modal - 0.9).abs() < 1e-12);
        // 0.3*1.0 + 0.3*0.5 + 0.2*1.0 + 0.2*0.9
        assert!((check.aggregate - 0.83).abs() < 1e-9);
    }

    #[test]
    fn test_no_reported_intensity_scores_zero_cross_modal() {
        let validator = ConsistencyValidator::new(ConsistencyWeights::default()).unwrap();
        let s = synced(
            perf(Modality::Visual, vec![], None),
            perf(Modality::Audio, vec![], None),
            perf(Modality::Animation, vec![], None),
        );
        let check = validator.score(&CharacterModel::new("mara"), &instructions(10), &s);
        assert_eq!(check.emotional_consistency.cross_modal, 0.0);
        assert!((check.aggregate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_scoring_is_bit_identical_across_calls() {
        let validator = ConsistencyValidator::new(ConsistencyWeights::default()).unwrap();
        let s = synced(
            perf(Modality::Visual, vec![0.3, 0.1, 0.7], Some(33.0)),
            perf(Modality::Audio, vec![0.2, 0.9], Some(81.0)),
            perf(Modality::Animation, vec![0.4, 0.6], Some(12.0)),
        );
        let first = validator.score(&character(), &instructions(45), &s);
        let second = validator.score(&character(), &instructions(45), &s);
        assert_eq!(first.aggregate.to_bits(), second.aggregate.to_bits());
        assert_eq!(first, second);
    }
}
