//! Quality scoring of a synchronized performance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, QualityWeights};
use crate::domain::{clamp_unit, Modality};
use crate::sync::SynchronizedPerformance;

/// Quality scorecard; every value is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub visual: f64,
    pub audio: f64,
    pub animation: f64,
    pub timing_alignment: f64,
    pub aggregate: f64,
    /// Backend sub-scores, passed through per modality.
    pub sub_scores: BTreeMap<Modality, BTreeMap<String, f64>>,
}

impl QualityMetrics {
    /// The weakest scored dimension, for diagnostics.
    pub fn weakest(&self) -> (&'static str, f64) {
        [
            ("visual", self.visual),
            ("audio", self.audio),
            ("animation", self.animation),
            ("timing_alignment", self.timing_alignment),
        ]
        .into_iter()
        .fold(("visual", f64::INFINITY), |acc, (name, score)| {
            if score < acc.1 {
                (name, score)
            } else {
                acc
            }
        })
    }
}

/// Weighted-mean quality scorer. Pure and infallible once constructed.
#[derive(Debug, Clone)]
pub struct QualityValidator {
    weights: QualityWeights,
}

impl QualityValidator {
    /// Weights are validated here so that [`score`](Self::score) cannot fail.
    pub fn new(weights: QualityWeights) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    pub fn score(&self, synced: &SynchronizedPerformance) -> QualityMetrics {
        let visual = clamp_unit(synced.visual.quality.overall);
        let audio = clamp_unit(synced.audio.quality.overall);
        let animation = clamp_unit(synced.animation.quality.overall);
        let timing_alignment = clamp_unit(synced.timing_alignment);

        let w = &self.weights;
        let aggregate = clamp_unit(
            w.visual * visual + w.audio * audio + w.animation * animation + w.sync * timing_alignment,
        );

        let sub_scores = Modality::ALL
            .iter()
            .map(|m| (*m, synced.performance(*m).quality.sub_scores.clone()))
            .collect();

        QualityMetrics {
            visual,
            audio,
            animation,
            timing_alignment,
            aggregate,
            sub_scores,
        }
    }
}
