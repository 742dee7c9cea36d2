//! Synthesis configuration and setup-time validation.
//!
//! Every section defaults to the documented production values, so an empty
//! TOML document is a valid configuration. [`SynthesisConfig::validate`] is
//! run when an orchestrator or validator is constructed; nothing here is
//! re-checked while a request is in flight.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::Modality;

/// Allowed drift of a weight sum away from 1.0.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Upper bound on fallback sync points a single run may produce.
pub const MAX_CADENCE_POINTS: u64 = 100_000;

/// Errors raised while building or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{field} must sum to 1.0, got {sum}")]
    WeightSum { field: String, sum: f64 },

    #[error("generator in the {slot} slot reports modality {reported}")]
    GeneratorMismatch { slot: Modality, reported: Modality },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn check_unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

fn check_weights(field: &str, weights: &[(&str, f64)]) -> Result<(), ConfigError> {
    for (name, w) in weights {
        if !w.is_finite() || *w < 0.0 {
            return Err(invalid(
                &format!("{field}.{name}"),
                format!("weight must be a non-negative number, got {w}"),
            ));
        }
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        return Err(ConfigError::WeightSum {
            field: field.to_string(),
            sum,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// Synchronization engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum divergence of any modality from the longest one, in percent.
    pub tolerance_percent: f64,
    /// Window used to turn a timing error into an accuracy score.
    pub anchor_tolerance_ms: u64,
    /// Spacing of fallback sync points when the request has too few anchors.
    pub cadence_ms: u64,
    /// Slowest permitted playback-rate adjustment.
    pub rate_floor: f64,
    /// Fastest permitted playback-rate adjustment. Warps only stretch shorter
    /// outputs onto the longest one, so rates never exceed 1.0 today; the
    /// bound is kept for a warp that compresses toward a shorter reference.
    pub rate_ceiling: f64,
    /// Longest output the engine accepts. Backends reporting more are rejected.
    pub max_duration_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: 15.0,
            anchor_tolerance_ms: 50,
            cadence_ms: 200,
            rate_floor: 0.85,
            rate_ceiling: 1.15,
            max_duration_ms: 3_600_000,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance_percent > 0.0 && self.tolerance_percent < 100.0) {
            return Err(invalid(
                "sync.tolerance_percent",
                format!("{} is outside (0, 100)", self.tolerance_percent),
            ));
        }
        if self.anchor_tolerance_ms == 0 {
            return Err(invalid("sync.anchor_tolerance_ms", "must be greater than zero"));
        }
        if self.cadence_ms == 0 {
            return Err(invalid("sync.cadence_ms", "must be greater than zero"));
        }
        if self.max_duration_ms == 0 {
            return Err(invalid("sync.max_duration_ms", "must be greater than zero"));
        }
        if self.max_duration_ms / self.cadence_ms > MAX_CADENCE_POINTS {
            return Err(invalid(
                "sync.cadence_ms",
                format!(
                    "{}ms cadence over {}ms yields more than {MAX_CADENCE_POINTS} sync points",
                    self.cadence_ms, self.max_duration_ms
                ),
            ));
        }
        if !(self.rate_floor > 0.0 && self.rate_floor <= 1.0) {
            return Err(invalid(
                "sync.rate_floor",
                format!("{} is outside (0, 1]", self.rate_floor),
            ));
        }
        if !(self.rate_ceiling >= 1.0 && self.rate_ceiling.is_finite()) {
            return Err(invalid(
                "sync.rate_ceiling",
                format!("{} must be a finite value >= 1", self.rate_ceiling),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

/// Weights of the quality aggregate; must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityWeights {
    pub visual: f64,
    pub audio: f64,
    pub animation: f64,
    pub sync: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            visual: 0.3,
            audio: 0.3,
            animation: 0.2,
            sync: 0.2,
        }
    }
}

impl QualityWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_weights(
            "quality.weights",
            &[
                ("visual", self.visual),
                ("audio", self.audio),
                ("animation", self.animation),
                ("sync", self.sync),
            ],
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityGateConfig {
    pub weights: QualityWeights,
    /// Runs whose aggregate quality falls below this are rejected.
    pub min_threshold: f64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            min_threshold: 0.75,
        }
    }
}

impl QualityGateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        check_unit_interval("quality.min_threshold", self.min_threshold)
    }
}

// ---------------------------------------------------------------------------
// Consistency gate
// ---------------------------------------------------------------------------

/// Weights of the consistency aggregate; must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsistencyWeights {
    pub visual_identity: f64,
    pub voice_identity: f64,
    pub motion_identity: f64,
    pub emotional: f64,
}

impl Default for ConsistencyWeights {
    fn default() -> Self {
        Self {
            visual_identity: 0.3,
            voice_identity: 0.3,
            motion_identity: 0.2,
            emotional: 0.2,
        }
    }
}

impl ConsistencyWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_weights(
            "consistency.weights",
            &[
                ("visual_identity", self.visual_identity),
                ("voice_identity", self.voice_identity),
                ("motion_identity", self.motion_identity),
                ("emotional", self.emotional),
            ],
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsistencyGateConfig {
    pub weights: ConsistencyWeights,
    pub min_threshold: f64,
}

impl Default for ConsistencyGateConfig {
    fn default() -> Self {
        Self {
            weights: ConsistencyWeights::default(),
            min_threshold: 0.80,
        }
    }
}

impl ConsistencyGateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        check_unit_interval("consistency.min_threshold", self.min_threshold)
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Timeout and retry policy for one generator.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratorPolicy {
    /// Wall-clock limit for a single attempt.
    pub timeout_ms: u64,
    /// Extra attempts after a timeout (0 = run once). Hard failures are never retried.
    pub max_retries: u32,
}

impl GeneratorPolicy {
    pub fn new(timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            timeout_ms,
            max_retries,
        }
    }

    fn overridden(mut self, patch: Option<PolicyOverride>) -> Self {
        if let Some(patch) = patch {
            if let Some(timeout_ms) = patch.timeout_ms {
                self.timeout_ms = timeout_ms;
            }
            if let Some(max_retries) = patch.max_retries {
                self.max_retries = max_retries;
            }
        }
        self
    }
}

/// A `[generators.<modality>]` table as written; unset knobs keep the
/// modality's default.
#[derive(Debug, Default, Deserialize)]
struct PolicyOverride {
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyOverrides {
    visual: Option<PolicyOverride>,
    audio: Option<PolicyOverride>,
    animation: Option<PolicyOverride>,
}

impl From<PolicyOverrides> for GeneratorPolicies {
    fn from(raw: PolicyOverrides) -> Self {
        let defaults = GeneratorPolicies::default();
        Self {
            visual: defaults.visual.overridden(raw.visual),
            audio: defaults.audio.overridden(raw.audio),
            animation: defaults.animation.overridden(raw.animation),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "PolicyOverrides")]
pub struct GeneratorPolicies {
    pub visual: GeneratorPolicy,
    pub audio: GeneratorPolicy,
    pub animation: GeneratorPolicy,
}

impl Default for GeneratorPolicies {
    fn default() -> Self {
        Self {
            visual: GeneratorPolicy::new(30_000, 1),
            audio: GeneratorPolicy::new(20_000, 1),
            animation: GeneratorPolicy::new(45_000, 1),
        }
    }
}

impl GeneratorPolicies {
    pub fn for_modality(&self, modality: Modality) -> &GeneratorPolicy {
        match modality {
            Modality::Visual => &self.visual,
            Modality::Audio => &self.audio,
            Modality::Animation => &self.animation,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for modality in Modality::ALL {
            if self.for_modality(modality).timeout_ms == 0 {
                return Err(invalid(
                    &format!("generators.{modality}.timeout_ms"),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub sync: SyncConfig,
    pub quality: QualityGateConfig,
    pub consistency: ConsistencyGateConfig,
    pub generators: GeneratorPolicies,
    /// How long cancelled generators get to wind down before being aborted.
    pub cancellation_grace_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            quality: QualityGateConfig::default(),
            consistency: ConsistencyGateConfig::default(),
            generators: GeneratorPolicies::default(),
            cancellation_grace_ms: 250,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()?;
        self.quality.validate()?;
        self.consistency.validate()?;
        self.generators.validate()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SynthesisConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load_path(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}
