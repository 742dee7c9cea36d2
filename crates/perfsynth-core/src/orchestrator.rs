//! Synthesis orchestration.
//!
//! One call to [`SynthesisOrchestrator::synthesize`] runs a request through
//! the full pipeline:
//!
//! 1. validate the request against the character
//! 2. fan out to the three generators concurrently, each under its own
//!    timeout; a timed-out generator is retried, any other failure cancels
//!    the siblings and fails the run
//! 3. synchronize the three performances
//! 4. score quality and consistency concurrently
//! 5. gate on both aggregates (quality first)
//!
//! A run either returns a complete [`FinalPerformance`] or a typed
//! [`SynthesisError`]; there is no partial output.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancellationScope;
use crate::config::{ConfigError, GeneratorPolicy, SynthesisConfig};
use crate::domain::{
    request_digest, CharacterModel, Modality, ModalityPerformance, PerformanceInstructionSet,
    TimingViolation, MAX_INTENSITY,
};
use crate::error::{SynthesisError, SynthesisResult};
use crate::generator::{
    GenerationCause, GenerationContext, GenerationError, GeneratorSet, ModalityGenerator,
};
use crate::metrics::SYNTH_METRICS;
use crate::obs;
use crate::sync::{SynchronizationEngine, SynchronizedPerformance};
use crate::validate::{ConsistencyCheck, ConsistencyValidator, QualityMetrics, QualityValidator};

/// Run metadata attached to every successful performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisSummary {
    pub elapsed_ms: u64,
    /// Backend model per modality, as reported by the generator.
    pub models_used: BTreeMap<Modality, String>,
    pub total_cost: f64,
    /// Attempts used per modality (1 = no retry).
    pub attempts: BTreeMap<Modality, u32>,
    /// Digest of (character, instructions); stable across runs.
    pub request_digest: String,
    /// Non-monotonic timing hints found in the instructions.
    pub timing_violations: Vec<TimingViolation>,
    pub generated_at: DateTime<Utc>,
}

/// The validated, synchronized result of one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPerformance {
    pub run_id: Uuid,
    pub character_id: String,
    pub character_version: u32,
    pub synchronization: SynchronizedPerformance,
    pub quality: QualityMetrics,
    pub consistency: ConsistencyCheck,
    pub summary: SynthesisSummary,
}

/// What one generator task reports back to the join loop.
struct GeneratorOutcome {
    modality: Modality,
    attempts: u32,
    result: Result<ModalityPerformance, GenerationError>,
}

/// The three performances of a successful fan-out.
struct Generated {
    visual: ModalityPerformance,
    audio: ModalityPerformance,
    animation: ModalityPerformance,
    attempts: BTreeMap<Modality, u32>,
}

/// Coordinates generators, synchronization and validation for one request at
/// a time. Holds no per-request state, so one instance can serve concurrent
/// requests.
#[derive(Debug, Clone)]
pub struct SynthesisOrchestrator {
    generators: GeneratorSet,
    config: SynthesisConfig,
    engine: SynchronizationEngine,
    quality: Arc<QualityValidator>,
    consistency: Arc<ConsistencyValidator>,
}

impl SynthesisOrchestrator {
    /// Validate `config` and wire up the pipeline. All configuration errors
    /// surface here, never mid-run.
    pub fn new(generators: GeneratorSet, config: SynthesisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let engine = SynchronizationEngine::new(config.sync.clone())?;
        let quality = Arc::new(QualityValidator::new(config.quality.weights.clone())?);
        let consistency = Arc::new(ConsistencyValidator::new(config.consistency.weights.clone())?);
        Ok(Self {
            generators,
            config,
            engine,
            quality,
            consistency,
        })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Synthesize a performance. `deadline` bounds the whole run.
    pub async fn synthesize(
        &self,
        character: Arc<CharacterModel>,
        instructions: Arc<PerformanceInstructionSet>,
        deadline: Option<Instant>,
    ) -> SynthesisResult<FinalPerformance> {
        self.synthesize_with_cancel(character, instructions, deadline, &CancellationScope::new())
            .await
    }

    /// Like [`synthesize`](Self::synthesize), but aborts with
    /// [`SynthesisError::Cancelled`] once `cancel` fires.
    pub async fn synthesize_with_cancel(
        &self,
        character: Arc<CharacterModel>,
        instructions: Arc<PerformanceInstructionSet>,
        deadline: Option<Instant>,
        cancel: &CancellationScope,
    ) -> SynthesisResult<FinalPerformance> {
        let run_id = Uuid::new_v4();
        let run_label = run_id.to_string();
        let span = obs::SynthesisSpan::span(&run_label, &character.character_id);

        async {
            SYNTH_METRICS.inc_started();
            let outcome = self
                .run(run_id, character, instructions, deadline, cancel)
                .await;
            match &outcome {
                Ok(performance) => {
                    SYNTH_METRICS.inc_succeeded();
                    obs::emit_synthesis_finished(
                        &run_label,
                        performance.summary.elapsed_ms,
                        performance.quality.aggregate,
                        performance.consistency.aggregate,
                    );
                }
                Err(err) => {
                    SYNTH_METRICS.inc_failed();
                    if err.is_gate_failure() {
                        SYNTH_METRICS.inc_gate_rejections();
                    }
                    obs::emit_synthesis_failed(&run_label, err.kind(), err);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        character: Arc<CharacterModel>,
        instructions: Arc<PerformanceInstructionSet>,
        deadline: Option<Instant>,
        cancel: &CancellationScope,
    ) -> SynthesisResult<FinalPerformance> {
        let started = Instant::now();

        if instructions.character_id != character.character_id {
            return Err(SynthesisError::MismatchedCharacter {
                expected: character.character_id.clone(),
                actual: instructions.character_id.clone(),
            });
        }
        let intensity = instructions.emotional_state.intensity;
        if intensity > MAX_INTENSITY {
            return Err(SynthesisError::InvalidInstructions(format!(
                "emotional intensity {intensity} exceeds {MAX_INTENSITY}"
            )));
        }

        let digest = request_digest(&character, &instructions)
            .map_err(|e| SynthesisError::Internal(format!("request digest: {e}")))?;
        obs::emit_synthesis_started(&run_id.to_string(), &character.character_id, &digest);

        let timing_violations = instructions.timing_violations();
        for violation in &timing_violations {
            obs::emit_timing_violation(violation);
        }

        let generated = self
            .generate_all(&character, &instructions, deadline, cancel)
            .await?;

        let synced = self.engine.synchronize(
            generated.visual,
            generated.audio,
            generated.animation,
            &instructions,
        )?;
        obs::emit_synchronized(
            synced.reference_duration_ms,
            synced.sync_points.len(),
            synced.anchor_source,
            synced.timing_alignment,
        );

        let synced = Arc::new(synced);
        let (quality, consistency) = self
            .validate(Arc::clone(&synced), &character, &instructions)
            .await?;

        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SynthesisError::DeadlineExceeded);
        }

        self.check_gates(&quality, &consistency)?;

        let synchronization = Arc::try_unwrap(synced).unwrap_or_else(|shared| (*shared).clone());
        let summary = SynthesisSummary {
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            models_used: Modality::ALL
                .iter()
                .map(|m| (*m, synchronization.performance(*m).metadata.model.clone()))
                .collect(),
            total_cost: Modality::ALL
                .iter()
                .map(|m| synchronization.performance(*m).metadata.cost)
                .sum(),
            attempts: generated.attempts,
            request_digest: digest,
            timing_violations,
            generated_at: Utc::now(),
        };

        Ok(FinalPerformance {
            run_id,
            character_id: character.character_id.clone(),
            character_version: character.version,
            synchronization,
            quality,
            consistency,
            summary,
        })
    }

    /// Run the three generators concurrently and join them.
    ///
    /// The first hard failure cancels the request scope; siblings get
    /// `cancellation_grace_ms` to observe it before their tasks are aborted.
    async fn generate_all(
        &self,
        character: &Arc<CharacterModel>,
        instructions: &Arc<PerformanceInstructionSet>,
        deadline: Option<Instant>,
        caller: &CancellationScope,
    ) -> SynthesisResult<Generated> {
        if caller.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }

        let scope = CancellationScope::new();
        let mut tasks = JoinSet::new();
        for modality in Modality::ALL {
            let attempt = run_with_retry(
                Arc::clone(self.generators.get(modality)),
                modality,
                self.config.generators.for_modality(modality).clone(),
                Arc::clone(character),
                Arc::clone(instructions),
                deadline,
                scope.clone(),
            );
            tasks.spawn(attempt.instrument(tracing::Span::current()));
        }

        let mut produced: BTreeMap<Modality, ModalityPerformance> = BTreeMap::new();
        let mut attempts = BTreeMap::new();

        let failure = loop {
            let joined = tokio::select! {
                biased;
                _ = caller.cancelled() => break Some(SynthesisError::Cancelled),
                _ = deadline_reached(deadline) => break Some(SynthesisError::DeadlineExceeded),
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break None };

            match joined {
                Ok(outcome) => {
                    attempts.insert(outcome.modality, outcome.attempts);
                    match outcome.result {
                        Ok(performance) => {
                            debug!(modality = %outcome.modality, duration_ms = performance.duration_ms, "generator finished");
                            produced.insert(outcome.modality, performance);
                        }
                        Err(err) => break Some(classify(err, deadline, caller)),
                    }
                }
                Err(join_err) => {
                    break Some(SynthesisError::Internal(format!(
                        "generator task failed: {join_err}"
                    )))
                }
            }
        };

        if let Some(err) = failure {
            scope.cancel();
            self.wind_down(&mut tasks).await;
            return Err(err);
        }

        let mut take = |modality: Modality| {
            produced.remove(&modality).ok_or_else(|| {
                SynthesisError::Internal(format!("no {modality} performance produced"))
            })
        };
        Ok(Generated {
            visual: take(Modality::Visual)?,
            audio: take(Modality::Audio)?,
            animation: take(Modality::Animation)?,
            attempts,
        })
    }

    /// Give cancelled generators the grace period, then abort whatever is left.
    async fn wind_down(&self, tasks: &mut JoinSet<GeneratorOutcome>) {
        let grace = Duration::from_millis(self.config.cancellation_grace_ms);
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                grace_ms = self.config.cancellation_grace_ms,
                "generators ignored cancellation, aborting"
            );
            tasks.abort_all();
        }
    }

    async fn validate(
        &self,
        synced: Arc<SynchronizedPerformance>,
        character: &Arc<CharacterModel>,
        instructions: &Arc<PerformanceInstructionSet>,
    ) -> SynthesisResult<(QualityMetrics, ConsistencyCheck)> {
        let quality = {
            let validator = Arc::clone(&self.quality);
            let synced = Arc::clone(&synced);
            tokio::spawn(async move { validator.score(&synced) })
        };
        let consistency = {
            let validator = Arc::clone(&self.consistency);
            let character = Arc::clone(character);
            let instructions = Arc::clone(instructions);
            tokio::spawn(async move { validator.score(&character, &instructions, &synced) })
        };

        futures::future::try_join(quality, consistency)
            .await
            .map_err(|e| SynthesisError::Internal(format!("validator task failed: {e}")))
    }

    fn check_gates(
        &self,
        quality: &QualityMetrics,
        consistency: &ConsistencyCheck,
    ) -> SynthesisResult<()> {
        let threshold = self.config.quality.min_threshold;
        let passed = quality.aggregate >= threshold;
        obs::emit_gate_evaluated("quality", quality.aggregate, threshold, passed);
        if !passed {
            return Err(SynthesisError::QualityGateFailed {
                scorecard: Box::new(quality.clone()),
                threshold,
                shortfall: threshold - quality.aggregate,
            });
        }

        let threshold = self.config.consistency.min_threshold;
        let passed = consistency.aggregate >= threshold;
        obs::emit_gate_evaluated("consistency", consistency.aggregate, threshold, passed);
        if !passed {
            return Err(SynthesisError::ConsistencyGateFailed {
                scorecard: Box::new(consistency.clone()),
                threshold,
                shortfall: threshold - consistency.aggregate,
            });
        }
        Ok(())
    }
}

/// Drive one generator, retrying timed-out attempts up to the policy limit.
///
/// Each attempt gets a fresh per-modality timeout, capped by the overall
/// deadline. The orchestrator also enforces the attempt deadline itself, so a
/// generator that never checks its context still cannot overrun.
async fn run_with_retry(
    generator: Arc<dyn ModalityGenerator>,
    modality: Modality,
    policy: GeneratorPolicy,
    character: Arc<CharacterModel>,
    instructions: Arc<PerformanceInstructionSet>,
    deadline: Option<Instant>,
    scope: CancellationScope,
) -> GeneratorOutcome {
    let mut attempt = 1;
    loop {
        let per_attempt = Instant::now() + Duration::from_millis(policy.timeout_ms);
        let attempt_deadline = deadline.map_or(per_attempt, |d| per_attempt.min(d));
        let mut ctx = GenerationContext::new(attempt_deadline, scope.clone());
        ctx.attempt = attempt;

        obs::emit_generator_attempt(modality, attempt, policy.timeout_ms);
        let result = match tokio::time::timeout_at(
            attempt_deadline,
            generator.generate(&character, &instructions, &ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(GenerationError::new(modality, GenerationCause::Timeout)),
        };

        let retryable = matches!(&result, Err(err) if err.is_timeout())
            && attempt <= policy.max_retries
            && !scope.is_cancelled()
            && !deadline.is_some_and(|d| Instant::now() >= d);
        if !retryable {
            return GeneratorOutcome {
                modality,
                attempts: attempt,
                result,
            };
        }

        attempt += 1;
        SYNTH_METRICS.inc_generator_retries();
        obs::emit_generator_retry(modality, attempt);
    }
}

/// Map a generator failure to the run-level error.
fn classify(
    err: GenerationError,
    deadline: Option<Instant>,
    caller: &CancellationScope,
) -> SynthesisError {
    if err.is_timeout() && deadline.is_some_and(|d| Instant::now() >= d) {
        SynthesisError::DeadlineExceeded
    } else if err.is_cancelled() && caller.is_cancelled() {
        SynthesisError::Cancelled
    } else {
        SynthesisError::GenerationFailed(err)
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
