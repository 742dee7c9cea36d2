//! Structured observability hooks for the synthesis lifecycle.
//!
//! - [`SynthesisSpan`]: RAII guard entering a run-scoped span
//! - `emit_*` functions for lifecycle events (start, generator attempts and
//!   retries, synchronization, gate evaluation, finish, failure)
//!
//! Events are emitted at `info!` unless noted; filter with `RUST_LOG`.

use tracing::{info, warn};

use crate::domain::{Modality, TimingViolation};
use crate::sync::AnchorSource;

/// RAII guard that enters a run-scoped tracing span.
///
/// ```ignore
/// let _span = SynthesisSpan::enter(&run_id, "mara");
/// // every event below carries run_id and character_id
/// ```
pub struct SynthesisSpan {
    _span: tracing::span::EnteredSpan,
}

impl SynthesisSpan {
    pub fn enter(run_id: &str, character_id: &str) -> Self {
        let span = tracing::info_span!("perfsynth.run", run_id = %run_id, character_id = %character_id);
        Self {
            _span: span.entered(),
        }
    }

    /// The span itself, for instrumenting futures that outlive the guard.
    pub fn span(run_id: &str, character_id: &str) -> tracing::Span {
        tracing::info_span!("perfsynth.run", run_id = %run_id, character_id = %character_id)
    }
}

pub fn emit_synthesis_started(run_id: &str, character_id: &str, request_digest: &str) {
    info!(
        event = "synthesis.started",
        run_id = %run_id,
        character_id = %character_id,
        request_digest = %request_digest,
    );
}

pub fn emit_generator_attempt(modality: Modality, attempt: u32, timeout_ms: u64) {
    tracing::debug!(
        event = "generator.attempt",
        modality = %modality,
        attempt = attempt,
        timeout_ms = timeout_ms,
    );
}

/// Emit event: a generator timed out and is being retried (warn level).
pub fn emit_generator_retry(modality: Modality, next_attempt: u32) {
    warn!(event = "generator.retry", modality = %modality, next_attempt = next_attempt);
}

pub fn emit_synchronized(
    reference_duration_ms: u64,
    sync_points: usize,
    anchor_source: AnchorSource,
    timing_alignment: f64,
) {
    info!(
        event = "synthesis.synchronized",
        reference_duration_ms = reference_duration_ms,
        sync_points = sync_points,
        anchor_source = ?anchor_source,
        timing_alignment = timing_alignment,
    );
}

/// Emit event: a gate was evaluated. `gate` is `"quality"` or `"consistency"`.
pub fn emit_gate_evaluated(gate: &str, aggregate: f64, threshold: f64, passed: bool) {
    info!(
        event = "gate.evaluated",
        gate = %gate,
        aggregate = aggregate,
        threshold = threshold,
        passed = passed,
    );
}

pub fn emit_synthesis_finished(run_id: &str, elapsed_ms: u64, quality: f64, consistency: f64) {
    info!(
        event = "synthesis.finished",
        run_id = %run_id,
        elapsed_ms = elapsed_ms,
        quality = quality,
        consistency = consistency,
    );
}

/// Emit event: the run failed (warn level).
pub fn emit_synthesis_failed(run_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "synthesis.failed", run_id = %run_id, kind = %kind, error = %error);
}

/// Emit event: a timing hint goes backwards (warn level). Not fatal.
pub fn emit_timing_violation(violation: &TimingViolation) {
    warn!(
        event = "instructions.timing_violation",
        list = %violation.list,
        index = violation.index,
        previous_ms = violation.previous_ms,
        current_ms = violation.current_ms,
    );
}
