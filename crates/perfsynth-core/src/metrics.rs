//! Global atomic counters for synthesis runs.
//!
//! Counters are bumped silently at the call site; [`SynthesisMetrics::flush`]
//! emits the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters.
pub static SYNTH_METRICS: SynthesisMetrics = SynthesisMetrics::new();

pub struct SynthesisMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    generator_retries: AtomicU64,
    gate_rejections: AtomicU64,
}

impl Default for SynthesisMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisMetrics {
    pub const fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            generator_retries: AtomicU64::new(0),
            gate_rejections: AtomicU64::new(0),
        }
    }

    pub fn inc_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "syntheses_started", "counter incremented");
    }

    pub fn inc_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "syntheses_succeeded", "counter incremented");
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "syntheses_failed", "counter incremented");
    }

    pub fn inc_generator_retries(&self) {
        self.generator_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generator_retries", "counter incremented");
    }

    /// Counted in addition to `failed` when a run is rejected by a gate.
    pub fn inc_gate_rejections(&self) {
        self.gate_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_rejections", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            syntheses_started = self.started(),
            syntheses_succeeded = self.succeeded(),
            syntheses_failed = self.failed(),
            generator_retries = self.generator_retries(),
            gate_rejections = self.gate_rejections(),
        );
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn generator_retries(&self) -> u64 {
        self.generator_retries.load(Ordering::Relaxed)
    }

    pub fn gate_rejections(&self) -> u64 {
        self.gate_rejections.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (tests).
    pub fn reset(&self) {
        self.started.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.generator_retries.store(0, Ordering::Relaxed);
        self.gate_rejections.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = SynthesisMetrics::new();
        m.inc_started();
        m.inc_started();
        m.inc_failed();
        m.inc_gate_rejections();
        m.inc_generator_retries();
        assert_eq!(m.started(), 2);
        assert_eq!(m.succeeded(), 0);
        assert_eq!(m.failed(), 1);
        assert_eq!(m.gate_rejections(), 1);
        assert_eq!(m.generator_retries(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = SynthesisMetrics::new();
        m.inc_started();
        m.inc_succeeded();
        m.reset();
        assert_eq!(m.started(), 0);
        assert_eq!(m.succeeded(), 0);
    }
}
