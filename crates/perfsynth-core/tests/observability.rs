//! Observability tests for the synthesis lifecycle.

use std::sync::Arc;

use perfsynth_core::fakes::{performance_fixture, ScriptStep, ScriptedGenerator};
use perfsynth_core::obs::{
    emit_gate_evaluated, emit_generator_retry, emit_synthesis_failed, emit_synthesis_started,
    emit_timing_violation, SynthesisSpan,
};
use perfsynth_core::{
    CharacterModel, DialogueLine, GeneratorSet, HintList, Modality, PerformanceInstructionSet,
    SynthesisConfig, SynthesisOrchestrator, TimingViolation, SYNTH_METRICS,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_lifecycle_events_are_logged() {
    let _span = SynthesisSpan::enter("run-obs-1", "mara");
    emit_synthesis_started("run-obs-1", "mara", "abc123");
    emit_gate_evaluated("quality", 0.91, 0.75, true);
    emit_generator_retry(Modality::Audio, 2);

    assert!(logs_contain("synthesis.started"));
    assert!(logs_contain("request_digest=abc123"));
    assert!(logs_contain("gate.evaluated"));
    assert!(logs_contain("generator.retry"));
}

#[traced_test]
#[test]
fn test_failure_and_violation_warnings() {
    emit_synthesis_failed("run-obs-2", "cancelled", &"synthesis cancelled");
    emit_timing_violation(&TimingViolation {
        list: HintList::Dialogue,
        index: 2,
        previous_ms: 1500,
        current_ms: 900,
    });

    assert!(logs_contain("synthesis.failed"));
    assert!(logs_contain("instructions.timing_violation"));
    assert!(logs_contain("previous_ms=1500"));
}

fn ok(modality: Modality) -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator::new(
        modality,
        vec![ScriptStep::succeed(performance_fixture(modality, 1000, 0.9))],
    ))
}

#[traced_test]
#[tokio::test]
async fn test_run_emits_lifecycle_and_timing_violations() {
    let generators = GeneratorSet::new(
        ok(Modality::Visual),
        ok(Modality::Audio),
        ok(Modality::Animation),
    )
    .unwrap();
    let orch = SynthesisOrchestrator::new(generators, SynthesisConfig::default()).unwrap();

    let mut instructions = PerformanceInstructionSet {
        character_id: "mara".into(),
        ..Default::default()
    };
    instructions.emotional_state.intensity = 50;
    instructions.dialogue = vec![
        DialogueLine {
            text: "Later.".into(),
            start_ms: Some(800),
            ..Default::default()
        },
        DialogueLine {
            text: "Earlier?".into(),
            start_ms: Some(200),
            ..Default::default()
        },
    ];

    let started_before = SYNTH_METRICS.started();
    let result = orch
        .synthesize(
            Arc::new(CharacterModel::new("mara")),
            Arc::new(instructions),
            None,
        )
        .await
        .expect("run succeeds");

    assert_eq!(result.summary.timing_violations.len(), 1);
    assert!(SYNTH_METRICS.started() > started_before);
    assert!(logs_contain("synthesis.started"));
    assert!(logs_contain("instructions.timing_violation"));
    assert!(logs_contain("synthesis.synchronized"));
    assert!(logs_contain("synthesis.finished"));
}
