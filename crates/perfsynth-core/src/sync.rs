//! Cross-modal synchronization.
//!
//! The engine stretches every modality onto the timeline of the longest one
//! (the *reference*), then measures alignment at a set of sync points:
//!
//! 1. reference duration = max of the three durations; a zero duration is a
//!    degenerate output and anything past `max_duration_ms` is rejected.
//! 2. each modality gets a scale factor `reference / duration` and a playback
//!    rate `duration / reference`. Divergence beyond the configured tolerance,
//!    or a rate outside `[rate_floor, rate_ceiling]`, fails the run instead of
//!    distorting the performance.
//! 3. dialogue/action start hints are anchors. For each anchor the nearest
//!    native event of every modality is warped onto the reference timeline and
//!    compared with the anchor.
//! 4. fewer than two distinct anchors falls back to evenly spaced points
//!    every `cadence_ms`, so a successful run always has sync points.
//! 5. `timing_alignment` is the mean point accuracy.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SyncConfig};
use crate::domain::{clamp_unit, Modality, ModalityPerformance, PerformanceInstructionSet};

/// Slack for floating-point comparisons against configured bounds.
const BOUND_EPSILON: f64 = 1e-9;

/// Synchronization failures. None of these are retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("{modality} output has zero duration")]
    DegenerateOutput { modality: Modality },

    #[error(
        "{modality} duration {duration_ms}ms diverges {divergence_percent:.1}% from reference \
         {reference_ms}ms (tolerance {tolerance_percent}%)"
    )]
    DurationDivergence {
        modality: Modality,
        duration_ms: u64,
        reference_ms: u64,
        divergence_percent: f64,
        tolerance_percent: f64,
    },

    #[error("{modality} duration {duration_ms}ms exceeds the {max_ms}ms limit")]
    DurationTooLong {
        modality: Modality,
        duration_ms: u64,
        max_ms: u64,
    },

    #[error("{modality} playback rate {rate:.3} outside [{floor}, {ceiling}]")]
    RateOutOfBounds {
        modality: Modality,
        rate: f64,
        floor: f64,
        ceiling: f64,
    },

    #[error("expected {expected} performance, got {found}")]
    ModalityMismatch { expected: Modality, found: Modality },
}

/// Time-warp applied to one modality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWarp {
    pub modality: Modality,
    pub native_duration_ms: u64,
    /// Multiplier from native to reference time (>= 1 for every modality).
    pub scale_factor: f64,
    /// Playback-rate adjustment, `1 / scale_factor` (<= 1, shorter outputs are slowed).
    pub playback_rate: f64,
}

impl TimeWarp {
    pub fn to_warped(&self, native_ms: u64) -> u64 {
        (native_ms as f64 * self.scale_factor).round() as u64
    }

    pub fn to_native(&self, warped_ms: u64) -> u64 {
        (warped_ms as f64 / self.scale_factor).round() as u64
    }
}

/// One modality's contribution to a sync point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    /// Matched native event, if the modality reported one.
    pub event_id: Option<String>,
    pub native_ms: u64,
    pub warped_ms: u64,
    /// `warped_ms − sync point timestamp`.
    pub offset_ms: i64,
}

/// A cross-modal timestamp correlation on the reference timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub timestamp_ms: u64,
    pub visual: EventRef,
    pub audio: EventRef,
    pub animation: EventRef,
    pub alignment_accuracy: f64,
}

impl SyncPoint {
    pub fn event(&self, modality: Modality) -> &EventRef {
        match modality {
            Modality::Visual => &self.visual,
            Modality::Audio => &self.audio,
            Modality::Animation => &self.animation,
        }
    }

    /// Largest absolute offset across the three modalities.
    pub fn max_offset_ms(&self) -> u64 {
        Modality::ALL
            .iter()
            .map(|m| self.event(*m).offset_ms.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

/// Where the sync points of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    /// Dialogue/action timing hints.
    Instructions,
    /// Fixed-cadence fallback.
    Cadence,
}

/// Aligned composite of the three modality performances. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizedPerformance {
    pub visual: ModalityPerformance,
    pub audio: ModalityPerformance,
    pub animation: ModalityPerformance,
    pub reference_duration_ms: u64,
    /// Warps in [`Modality::ALL`] order.
    pub warps: [TimeWarp; 3],
    /// Strictly increasing in `timestamp_ms`; never empty.
    pub sync_points: Vec<SyncPoint>,
    pub anchor_source: AnchorSource,
    pub timing_alignment: f64,
}

impl SynchronizedPerformance {
    pub fn performance(&self, modality: Modality) -> &ModalityPerformance {
        match modality {
            Modality::Visual => &self.visual,
            Modality::Audio => &self.audio,
            Modality::Animation => &self.animation,
        }
    }

    pub fn warp(&self, modality: Modality) -> &TimeWarp {
        match modality {
            Modality::Visual => &self.warps[0],
            Modality::Audio => &self.warps[1],
            Modality::Animation => &self.warps[2],
        }
    }
}

/// Computes time-warps and sync points for one run.
#[derive(Debug, Clone)]
pub struct SynchronizationEngine {
    config: SyncConfig,
}

impl SynchronizationEngine {
    pub fn new(config: SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn synchronize(
        &self,
        visual: ModalityPerformance,
        audio: ModalityPerformance,
        animation: ModalityPerformance,
        instructions: &PerformanceInstructionSet,
    ) -> Result<SynchronizedPerformance, SyncError> {
        let performances = [&visual, &audio, &animation];
        for (expected, perf) in Modality::ALL.iter().zip(performances) {
            if perf.modality != *expected {
                return Err(SyncError::ModalityMismatch {
                    expected: *expected,
                    found: perf.modality,
                });
            }
            if perf.duration_ms == 0 {
                return Err(SyncError::DegenerateOutput {
                    modality: perf.modality,
                });
            }
        }

        let reference_ms = performances
            .iter()
            .map(|p| p.duration_ms)
            .max()
            .unwrap_or(0);

        if reference_ms > self.config.max_duration_ms {
            let longest = performances
                .iter()
                .find(|p| p.duration_ms == reference_ms)
                .map(|p| p.modality)
                .unwrap_or(Modality::Visual);
            return Err(SyncError::DurationTooLong {
                modality: longest,
                duration_ms: reference_ms,
                max_ms: self.config.max_duration_ms,
            });
        }

        let warps = [
            self.warp_for(&visual, reference_ms)?,
            self.warp_for(&audio, reference_ms)?,
            self.warp_for(&animation, reference_ms)?,
        ];

        let anchors: Vec<u64> = instructions
            .anchor_timestamps()
            .into_iter()
            .filter(|t| *t <= reference_ms)
            .collect();

        let (anchor_source, sync_points): (AnchorSource, Vec<SyncPoint>) = if anchors.len() >= 2 {
            let points = anchors
                .iter()
                .map(|t| self.anchored_point(*t, performances, &warps))
                .collect();
            (AnchorSource::Instructions, points)
        } else {
            let cadence = usize::try_from(self.config.cadence_ms).unwrap_or(usize::MAX);
            let points = (0..=reference_ms)
                .step_by(cadence)
                .map(|t| self.cadence_point(t, performances, &warps))
                .collect();
            (AnchorSource::Cadence, points)
        };

        let timing_alignment = mean_accuracy(&sync_points);

        Ok(SynchronizedPerformance {
            visual,
            audio,
            animation,
            reference_duration_ms: reference_ms,
            warps,
            sync_points,
            anchor_source,
            timing_alignment,
        })
    }

    fn warp_for(&self, perf: &ModalityPerformance, reference_ms: u64) -> Result<TimeWarp, SyncError> {
        let duration = perf.duration_ms as f64;
        let reference = reference_ms as f64;

        let divergence_percent = (reference - duration) / reference * 100.0;
        if divergence_percent > self.config.tolerance_percent + BOUND_EPSILON {
            return Err(SyncError::DurationDivergence {
                modality: perf.modality,
                duration_ms: perf.duration_ms,
                reference_ms,
                divergence_percent,
                tolerance_percent: self.config.tolerance_percent,
            });
        }

        let scale_factor = reference / duration;
        let playback_rate = duration / reference;
        if playback_rate < self.config.rate_floor - BOUND_EPSILON
            || playback_rate > self.config.rate_ceiling + BOUND_EPSILON
        {
            return Err(SyncError::RateOutOfBounds {
                modality: perf.modality,
                rate: playback_rate,
                floor: self.config.rate_floor,
                ceiling: self.config.rate_ceiling,
            });
        }

        Ok(TimeWarp {
            modality: perf.modality,
            native_duration_ms: perf.duration_ms,
            scale_factor,
            playback_rate,
        })
    }

    fn accuracy(&self, max_offset_ms: u64) -> f64 {
        clamp_unit(1.0 - max_offset_ms as f64 / self.config.anchor_tolerance_ms as f64)
    }

    /// Sync point at an instruction anchor: every modality is matched to its
    /// nearest native event and judged by how far that event lands from the anchor.
    fn anchored_point(
        &self,
        anchor_ms: u64,
        performances: [&ModalityPerformance; 3],
        warps: &[TimeWarp; 3],
    ) -> SyncPoint {
        let refs = std::array::from_fn(|i| {
            let warp = &warps[i];
            let target = warp.to_native(anchor_ms);
            match nearest_event(performances[i], target) {
                Some((id, native_ms)) => event_ref(Some(id), native_ms, warp, anchor_ms),
                None => event_ref(None, target, warp, anchor_ms),
            }
        });
        self.assemble(anchor_ms, refs)
    }

    /// Cadence point: modalities are treated as continuous timelines. A native
    /// event inside the tolerance window is referenced for diagnostics only.
    fn cadence_point(
        &self,
        timestamp_ms: u64,
        performances: [&ModalityPerformance; 3],
        warps: &[TimeWarp; 3],
    ) -> SyncPoint {
        let window = self.config.anchor_tolerance_ms;
        let refs = std::array::from_fn(|i| {
            let warp = &warps[i];
            let native_ms = warp.to_native(timestamp_ms);
            let nearby = nearest_event(performances[i], native_ms)
                .filter(|(_, ev_ms)| warp.to_warped(*ev_ms).abs_diff(timestamp_ms) <= window)
                .map(|(id, _)| id);
            event_ref(nearby, native_ms, warp, timestamp_ms)
        });
        self.assemble(timestamp_ms, refs)
    }

    fn assemble(&self, timestamp_ms: u64, refs: [EventRef; 3]) -> SyncPoint {
        let [visual, audio, animation] = refs;
        let mut point = SyncPoint {
            timestamp_ms,
            visual,
            audio,
            animation,
            alignment_accuracy: 0.0,
        };
        point.alignment_accuracy = self.accuracy(point.max_offset_ms());
        point
    }
}

fn event_ref(event_id: Option<String>, native_ms: u64, warp: &TimeWarp, at_ms: u64) -> EventRef {
    let warped_ms = warp.to_warped(native_ms);
    EventRef {
        event_id,
        native_ms,
        warped_ms,
        offset_ms: warped_ms as i64 - at_ms as i64,
    }
}

/// Nearest native event to `target_ms`; ties resolve to the earlier event.
fn nearest_event(perf: &ModalityPerformance, target_ms: u64) -> Option<(String, u64)> {
    perf.events
        .iter()
        .min_by_key(|e| (e.timestamp_ms.abs_diff(target_ms), e.timestamp_ms))
        .map(|e| (e.id.clone(), e.timestamp_ms))
}

fn mean_accuracy(points: &[SyncPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.alignment_accuracy).sum::<f64>() / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionCue, DialogueLine, GenerationMetadata, QualityReport, TimelineEvent};

    fn perf(modality: Modality, duration_ms: u64, events: &[u64]) -> ModalityPerformance {
        ModalityPerformance {
            modality,
            base_payload: format!("{modality}.bin"),
            quality: QualityReport::new(0.9),
            duration_ms,
            events: events
                .iter()
                .enumerate()
                .map(|(i, t)| TimelineEvent {
                    id: format!("{modality}:{i}"),
                    timestamp_ms: *t,
                    label: String::new(),
                })
                .collect(),
            identity_signal: vec![],
            emotional_intensity: None,
            metadata: GenerationMetadata::default(),
        }
    }

    fn engine() -> SynchronizationEngine {
        SynchronizationEngine::new(SyncConfig::default()).unwrap()
    }

    fn with_dialogue(starts: &[u64]) -> PerformanceInstructionSet {
        PerformanceInstructionSet {
            dialogue: starts
                .iter()
                .map(|s| DialogueLine {
                    text: "line".into(),
                    start_ms: Some(*s),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_duration_is_degenerate() {
        let err = engine()
            .synchronize(
                perf(Modality::Visual, 1000, &[]),
                perf(Modality::Audio, 0, &[]),
                perf(Modality::Animation, 1000, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap_err();
        assert_eq!(err, SyncError::DegenerateOutput { modality: Modality::Audio });
    }

    #[test]
    fn test_divergence_boundary() {
        let base = 1000;
        let err = engine()
            .synchronize(
                perf(Modality::Visual, base, &[]),
                perf(Modality::Audio, base, &[]),
                perf(Modality::Animation, 1200, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::DurationDivergence { modality: Modality::Visual, .. }));

        let ok = engine()
            .synchronize(
                perf(Modality::Visual, base, &[]),
                perf(Modality::Audio, base, &[]),
                perf(Modality::Animation, 1100, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap();
        assert_eq!(ok.reference_duration_ms, 1100);
        assert!((ok.warp(Modality::Visual).scale_factor - 1.1).abs() < 1e-9);
        assert_eq!(ok.warp(Modality::Animation).scale_factor, 1.0);
    }

    #[test]
    fn test_absurd_duration_rejected_before_building_points() {
        let err = engine()
            .synchronize(
                perf(Modality::Visual, u64::MAX, &[]),
                perf(Modality::Audio, u64::MAX, &[]),
                perf(Modality::Animation, u64::MAX, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::DurationTooLong {
                modality: Modality::Visual,
                duration_ms: u64::MAX,
                max_ms: SyncConfig::default().max_duration_ms,
            }
        );
    }

    #[test]
    fn test_duration_at_limit_is_accepted() {
        let config = SyncConfig {
            max_duration_ms: 2_000,
            ..SyncConfig::default()
        };
        let engine = SynchronizationEngine::new(config).unwrap();
        let synced = engine
            .synchronize(
                perf(Modality::Visual, 2_000, &[]),
                perf(Modality::Audio, 2_000, &[]),
                perf(Modality::Animation, 2_000, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap();
        assert_eq!(synced.sync_points.len(), 11);

        let err = engine
            .synchronize(
                perf(Modality::Visual, 2_000, &[]),
                perf(Modality::Audio, 2_001, &[]),
                perf(Modality::Animation, 2_000, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::DurationTooLong { modality: Modality::Audio, .. }));
    }

    #[test]
    fn test_modality_mismatch_rejected() {
        let err = engine()
            .synchronize(
                perf(Modality::Audio, 1000, &[]),
                perf(Modality::Audio, 1000, &[]),
                perf(Modality::Animation, 1000, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::ModalityMismatch {
                expected: Modality::Visual,
                found: Modality::Audio
            }
        );
    }

    #[test]
    fn test_rate_floor_enforced_independently_of_tolerance() {
        let config = SyncConfig {
            tolerance_percent: 50.0,
            rate_floor: 0.9,
            ..SyncConfig::default()
        };
        let err = SynchronizationEngine::new(config)
            .unwrap()
            .synchronize(
                perf(Modality::Visual, 800, &[]),
                perf(Modality::Audio, 1000, &[]),
                perf(Modality::Animation, 1000, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::RateOutOfBounds { modality: Modality::Visual, .. }));
    }

    #[test]
    fn test_cadence_fallback_without_anchors() {
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 1000, &[]),
                perf(Modality::Audio, 1000, &[]),
                perf(Modality::Animation, 1000, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap();
        assert_eq!(synced.anchor_source, AnchorSource::Cadence);
        let stamps: Vec<u64> = synced.sync_points.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 200, 400, 600, 800, 1000]);
        assert_eq!(synced.timing_alignment, 1.0);
    }

    #[test]
    fn test_single_anchor_falls_back_to_cadence() {
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 500, &[]),
                perf(Modality::Audio, 500, &[]),
                perf(Modality::Animation, 500, &[]),
                &with_dialogue(&[100, 100]),
            )
            .unwrap();
        assert_eq!(synced.anchor_source, AnchorSource::Cadence);
        assert_eq!(synced.sync_points.len(), 3);
    }

    #[test]
    fn test_anchor_accuracy_uses_worst_modality() {
        let mut instructions = with_dialogue(&[0, 1000]);
        instructions.actions.push(ActionCue {
            description: "exit".into(),
            start_ms: Some(5000),
            duration_ms: None,
        });
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 2000, &[0, 1000]),
                perf(Modality::Audio, 2000, &[10, 1025]),
                perf(Modality::Animation, 2000, &[]),
                &instructions,
            )
            .unwrap();
        assert_eq!(synced.anchor_source, AnchorSource::Instructions);
        // the 5000ms anchor lies beyond the reference duration and is dropped
        assert_eq!(synced.sync_points.len(), 2);

        let first = &synced.sync_points[0];
        assert_eq!(first.audio.offset_ms, 10);
        assert!((first.alignment_accuracy - 0.8).abs() < 1e-9);

        let second = &synced.sync_points[1];
        assert_eq!(second.audio.event_id.as_deref(), Some("audio:1"));
        assert!((second.alignment_accuracy - 0.5).abs() < 1e-9);
        assert!(second.animation.event_id.is_none());

        assert!((synced.timing_alignment - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_clamped_at_zero() {
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 2000, &[900]),
                perf(Modality::Audio, 2000, &[]),
                perf(Modality::Animation, 2000, &[]),
                &with_dialogue(&[0, 1800]),
            )
            .unwrap();
        assert_eq!(synced.sync_points[0].alignment_accuracy, 0.0);
    }

    #[test]
    fn test_warp_round_trip_within_tolerance() {
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 1733, &[0, 411, 977, 1500]),
                perf(Modality::Audio, 1900, &[120, 870, 1650]),
                perf(Modality::Animation, 1801, &[333, 1400]),
                &with_dialogue(&[100, 500, 1000, 1600]),
            )
            .unwrap();
        let tolerance = SyncConfig::default().anchor_tolerance_ms;
        for point in &synced.sync_points {
            for modality in Modality::ALL {
                let r = point.event(modality);
                let back = synced.warp(modality).to_native(r.warped_ms);
                assert!(back.abs_diff(r.native_ms) <= tolerance);
            }
        }
    }

    #[test]
    fn test_warps_only_slow_shorter_outputs() {
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 1733, &[]),
                perf(Modality::Audio, 1900, &[]),
                perf(Modality::Animation, 1801, &[]),
                &PerformanceInstructionSet::default(),
            )
            .unwrap();
        for warp in &synced.warps {
            assert!(warp.playback_rate <= 1.0);
            assert!(warp.scale_factor >= 1.0);
        }
        assert_eq!(synced.warp(Modality::Audio).playback_rate, 1.0);
    }

    #[test]
    fn test_sync_points_strictly_increasing() {
        let synced = engine()
            .synchronize(
                perf(Modality::Visual, 3000, &[]),
                perf(Modality::Audio, 2900, &[]),
                perf(Modality::Animation, 2800, &[]),
                &with_dialogue(&[2000, 300, 300, 1200]),
            )
            .unwrap();
        assert!(!synced.sync_points.is_empty());
        assert!(synced
            .sync_points
            .windows(2)
            .all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }
}
