//! Tracing setup for the `perfsynth` binary.
//!
//! Every log line goes to stderr. stdout is reserved for command results
//! (the run summary, gate scorecards and `check-config` output), so a caller
//! can pipe a JSON scorecard without it being interleaved with log records.
//!
//! Run-level context (`run_id`, `character_id`) is attached by the
//! `perfsynth.run` span from [`crate::obs`]; with `--json` it shows up under
//! each record's `span` and `spans` keys.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Only the first call in a process has any
/// effect.
///
/// `RUST_LOG` wins over `level` when set, e.g.
/// `RUST_LOG=perfsynth_core=debug` to see per-attempt generator events.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
