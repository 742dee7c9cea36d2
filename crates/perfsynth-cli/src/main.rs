//! perfsynth - performance synthesis CLI
//!
//! ## Commands
//!
//! - `check-config`: load and validate a pipeline configuration
//! - `synthesize`: run the full pipeline against recorded backend outputs
//! - `digest`: print the request digest of a character/instructions pair

mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{info, warn, Level};

use perfsynth_core::{
    request_digest, CancellationScope, CharacterModel, FinalPerformance, Modality,
    PerformanceInstructionSet, SynthesisConfig, SynthesisError, SynthesisOrchestrator,
    SYNTH_METRICS,
};

use crate::replay::RenderManifest;

#[derive(Parser)]
#[command(name = "perfsynth")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-modal performance synthesis pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a configuration file, validate it and print the effective values
    CheckConfig {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Synthesize a performance from recorded backend outputs
    Synthesize {
        /// Character model (JSON)
        #[arg(long)]
        character: PathBuf,

        /// Performance instruction set (JSON)
        #[arg(long)]
        instructions: PathBuf,

        /// Render manifest with one recorded backend output per modality (JSON)
        #[arg(long)]
        renders: PathBuf,

        /// Pipeline configuration (TOML); defaults apply when omitted
        #[arg(short, long, env = "PERFSYNTH_CONFIG")]
        config: Option<PathBuf>,

        /// Overall deadline for the run in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Write the final performance as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the request digest of a character/instructions pair
    Digest {
        /// Character model (JSON)
        #[arg(long)]
        character: PathBuf,

        /// Performance instruction set (JSON)
        #[arg(long)]
        instructions: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    perfsynth_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::CheckConfig { config } => cmd_check_config(&config),
        Commands::Synthesize {
            character,
            instructions,
            renders,
            config,
            deadline_ms,
            output,
        } => {
            cmd_synthesize(
                &character,
                &instructions,
                &renders,
                config.as_deref(),
                deadline_ms,
                output.as_deref(),
            )
            .await
        }
        Commands::Digest {
            character,
            instructions,
        } => cmd_digest(&character, &instructions),
    };

    SYNTH_METRICS.flush();
    result
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} {:?}", what, path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {} {:?}", what, path))
}

fn load_config(path: Option<&Path>) -> Result<SynthesisConfig> {
    match path {
        Some(path) => SynthesisConfig::load_path(path)
            .with_context(|| format!("Invalid configuration {:?}", path)),
        None => Ok(SynthesisConfig::default()),
    }
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    println!("Configuration OK: {:?}", path);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_digest(character: &Path, instructions: &Path) -> Result<()> {
    let character: CharacterModel = read_json(character, "character model")?;
    let instructions: PerformanceInstructionSet = read_json(instructions, "instructions")?;
    let digest =
        request_digest(&character, &instructions).context("Failed to compute request digest")?;
    println!("{}", digest);
    Ok(())
}

async fn cmd_synthesize(
    character: &Path,
    instructions: &Path,
    renders: &Path,
    config: Option<&Path>,
    deadline_ms: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let character: CharacterModel = read_json(character, "character model")?;
    let instructions: PerformanceInstructionSet = read_json(instructions, "instructions")?;
    let config = load_config(config)?;
    let generators = RenderManifest::load(renders)?.into_generators()?;

    let orchestrator =
        SynthesisOrchestrator::new(generators, config).context("Failed to build pipeline")?;

    let cancel = CancellationScope::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling synthesis");
            on_interrupt.cancel();
        }
    });

    let deadline = deadline_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    let outcome = orchestrator
        .synthesize_with_cancel(
            Arc::new(character),
            Arc::new(instructions),
            deadline,
            &cancel,
        )
        .await;

    match outcome {
        Ok(performance) => {
            print_summary(&performance);
            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&performance)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write performance to {:?}", path))?;
                info!(path = ?path, "final performance written");
                println!("Written to {:?}", path);
            }
            Ok(())
        }
        Err(err) => {
            print_gate_scorecard(&err)?;
            Err(err).context("Synthesis failed")
        }
    }
}

fn print_summary(performance: &FinalPerformance) {
    let sync = &performance.synchronization;
    println!("Run:         {}", performance.run_id);
    println!(
        "Character:   {} (v{})",
        performance.character_id, performance.character_version
    );
    println!(
        "Timeline:    {}ms, {} sync points ({:?})",
        sync.reference_duration_ms,
        sync.sync_points.len(),
        sync.anchor_source
    );
    for modality in Modality::ALL {
        let warp = sync.warp(modality);
        println!(
            "  {:<10} {}ms x{:.3} ({})",
            modality.as_str(),
            warp.native_duration_ms,
            warp.scale_factor,
            sync.performance(modality).metadata.model
        );
    }
    println!("Quality:     {:.3}", performance.quality.aggregate);
    println!("Consistency: {:.3}", performance.consistency.aggregate);
    println!("Digest:      {}", performance.summary.request_digest);
    if !performance.summary.timing_violations.is_empty() {
        println!(
            "Warning: {} non-monotonic timing hint(s)",
            performance.summary.timing_violations.len()
        );
    }
}

/// Gate rejections carry the full scorecard; print it before failing.
fn print_gate_scorecard(err: &SynthesisError) -> Result<()> {
    match err {
        SynthesisError::QualityGateFailed { scorecard, .. } => {
            println!("{}", serde_json::to_string_pretty(scorecard)?);
        }
        SynthesisError::ConsistencyGateFailed { scorecard, .. } => {
            println!("{}", serde_json::to_string_pretty(scorecard)?);
        }
        _ => {}
    }
    Ok(())
}
