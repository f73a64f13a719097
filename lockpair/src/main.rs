#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lockpair_core::{AnalysisContext, Pipeline, PipelineOptions, PipelineReport};
use lockpair_ir::{emit_program, validate_program};

mod bundle;
mod config;

const LOG_ENV: &str = "LOCKPAIR_LOG";

#[derive(Parser, Debug)]
#[command(name = "lockpair", version, about = "Pairwise lockset instrumentation for driver entry points")]
struct Cli {
    /// Pipeline configuration. Defaults to the nearest `lockpair.toml` above the bundle.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Emit {
    /// Textual verifier input
    Bpl,
    /// The transformed program as JSON
    Json,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the whole pipeline over a bundle and write the paired program
    Instrument {
        /// Input bundle (JSON with `program` and `facts`)
        bundle: PathBuf,

        #[arg(long, value_enum, default_value_t = Emit::Bpl)]
        emit: Emit,

        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Skip the lock-release checks
        #[arg(long, default_value_t = false)]
        only_race_checking: bool,

        /// Attach candidate lockset summaries to split helpers
        #[arg(long, default_value_t = false)]
        summaries: bool,

        /// Log the wall time of each pass
        #[arg(long, default_value_t = false)]
        measure_pass_time: bool,
    },
    /// Check a bundle's program for structural errors without transforming it
    Validate {
        bundle: PathBuf,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_options(explicit: Option<&Path>, bundle: &Path) -> miette::Result<PipelineOptions> {
    let resolved = config::load_config(explicit, bundle)?;
    if let Some(path) = &resolved.config_path {
        info!(config = %path.display(), "loaded pipeline configuration");
    }
    Ok(resolved.options)
}

fn instrument(
    bundle_path: &Path,
    options: PipelineOptions,
    emit: Emit,
    output: Option<&Path>,
) -> miette::Result<PipelineReport> {
    let bundle = bundle::read_bundle(bundle_path)?;
    let mut ac = AnalysisContext::new(bundle.program, bundle.facts, options);
    let report = Pipeline::new(&mut ac).run()?;

    let text = match emit {
        Emit::Bpl => emit_program(&ac.program),
        Emit::Json => serde_json::to_string_pretty(&ac.program).into_diagnostic()?,
    };
    match output {
        Some(path) => fs::write(path, text).into_diagnostic()?,
        None => print!("{text}"),
    }
    Ok(report)
}

fn main() -> miette::Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Instrument {
            bundle,
            emit,
            output,
            only_race_checking,
            summaries,
            measure_pass_time,
        } => {
            let mut options = resolve_options(cli.config.as_deref(), &bundle)?;
            options.only_race_checking |= only_race_checking;
            options.summaries |= summaries;
            options.measure_pass_time |= measure_pass_time;

            let report = instrument(&bundle, options, emit, output.as_deref())?;
            eprintln!(
                "lockpair: {} unit(s) from {} entry point(s), {} access call(s), {} marker(s), {} guess(es)",
                report.units.len(),
                report.entry_points.len(),
                report.access_calls,
                report.markers,
                report.guesses
            );
            Ok(())
        }
        Cmd::Validate { bundle } => {
            let bundle = bundle::read_bundle(&bundle)?;
            validate_program(&bundle.program)?;
            eprintln!("lockpair: program is well formed");
            Ok(())
        }
    }
}
