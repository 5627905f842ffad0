//! Kiroku timeline replay tool.
//!
//! Feeds a recorded diff script through a timeline provider and prints every
//! snapshot it publishes, so engine desyncs can be reproduced offline.
//!
//! Usage:
//!   cargo run -p kiroku-replay -- demos/sample.ron
//!   cargo run -p kiroku-replay -- demos/sample.ron --config timeline.ron
//!   RUST_LOG=kiroku_timeline=trace cargo run -p kiroku-replay -- demos/sample.ron

mod script;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use kiroku_timeline::{Diagnostic, TimelineConfig};
use tracing_subscriber::{EnvFilter, fmt};

use crate::script::{ReplayScript, replay};

/// Replay a timeline diff script.
#[derive(Parser, Debug)]
#[command(name = "kiroku-replay")]
#[command(about = "Replay recorded timeline diffs and print the resulting snapshots")]
struct Args {
    /// RON replay script
    script: PathBuf,

    /// RON timeline config (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only print the final snapshot and the summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the snapshots
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TimelineConfig::load(path)?,
        None => TimelineConfig::default(),
    };
    let script = ReplayScript::load(&args.script)?;
    tracing::info!(
        script = %args.script.display(),
        conversation = %script.conversation_id,
        steps = script.steps.len(),
        "Replaying"
    );

    let report = replay(script, config).await?;

    let frames = if args.quiet {
        report.frames.last().into_iter().collect::<Vec<_>>()
    } else {
        report.frames.iter().collect()
    };
    for frame in frames {
        println!("{}", frame.render());
    }

    println!(
        "-- {} snapshot(s), {} abandoned batch(es), {} unsupported diff(s)",
        report.frames.len(),
        report.abandoned_batches(),
        report.unsupported_operations()
    );
    for diagnostic in &report.diagnostics {
        match diagnostic {
            Diagnostic::BatchAbandoned { version, diff_index, skipped, error, .. } => {
                println!("   abandoned at v{version}, diff {diff_index} ({skipped} skipped): {error}");
            }
            Diagnostic::UnsupportedOperation { kind, diff_index, .. } => {
                println!("   unsupported {kind} at diff {diff_index}");
            }
        }
    }

    Ok(())
}
