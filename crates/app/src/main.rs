use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use breathwork_core::{
    Catalog, CuePlayer, DisplaySink, SessionRunner, Snapshot, SnapshotMode, Technique,
    ThreadScheduler,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> breathwork_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { catalog, mode } => run_list(&load_catalog(catalog.as_deref()), mode.as_deref()),
        Commands::Modes { catalog } => run_modes(&load_catalog(catalog.as_deref())),
        Commands::Run {
            catalog,
            technique,
            duration,
            mute,
            ambient,
        } => run_session(
            load_catalog(catalog.as_deref()),
            &technique,
            duration,
            mute,
            ambient,
        ),
    }
}

fn load_catalog(path: Option<&std::path::Path>) -> Catalog {
    // Missing or broken files fall back to the built-in catalog, so this
    // never fails.
    Catalog::load(path.unwrap_or_else(|| std::path::Path::new("techniques.json")))
}

fn run_list(catalog: &Catalog, mode: Option<&str>) -> breathwork_core::Result<()> {
    let techniques: Vec<&Technique> = match mode {
        Some(key) => catalog.techniques_for_mode(key)?,
        None => catalog.techniques.iter().collect(),
    };

    for technique in techniques {
        println!("{} — {}", technique.id, technique.name);
        println!("    {}", technique.description);
        let phases: Vec<String> = technique
            .phases
            .iter()
            .map(|phase| format!("{} {}s", phase.name, phase.duration))
            .collect();
        println!("    {} ({}s cycle)", phases.join(" · "), technique.cycle_seconds());
    }
    Ok(())
}

fn run_modes(catalog: &Catalog) -> breathwork_core::Result<()> {
    let mut keys: Vec<&String> = catalog.modes.keys().collect();
    keys.sort();

    for key in keys {
        let mode = catalog.mode(key)?;
        println!("{} {} ({key}): {}", mode.icon, mode.name, mode.techniques.join(", "));
    }
    Ok(())
}

fn run_session(
    catalog: Catalog,
    technique_id: &str,
    duration: Option<u32>,
    mute: bool,
    ambient: bool,
) -> breathwork_core::Result<()> {
    let duration = duration
        .or_else(|| catalog.durations.first().copied())
        .unwrap_or(60);

    let runner = SessionRunner::new(
        Arc::new(catalog),
        ThreadScheduler::new(),
        Arc::new(CuePlayer::new()),
    )
    .with_display(TerminalDisplay::default())
    .with_ambient(ambient);

    if mute {
        runner.set_muted(true);
    }

    runner.start(technique_id, duration)?;
    tracing::info!(technique_id, duration, "running session");

    while !runner.is_complete() {
        std::thread::sleep(Duration::from_millis(200));
    }
    runner.finish();

    println!();
    println!("Session complete. Well done.");
    Ok(())
}

/// Renders each tick's snapshot as a single status line.
#[derive(Debug, Default)]
struct TerminalDisplay;

impl DisplaySink for TerminalDisplay {
    fn notify_phase_change(&mut self, snapshot: &Snapshot) {
        let circle = scale_bar(snapshot.animation_scale);
        let minutes = snapshot.total_seconds_remaining / 60;
        let seconds = snapshot.total_seconds_remaining % 60;
        let line = match snapshot.mode {
            SnapshotMode::Preparing => format!(
                "Get ready... {}",
                snapshot.phase_seconds_remaining
            ),
            SnapshotMode::Paused => format!(
                "[paused] {} {}s  {minutes}:{seconds:02}",
                snapshot.phase_label, snapshot.phase_seconds_remaining
            ),
            _ => format!(
                "{circle} {} {}s  {minutes}:{seconds:02}",
                snapshot.phase_label, snapshot.phase_seconds_remaining
            ),
        };
        print!("\r\x1b[2K{line}");
        let _ = std::io::stdout().flush();
    }
}

/// Coarse text rendering of the breathing-circle scale in `[0.8, 1.2]`.
fn scale_bar(scale: f32) -> String {
    let width = (((scale - 0.8) / 0.4) * 8.0).round().clamp(0.0, 8.0) as usize;
    format!("({:<8})", "o".repeat(width.max(1)))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Guided breathing exercises in the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available breathing techniques.
    List {
        /// Optional technique catalog file (JSON).
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Only show techniques grouped under this mode.
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Show the mode groupings of the catalog.
    Modes {
        /// Optional technique catalog file (JSON).
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
    /// Run a breathing session.
    Run {
        /// Optional technique catalog file (JSON).
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Technique id to practice (see `list`).
        #[arg(short, long)]
        technique: String,
        /// Total session length in seconds; defaults to the catalog's
        /// first duration preset.
        #[arg(short, long)]
        duration: Option<u32>,
        /// Start with sound muted.
        #[arg(long)]
        mute: bool,
        /// Layer the ambient background drone under the cues.
        #[arg(long)]
        ambient: bool,
    },
}
