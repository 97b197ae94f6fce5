use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use shadow_deps::ReconcileReport;
use shadow_protocol::SyncOutcome;
use std::path::PathBuf;

mod commands;
mod config;
mod generator;
mod watch;
mod workspace;

pub use commands::ConvertReport;
pub use config::{SyncConfig, CONFIG_FILE_NAME, DEBOUNCE_ENV, GENERATOR_ENV};
pub use generator::CommandGenerator;
pub use watch::discover_shadows;
pub use workspace::Workspace;

#[derive(Parser)]
#[command(name = "shadow-sync")]
#[command(about = "Keep source files in sync with pseudocode shadow files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to <root>/shadow-sync.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the shadow file for a source file, seeded with its current code
    Open(TargetArgs),

    /// Overwrite a shadow file with its source file's current code
    CopyCode(TargetArgs),

    /// Convert a shadow file once
    Convert(ConvertArgs),

    /// Show the diff the next conversion would send
    Diff(PathArgs),

    /// Drop checkpoints whose shadow file no longer exists
    Cleanup(CleanupArgs),

    /// Convert shadow files as they change until Ctrl-C
    Watch(WatchArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// Source file inside the project root
    target: PathBuf,
}

#[derive(Args)]
struct PathArgs {
    /// Shadow file or its source file
    path: PathBuf,
}

#[derive(Args)]
struct ConvertArgs {
    /// Shadow file or its source file
    path: PathBuf,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CleanupArgs {
    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct WatchArgs {
    /// Shadow files (or their source files) to watch; all of them when omitted
    paths: Vec<PathBuf>,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = SyncConfig::load(&cli.root, cli.config.as_deref())?;
    let ws = Workspace::open(&cli.root, config).await?;

    match cli.command {
        Commands::Open(args) => {
            let shadow = commands::open(&ws, &args.target).await?;
            println!("{}", shadow.display());
        }
        Commands::CopyCode(args) => {
            let shadow = commands::copy_code(&ws, &args.target).await?;
            println!("{}", shadow.display());
        }
        Commands::Convert(args) => {
            let report = commands::convert(&ws, &args.path).await?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                print_convert_report(&report);
            }
        }
        Commands::Diff(args) => {
            println!("{}", commands::diff(&ws, &args.path).await?);
        }
        Commands::Cleanup(args) => {
            let removed = commands::cleanup(&ws).await?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string(&removed).context("Failed to encode result")?
                );
            } else {
                println!("Removed {} ghost checkpoint(s)", removed.len());
            }
        }
        Commands::Watch(args) => watch::run(&ws, &args.paths).await?,
    }

    Ok(())
}

fn print_convert_report(report: &ConvertReport) {
    match &report.outcome {
        SyncOutcome::Converted { output_chars: 0 } => {
            println!("No changes for {}", report.target.display());
        }
        SyncOutcome::Converted { output_chars } => {
            println!("Wrote {} ({output_chars} chars)", report.target.display());
        }
        SyncOutcome::Unchanged => {
            println!("{} is unchanged since the last conversion", report.shadow.display());
        }
        SyncOutcome::Failed { message, .. } => println!("Failed: {message}"),
        SyncOutcome::Discarded => println!("Result discarded"),
    }

    let Some(dependencies) = &report.dependencies else {
        return;
    };
    match dependencies {
        ReconcileReport::Installed { names } => println!("Installed: {}", names.join(", ")),
        ReconcileReport::InstallFailed { names, detail } => {
            println!("Could not install {}: {detail}", names.join(", "));
        }
        ReconcileReport::Suggested { suggestions } => {
            println!("Missing dependencies:");
            for suggestion in suggestions {
                println!("  {suggestion}");
            }
        }
        ReconcileReport::ManifestUnreadable { detail } => {
            println!("Manifest could not be parsed: {detail}");
        }
        ReconcileReport::NothingMissing | ReconcileReport::Skipped => {}
    }
}
