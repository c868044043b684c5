//! goldmerge command-line tool.
//!
//! Applies the expected-vs-actual diffs recorded by golden-file tests back
//! into the test-data files, merges three versions of a file, drives the
//! run/apply loop until tests pass, and undoes applies.

mod apply;
mod run;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use goldmerge_core::config::{AppConfig, DEFAULT_CONFIG_TOML};
use goldmerge_core::directive::DirectiveEdit;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Reconcile golden-file test diffs into test data.
#[derive(Parser, Debug)]
#[command(
    name = "goldmerge",
    version,
    about = "Apply and merge golden-file test diffs"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./goldmerge.toml")]
    config: String,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply the diffs recorded in a test report.
    Apply {
        /// Report to read (defaults to `runner.report` from the config).
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Show what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Three-way merge of LEFT and RIGHT against their common BASE.
    Merge {
        left: PathBuf,
        base: PathBuf,
        right: PathBuf,

        /// Write conflict markers instead of trying a token-level merge.
        #[arg(long)]
        no_resolver: bool,

        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the tests, apply their diffs, and repeat until they pass.
    Run {
        /// Override `runner.max_iterations`.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Continue after conflicts without asking.
        #[arg(short, long)]
        yes: bool,
    },

    /// Add or remove a directive line in the files a report names.
    Directive {
        #[command(subcommand)]
        action: DirectiveCommand,
    },

    /// Revert the most recent apply.
    Undo {
        /// Overwrite files edited since the apply.
        #[arg(long)]
        force: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./goldmerge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Subcommand, Debug)]
enum DirectiveCommand {
    /// Insert LINE at the top of files whose expected text lacks the marker.
    Add(DirectiveArgs),
    /// Delete LINE from files whose expected text contains the marker.
    Remove(DirectiveArgs),
}

#[derive(Args, Debug)]
struct DirectiveArgs {
    /// The directive line, e.g. "// FIR_IDENTICAL".
    line: String,

    /// Select files by this text instead of LINE.
    #[arg(long)]
    marker: Option<String>,

    /// Report to read (defaults to `runner.report` from the config).
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Show what would change without writing anything.
    #[arg(long)]
    dry_run: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);

    // Config is loaded before logging starts so its level can apply; a
    // broken file is reported by the command that needs it.
    let config = AppConfig::load_or_default(&config_path);
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
    debug!(config = %config_path.display(), log_level = %log_level, "starting goldmerge");

    match run(cli, &config_path, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cli: Cli,
    config_path: &Path,
    config: Result<AppConfig, goldmerge_core::errors::ConfigError>,
) -> Result<ExitCode> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(config_path),
        command => {
            let config = config.context("failed to load configuration file")?;
            config.validate().context("configuration validation failed")?;

            match command {
                Commands::Apply { report, dry_run } => apply::run_apply(&config, report, dry_run),
                Commands::Merge {
                    left,
                    base,
                    right,
                    no_resolver,
                    output,
                } => apply::run_merge(&config, &left, &base, &right, no_resolver, output),
                Commands::Run {
                    max_iterations,
                    yes,
                } => run::run_loop(&config, max_iterations, yes).await,
                Commands::Directive { action } => {
                    let (edit, args) = match action {
                        DirectiveCommand::Add(args) => (DirectiveEdit::add(args.line.clone()), args),
                        DirectiveCommand::Remove(args) => (DirectiveEdit::remove(args.line.clone()), args),
                    };
                    let edit = match args.marker {
                        Some(marker) => edit.with_marker(marker),
                        None => edit,
                    };
                    apply::run_directive(&config, edit, args.report, args.dry_run)
                }
                Commands::Undo { force } => apply::run_undo(&config, force),
                Commands::Init { .. } | Commands::Validate => unreachable!(),
            }
        }
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<ExitCode> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG_TOML).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set runner.command to the command that runs your tests");
    println!("  2. Make the tests write their report to runner.report");
    println!("  3. Validate with: goldmerge validate --config {}", output.display());
    println!("  4. Start the loop: goldmerge run --config {}", output.display());

    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(config_path: &Path) -> Result<ExitCode> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }
    match config.validate_for_loop() {
        Ok(()) => println!("  [OK] Test command is set"),
        Err(e) => println!("  [WARN] {}", e),
    }

    println!();
    println!("Configuration summary:");
    println!("  Workspace      : {}", config.general.workspace.display());
    println!("  State dir      : {}", config.state_dir().display());
    println!("  Test command   : {}", config.runner.command);
    println!("  Report         : {}", config.report_path().display());
    println!("  Max iterations : {}", config.runner.max_iterations);
    println!("  Resolver       : {}", config.merge.resolver);
    println!(
        "  Test-data roots: {}",
        if config.paths.test_data_roots.is_empty() {
            "(anywhere)".to_string()
        } else {
            config.paths.test_data_roots.join(", ")
        }
    );
    println!();
    println!("Configuration is valid.");

    Ok(ExitCode::SUCCESS)
}
