//! rootsync command line

use anyhow::Context;
use clap::{Parser, Subcommand};
use rootsync::{RoleDescriptor, RoleKind, RootsyncConfig, Session};
use rootsync_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "rootsync", about = "Keep directory roles in sync with a listing file")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Workspace directory (defaults to the current directory)
    #[arg(short = 'w', long, global = true, env = "ROOTSYNC_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Role for listing entries, overriding the configured one
    #[arg(long, global = true, value_parser = parse_role)]
    role: Option<RoleKind>,

    #[command(subcommand)]
    command: Commands,
}

fn parse_role(s: &str) -> Result<RoleKind, String> {
    RoleKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = RoleKind::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown role '{}' (expected one of: {})", s, known.join(", "))
    })
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile once against the listing
    Sync,

    /// Reconcile, then follow directory changes until Ctrl+C
    Watch,

    /// Show what a reconciliation would change, without changing anything
    Plan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the managed set and current role tags
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "rootsync",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "rootsync failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };
    let mut config = RootsyncConfig::load_for_workspace(&workspace)
        .with_context(|| format!("Failed to load configuration for {}", workspace.display()))?;
    if let Some(role) = cli.role {
        config.default_role = role;
    }
    let session = Session::with_config(&workspace, config)
        .with_context(|| format!("Failed to open workspace {}", workspace.display()))?;

    match cli.command {
        Commands::Sync => {
            let report = session.startup()?;
            print_list("Tagged", &report.added);
            print_list("Untagged", &report.removed);
            print_list("Skipped (missing)", &report.skipped_missing);
            print_list("Skipped (no content root)", &report.skipped_unowned);
            if report.is_noop() {
                println!("Nothing to change.");
            }
        }
        Commands::Watch => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start runtime")?;
            runtime.block_on(session.watch())?;
        }
        Commands::Plan { json } => {
            let plan = session.plan()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_list("Add", &plan.to_add.iter().cloned().collect::<Vec<_>>());
                print_list("Remove", &plan.to_remove.iter().cloned().collect::<Vec<_>>());
            }
        }
        Commands::Status { json } => {
            let status = session.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Workspace: {}", status.workspace.display());
                println!("Listing:   {}", status.listing);
                print_list("Managed", &status.managed.iter().cloned().collect::<Vec<_>>());
                println!("Tags ({}):", status.tags.len());
                for tag in &status.tags {
                    println!("  [{}] {} {}", tag.content_root, tag.role, tag.path.display());
                }
            }
        }
    }
    Ok(())
}

fn print_list(title: &str, descriptors: &[RoleDescriptor]) {
    if descriptors.is_empty() {
        return;
    }
    println!("{} ({}):", title, descriptors.len());
    for descriptor in descriptors {
        println!("  {}", descriptor);
    }
}
