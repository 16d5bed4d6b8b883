mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cdstage_lib::profile::Profile;

use crate::cmd::{BuildTarget, InstallerKind};
use crate::output::{OutputFormat, Status};

/// cdstage - build and run the compliance document simplifier images
#[derive(Parser)]
#[command(name = "cdstage")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the image for a profile, or both
  Build {
    /// development, production or all
    #[arg(value_enum)]
    target: BuildTarget,

    /// Build context containing requirements.txt and app/
    #[arg(short = 'C', long, default_value = ".")]
    context: PathBuf,

    /// How dependencies are installed into the base layer
    #[arg(long, value_enum, default_value = "command")]
    installer: InstallerKind,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show what a profile resolves to without building
  Plan {
    /// development or production
    profile: Profile,

    /// Build context containing requirements.txt and app/
    #[arg(short = 'C', long, default_value = ".")]
    context: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Print the equivalent multi-stage Dockerfile
  Dockerfile {
    /// Build context (read for cdstage.toml)
    #[arg(short = 'C', long, default_value = ".")]
    context: PathBuf,

    /// Write to a file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
  },

  /// Show the latest built image of a profile
  Inspect {
    /// development or production
    profile: Profile,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Start the latest built image of a profile
  Run {
    /// development or production
    profile: Profile,

    /// Directory holding app/ (development only)
    #[arg(long)]
    mount: Option<PathBuf>,

    /// Print the launch plan without starting the server
    #[arg(long)]
    dry_run: bool,
  },

  /// List built images
  List {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove layers and images no indexed image references
  Gc {
    /// Report what would be removed without deleting
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match dispatch(cli.command) {
    Ok(code) => code,
    Err(err) => {
      Status::Error.print(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

fn dispatch(command: Commands) -> Result<ExitCode> {
  match command {
    Commands::Build {
      target,
      context,
      installer,
      output,
    } => cmd::cmd_build(target, &context, installer, output)?,
    Commands::Plan {
      profile,
      context,
      output,
    } => cmd::cmd_plan(profile, &context, output)?,
    Commands::Dockerfile { context, output } => cmd::cmd_dockerfile(&context, output.as_deref())?,
    Commands::Inspect { profile, output } => cmd::cmd_inspect(profile, output)?,
    Commands::Run {
      profile,
      mount,
      dry_run,
    } => return cmd::cmd_run(profile, mount.as_deref(), dry_run),
    Commands::List { output } => cmd::cmd_list(output)?,
    Commands::Gc { dry_run, output } => cmd::cmd_gc(dry_run, output)?,
  }
  Ok(ExitCode::SUCCESS)
}

/// `RUST_LOG` wins; otherwise warnings, or debug output with `-v`.
fn init_tracing(verbose: bool) {
  let default = if verbose { "cdstage_lib=debug,cdstage=debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
