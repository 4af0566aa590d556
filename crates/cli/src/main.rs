mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lpkbuild_lib::consts::CONFIG_FILENAME;

use crate::output::{OutputFormat, print_error};

#[derive(Parser)]
#[command(name = "lpk")]
#[command(about = "Build and publish LPK application packages")]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(flatten)]
  overrides: cmd::Overrides,

  #[command(flatten)]
  registry: cmd::RegistryArgs,
}

#[derive(Args)]
struct Target {
  /// Path to the build description
  #[arg(default_value = CONFIG_FILENAME)]
  config: PathBuf,
}

#[derive(Args)]
struct StatefulTarget {
  #[command(flatten)]
  target: Target,

  /// State file (defaults to lpkbuild.state.json beside the build description)
  #[arg(long)]
  state: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
  /// Build (and publish) once without recording state
  Build(Target),
  /// Build and publish, reusing the recorded upload when unchanged
  Apply(StatefulTarget),
  /// Delete the recorded upload and local artifact
  Destroy(StatefulTarget),
  /// Show the recorded state
  Status(StatefulTarget),
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  let runtime = match tokio::runtime::Runtime::new() {
    Ok(runtime) => runtime,
    Err(e) => {
      print_error(&format!("Failed to create async runtime: {e}"));
      return ExitCode::FAILURE;
    }
  };

  // Dropping the command future on Ctrl-C kills any running child process and
  // removes an ephemeral clone.
  let result = runtime.block_on(async {
    tokio::select! {
      result = run(cli) => result,
      _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    }
  });

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let ctx = cmd::Context {
    output: cli.output,
    overrides: cli.overrides,
    registry: cli.registry,
  };

  match cli.command {
    Commands::Build(target) => cmd::cmd_build(&ctx, &target.config).await,
    Commands::Apply(args) => cmd::cmd_apply(&ctx, &args.target.config, args.state).await,
    Commands::Destroy(args) => cmd::cmd_destroy(&ctx, &args.target.config, args.state).await,
    Commands::Status(args) => cmd::cmd_status(&ctx, &args.target.config, args.state),
  }
}
