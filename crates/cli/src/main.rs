mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// samcat - build sample catalogs from analysis recipes
#[derive(Parser)]
#[command(name = "samcat")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a catalog from a recipe
  Build(BuildArgs),

  /// Print the resolved stage -> output directory map
  Stages {
    #[command(flatten)]
    sources: StageSources,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },

  /// Summarize an existing catalog
  Show {
    /// Path to the catalog JSON
    catalog: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },
}

/// Where stage output directories come from.
#[derive(Args, Debug, Default)]
pub struct StageSources {
  /// Workflow XML file (repeatable; falls back to SAMCAT_WORKFLOW_XML)
  #[arg(long = "xml", value_name = "FILE")]
  pub xml: Vec<PathBuf>,

  /// JSON stage map `{stage: dir}` (repeatable; wins over XML)
  #[arg(long = "stages", value_name = "FILE")]
  pub stage_maps: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
  /// Path to the recipe JSON
  #[arg(short, long)]
  pub recipe: PathBuf,

  /// Comma-separated runs to process (default: all)
  #[arg(long)]
  pub runs: Option<String>,

  /// Directory the catalog is written to
  #[arg(short, long)]
  pub outdir: Option<PathBuf>,

  #[command(flatten)]
  pub sources: StageSources,

  /// Project slug for the catalog file name (default: recipe's project)
  #[arg(long)]
  pub project: Option<String>,

  /// Maximum concurrent per-file reads
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Never run merges, whatever the recipe requests
  #[arg(long)]
  pub dry_run: bool,

  /// Overwrite a catalog whose sample tree differs
  #[arg(short, long)]
  pub force: bool,

  /// Merge tool (default: hadd, or SAMCAT_MERGE_TOOL)
  #[arg(long)]
  pub merge_tool: Option<String>,

  /// Column reader command (default: SAMCAT_READER)
  #[arg(long)]
  pub reader: Option<String>,

  /// Merge timeout, e.g. "30m"
  #[arg(long, value_parser = humantime::parse_duration)]
  pub merge_timeout: Option<Duration>,

  /// Per-file reader timeout, e.g. "90s"
  #[arg(long, value_parser = humantime::parse_duration)]
  pub reader_timeout: Option<Duration>,

  /// Exposure source: per-file-sum, external-script, trigger-db, summary-lookup
  #[arg(long)]
  pub exposure_source: Option<String>,

  /// Script or table the exposure source reads
  #[arg(long, value_name = "PATH")]
  pub exposure_input: Option<PathBuf>,

  /// Output format
  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub output: OutputFormat,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("samcat_lib={0},samcat_cli={0}", default_level)));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build(args) => cmd::cmd_build(args),
    Commands::Stages { sources, output } => cmd::cmd_stages(&sources, output),
    Commands::Show { catalog, output } => cmd::cmd_show(&catalog, output),
  }
}
