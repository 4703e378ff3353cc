//! CLI Argument Structures
//!
//! All subcommands and their arguments for the SpecLens binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use speclens::ModelFamily;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Contract mining, SAFE/RISKY labeling and model governance for PML-annotated Python
#[derive(Parser)]
#[command(name = "speclens")]
#[command(version = VERSION)]
#[command(about = "SpecLens - contract-driven risk labeling for Python")]
#[command(long_about = "
Mine PML contracts from Python sources, label every unit SAFE or RISKY by
fuzzing it against its contracts, train classifiers on the result and promote
the one that misses the fewest RISKY units.

Common Usage:

  # Show the contracts recovered from a file
  speclens parse examples/calc.py

  # Label every unit of a directory and write the dataset
  speclens build-dataset ./corpus dataset.csv

  # Train both candidate families
  speclens train dataset.csv --model logistic
  speclens train dataset.csv --model tree

  # Promote the best candidate on a held-out set, then score a file
  speclens promote held_out.csv
  speclens predict service.py
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults are used when omitted)
    #[arg(short, long, global = true, env = "SPECLENS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the units and contracts recovered from one file
    Parse(ParseArgs),

    /// Label every unit of one file with the verification oracle
    Label(LabelArgs),

    /// Label a directory of sources and write the dataset table
    #[command(name = "build-dataset")]
    BuildDataset(BuildDatasetArgs),

    /// Train one candidate model on a dataset table
    Train(TrainArgs),

    /// Score the registered candidates on held-out data and promote the best
    Promote(PromoteArgs),

    /// Score one file with the active model
    Predict(PredictArgs),

    /// Print default configuration in YAML format
    #[command(name = "print-default-config")]
    PrintDefaultConfig,

    /// Initialize a configuration file with defaults
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),

    /// Validate a SpecLens configuration file
    #[command(name = "validate-config")]
    ValidateConfig(ValidateConfigArgs),
}

/// Output format for commands that print structured results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Terminal tables
    #[default]
    Table,
    /// JSON on stdout
    Json,
}

/// Model family selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelChoice {
    /// Standardised logistic regression
    Logistic,
    /// CART decision tree
    Tree,
}

impl From<ModelChoice> for ModelFamily {
    fn from(choice: ModelChoice) -> Self {
        match choice {
            ModelChoice::Logistic => ModelFamily::Logistic,
            ModelChoice::Tree => ModelFamily::Tree,
        }
    }
}

#[derive(Args)]
pub struct ParseArgs {
    /// Python source file
    pub file: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct LabelArgs {
    /// Python source file
    pub file: PathBuf,

    /// Override the configured oracle seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the configured number of trials
    #[arg(long)]
    pub trials: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct BuildDatasetArgs {
    /// Directory of Python sources
    pub dir: PathBuf,

    /// Destination table
    pub out: PathBuf,

    /// Override the configured oracle seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Label files one at a time
    #[arg(long)]
    pub serial: bool,
}

#[derive(Args)]
pub struct TrainArgs {
    /// Dataset table produced by build-dataset
    pub dataset: PathBuf,

    /// Model family
    #[arg(long, value_enum)]
    pub model: ModelChoice,

    /// Artifact destination (defaults to the registered candidate path)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct PromoteArgs {
    /// Held-out dataset table
    pub held_out: PathBuf,

    /// Override the configured minimum RISKY recall
    #[arg(long)]
    pub min_recall: Option<f64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Python source file
    pub file: PathBuf,

    /// Score with this artifact instead of the active pointer
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Output configuration file name
    #[arg(short, long, default_value = ".speclens.yml")]
    pub output: PathBuf,

    /// Overwrite existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateConfigArgs {
    /// Configuration file to validate
    pub file: PathBuf,
}
