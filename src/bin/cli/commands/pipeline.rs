//! Parsing, labeling, dataset and training commands.

use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use tracing::info;

use speclens::models::{ArtifactStore, FsArtifactStore};
use speclens::{ContractParser, Dataset, DatasetBuilder, ModelFamily, SpecLensConfig, Trainer};

use crate::cli::args::{BuildDatasetArgs, LabelArgs, OutputFormat, ParseArgs, TrainArgs};
use crate::cli::config_builder::load_configuration;
use crate::cli::output::{
    display_build_summary, display_training, display_units, display_verdicts, print_json,
};

/// `speclens parse <file>`: fails on any syntax error.
pub fn parse_command(args: ParseArgs) -> anyhow::Result<()> {
    let mut parser = ContractParser::new()?;
    let source = parser.parse_file(&args.file)?;
    let units = parser.units(&source);

    match args.format {
        OutputFormat::Json => print_json(&units),
        OutputFormat::Table => {
            display_units(source.path(), &units);
            Ok(())
        }
    }
}

/// `speclens label <file>`: runs the oracle on every unit, dunders included.
pub fn label_command(args: LabelArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_configuration(config_path)?;
    if let Some(seed) = args.seed {
        config.oracle.seed = Some(seed);
    }
    if let Some(trials) = args.trials {
        config.oracle.trials = trials;
    }
    config.validate()?;

    let labeled = DatasetBuilder::from_config(&config).label_file(&args.file)?;
    match args.format {
        OutputFormat::Json => print_json(&labeled),
        OutputFormat::Table => {
            display_verdicts(&args.file.display().to_string(), &labeled);
            Ok(())
        }
    }
}

/// `speclens build-dataset <dir> <out>`: per-file failures are reported, not fatal.
pub fn build_dataset_command(
    args: BuildDatasetArgs,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = load_configuration(config_path)?;
    if let Some(seed) = args.seed {
        config.oracle.seed = Some(seed);
    }
    if args.serial {
        config.dataset.parallel = false;
    }

    let (dataset, summary) = DatasetBuilder::from_config(&config).build(&args.dir)?;
    dataset.write_csv(&args.out)?;
    display_build_summary(&summary, &args.out.display().to_string());
    Ok(())
}

/// `speclens train <dataset> --model <family>`
pub fn train_command(args: TrainArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_configuration(config_path)?;
    let family = ModelFamily::from(args.model);
    let out = args
        .out
        .unwrap_or_else(|| default_artifact_path(&config, family));

    let dataset = Dataset::read_csv(&args.dataset)?;
    info!(
        dataset = %args.dataset.display(),
        rows = dataset.len(),
        risky = dataset.risky_count(),
        "Loaded dataset"
    );

    let outcome = Trainer::from_config(&config).train(&dataset, family, family.as_str())?;
    FsArtifactStore.save(&out, &outcome.artifact)?;
    display_training(&outcome, &out.display().to_string());

    if !config.governance.candidates.iter().any(|c| c.path == out) {
        println!(
            "   {}",
            "note: this path is not a registered candidate; promote will not see it".yellow()
        );
    }
    Ok(())
}

/// Registered candidate path for `family`, or `models/<family>.json`.
fn default_artifact_path(config: &SpecLensConfig, family: ModelFamily) -> PathBuf {
    config
        .governance
        .candidates
        .iter()
        .find(|candidate| candidate.name == family.as_str())
        .map(|candidate| candidate.path.clone())
        .unwrap_or_else(|| PathBuf::from("models").join(format!("{family}.json")))
}
