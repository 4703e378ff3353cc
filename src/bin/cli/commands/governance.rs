//! Promotion and serving commands.

use std::path::Path;

use speclens::governance::{CandidateModel, PointerStore, PromotionGovernor};
use speclens::models::{ArtifactStore, FsArtifactStore};
use speclens::{Dataset, Predictor};

use crate::cli::args::{OutputFormat, PredictArgs, PromoteArgs};
use crate::cli::config_builder::load_configuration;
use crate::cli::output::{display_promotion, display_serving_report, print_json};

/// `speclens promote <held_out>`: a rejection is a reported outcome, not an error.
pub fn promote_command(args: PromoteArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_configuration(config_path)?;
    if let Some(min_recall) = args.min_recall {
        config.governance.min_recall = min_recall;
    }
    config.governance.validate()?;

    let held_out = Dataset::read_csv(&args.held_out)?;
    let candidates: Vec<CandidateModel> = config
        .governance
        .candidates
        .iter()
        .map(CandidateModel::from)
        .collect();

    let report = PromotionGovernor::from_config(&config.governance).run(&candidates, &held_out)?;
    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            display_promotion(&report);
            Ok(())
        }
    }
}

/// `speclens predict <file>`: resolves the active model now and fails fast.
pub fn predict_command(args: PredictArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_configuration(config_path)?;

    let predictor = match &args.artifact {
        Some(path) => {
            let artifact = FsArtifactStore
                .load(path)?
                .ok_or_else(|| anyhow::anyhow!("No model artifact at {}", path.display()))?;
            Predictor::new(artifact, config.risk_thresholds)
        }
        None => Predictor::from_pointer(
            &PointerStore::from_config(&config.governance),
            &FsArtifactStore,
            config.risk_thresholds,
        )?,
    };

    let report = predictor.analyze_file(&args.file)?;
    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            display_serving_report(&report);
            Ok(())
        }
    }
}
