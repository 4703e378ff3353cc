//! SpecLens CLI - contract mining, SAFE/RISKY labeling and model governance
//!
//! Thin front end over the `speclens` library: every subcommand loads the
//! configuration, calls one library entry point and renders the result.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    // Execute command
    match cli.command {
        Commands::Parse(args) => cli::parse_command(args)?,
        Commands::Label(args) => cli::label_command(args, config_path)?,
        Commands::BuildDataset(args) => cli::build_dataset_command(args, config_path)?,
        Commands::Train(args) => cli::train_command(args, config_path)?,
        Commands::Promote(args) => cli::promote_command(args, config_path)?,
        Commands::Predict(args) => cli::predict_command(args, config_path)?,
        Commands::PrintDefaultConfig => cli::print_default_config()?,
        Commands::InitConfig(args) => cli::init_config(args)?,
        Commands::ValidateConfig(args) => cli::validate_config(args)?,
    }

    Ok(())
}
