//! Configuration management commands.

use owo_colors::OwoColorize;
use tabled::{settings::Style as TableStyle, Table, Tabled};

use speclens::SpecLensConfig;

use crate::cli::args::{InitConfigArgs, ValidateConfigArgs};
use crate::cli::config_builder::load_configuration;

/// Print default configuration in YAML format
pub fn print_default_config() -> anyhow::Result<()> {
    println!("{}", "# Default speclens configuration".dimmed());
    println!("{}", "# Save this to a file and customize as needed".dimmed());
    println!(
        "{}",
        "# Usage: speclens --config your-config.yml build-dataset <dir> <out.csv>".dimmed()
    );
    println!();

    let yaml_output = serde_yaml::to_string(&SpecLensConfig::default())?;
    println!("{yaml_output}");

    Ok(())
}

/// Initialize a configuration file with defaults
pub fn init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Configuration file already exists: {}. Use --force to overwrite or choose a different name with --output",
            args.output.display()
        ));
    }

    SpecLensConfig::default().to_yaml_file(&args.output)?;

    println!(
        "{} {}",
        "Configuration saved to:".bright_green().bold(),
        args.output.display().to_string().cyan()
    );
    println!();

    /// Row type for the configuration tips table.
    #[derive(Tabled)]
    struct CustomizationRow {
        setting: &'static str,
        description: &'static str,
    }

    let rows = vec![
        CustomizationRow {
            setting: "oracle.seed",
            description: "Fix the argument generator seed for reproducible datasets",
        },
        CustomizationRow {
            setting: "oracle.trials",
            description: "Trials per unit (default: 20)",
        },
        CustomizationRow {
            setting: "oracle.unresolved_policy",
            description: "Label for units the oracle cannot run (assume_safe | assume_risky)",
        },
        CustomizationRow {
            setting: "governance.min_recall",
            description: "Minimum held-out RISKY recall for promotion (default: 0.80)",
        },
        CustomizationRow {
            setting: "risk_thresholds",
            description: "LOW/MEDIUM/HIGH cut points for predict (default: 0.3 / 0.7)",
        },
    ];

    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{table}");

    Ok(())
}

/// Validate a SpecLens configuration file
pub fn validate_config(args: ValidateConfigArgs) -> anyhow::Result<()> {
    let config = match load_configuration(Some(&args.file)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration validation failed:".red(), e);
            eprintln!(
                "{}",
                "Tip: use 'speclens print-default-config' to see the valid format".dimmed()
            );
            return Err(anyhow::anyhow!("Configuration validation failed: {e}"));
        }
    };

    println!(
        "{} {}",
        "Configuration file is valid:".bright_green().bold(),
        args.file.display().to_string().cyan()
    );

    #[derive(Tabled)]
    struct DetailRow {
        setting: &'static str,
        value: String,
    }

    let rows = vec![
        DetailRow {
            setting: "oracle.trials",
            value: config.oracle.trials.to_string(),
        },
        DetailRow {
            setting: "oracle.seed",
            value: config
                .oracle
                .seed
                .map_or_else(|| "entropy (non-reproducible)".to_string(), |s| s.to_string()),
        },
        DetailRow {
            setting: "governance.min_recall",
            value: format!("{:.2}", config.governance.min_recall),
        },
        DetailRow {
            setting: "governance.candidates",
            value: config
                .governance
                .candidates
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        },
        DetailRow {
            setting: "risk_thresholds",
            value: format!(
                "low {:.2} / medium {:.2}",
                config.risk_thresholds.low, config.risk_thresholds.medium
            ),
        },
    ];

    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{table}");

    Ok(())
}
