//! Terminal display for command results.
//!
//! Tables go to stdout; logs go to stderr through tracing.

use owo_colors::OwoColorize;
use tabled::{settings::Style as TableStyle, Table, Tabled};

use speclens::dataset::{BuildSummary, LabeledUnit};
use speclens::governance::{CandidateStatus, PromotionDecision, PromotionReport};
use speclens::models::TrainingOutcome;
use speclens::oracle::Label;
use speclens::serving::{RiskLevel, ServingReport};
use speclens::AnalyzableUnit;

fn render<T: Tabled>(rows: Vec<T>) -> String {
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    table.to_string()
}

fn clauses(list: &[String]) -> String {
    if list.is_empty() {
        "-".to_string()
    } else {
        list.join("\n")
    }
}

fn colored_label(label: Label) -> String {
    match label {
        Label::Safe => label.to_string().green().to_string(),
        Label::Risky => label.to_string().red().bold().to_string(),
    }
}

fn colored_level(level: RiskLevel) -> String {
    match level {
        RiskLevel::Low => level.to_string().green().to_string(),
        RiskLevel::Medium => level.to_string().yellow().to_string(),
        RiskLevel::High => level.to_string().red().bold().to_string(),
    }
}

/// Units recovered by the contract parser.
pub fn display_units(file: &str, units: &[AnalyzableUnit]) {
    #[derive(Tabled)]
    struct UnitRow {
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Line")]
        line: usize,
        #[tabled(rename = "Requires")]
        requires: String,
        #[tabled(rename = "Ensures")]
        ensures: String,
        #[tabled(rename = "Invariants")]
        invariants: String,
    }

    println!("{} {}", "Contracts in".bright_blue().bold(), file.cyan());
    if units.is_empty() {
        println!("   {}", "no functions or methods found".dimmed());
        return;
    }

    let rows = units
        .iter()
        .map(|unit| UnitRow {
            unit: unit.qualified_name(),
            line: unit.source_line,
            requires: clauses(&unit.requires),
            ensures: clauses(&unit.ensures),
            invariants: clauses(&unit.invariants),
        })
        .collect();
    println!("{}", render(rows));
}

/// Oracle verdicts for one file.
pub fn display_verdicts(file: &str, labeled: &[LabeledUnit]) {
    #[derive(Tabled)]
    struct VerdictRow {
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Label")]
        label: String,
        #[tabled(rename = "Trials")]
        trials: String,
        #[tabled(rename = "Evidence")]
        evidence: String,
    }

    println!("{} {}", "Verdicts for".bright_blue().bold(), file.cyan());
    let rows = labeled
        .iter()
        .map(|item| VerdictRow {
            unit: item.unit.qualified_name(),
            label: colored_label(item.verdict.label),
            trials: format!(
                "{} run / {} discarded",
                item.verdict.trials_run, item.verdict.trials_discarded
            ),
            evidence: item.verdict.outcome.to_string(),
        })
        .collect();
    println!("{}", render(rows));

    let risky = labeled
        .iter()
        .filter(|item| item.verdict.label == Label::Risky)
        .count();
    println!(
        "{} {} units, {} RISKY",
        "Summary:".bold(),
        labeled.len(),
        risky.to_string().red()
    );
}

/// Dataset build summary, including skipped files.
pub fn display_build_summary(summary: &BuildSummary, out: &str) {
    println!("{}", "Dataset built".bright_green().bold());
    println!(
        "   files {} | skipped {} | rows {} | RISKY {} | unresolved {} | dunder units skipped {}",
        summary.files_seen,
        summary.files_skipped.len(),
        summary.units_labeled,
        summary.risky,
        summary.unresolved,
        summary.units_skipped
    );
    println!("   {} {}", "written to".dimmed(), out.cyan());

    if !summary.files_skipped.is_empty() {
        #[derive(Tabled)]
        struct SkipRow {
            #[tabled(rename = "Skipped file")]
            file: String,
            #[tabled(rename = "Reason")]
            reason: String,
        }

        let rows = summary
            .files_skipped
            .iter()
            .map(|skip| SkipRow {
                file: skip.file.clone(),
                reason: skip.reason.clone(),
            })
            .collect();
        println!("{}", render(rows));
    }
}

/// Training result and validation report.
pub fn display_training(outcome: &TrainingOutcome, out: &str) {
    println!(
        "{} {} ({})",
        "Trained".bright_green().bold(),
        outcome.artifact.name.cyan(),
        outcome.artifact.family
    );
    println!(
        "   train rows {} | validation rows {}",
        outcome.train_rows, outcome.validation_rows
    );
    match &outcome.report {
        Some(report) => {
            println!();
            println!("{report}");
            println!();
            println!(
                "   {} {:.3}",
                "validation RISKY recall".bold(),
                report.confusion.recall_risky()
            );
        }
        None => println!("   {}", "no validation rows held out".dimmed()),
    }
    println!("   {} {}", "artifact".dimmed(), out.cyan());
}

/// Candidate evaluations and the promotion decision.
pub fn display_promotion(report: &PromotionReport) {
    #[derive(Tabled)]
    struct CandidateRow {
        #[tabled(rename = "Candidate")]
        name: String,
        #[tabled(rename = "Artifact")]
        artifact: String,
        #[tabled(rename = "RISKY recall")]
        recall: String,
    }

    let rows = report
        .evaluations
        .iter()
        .map(|evaluation| CandidateRow {
            name: evaluation.candidate.name.clone(),
            artifact: evaluation.candidate.path.display().to_string(),
            recall: match &evaluation.status {
                CandidateStatus::Evaluated { recall } => format!("{recall:.3}"),
                CandidateStatus::Skipped { reason } => format!("skipped: {reason}"),
            },
        })
        .collect();
    println!("{}", render(rows));

    match &report.decision {
        PromotionDecision::Promoted {
            candidate,
            artifact,
            recall,
        } => println!(
            "{} {} ({:.3}) -> {}",
            "Promoted".bright_green().bold(),
            candidate.cyan(),
            recall,
            artifact.display()
        ),
        PromotionDecision::AlreadyActive {
            candidate, recall, ..
        } => println!(
            "{} {} ({:.3}) is already active; pointer unchanged",
            "No change:".bright_blue().bold(),
            candidate.cyan(),
            recall
        ),
        PromotionDecision::BelowThreshold {
            candidate,
            recall,
            threshold,
        } => println!(
            "{} best candidate {} has recall {:.3} < {:.3}; pointer unchanged",
            "Rejected:".yellow().bold(),
            candidate.cyan(),
            recall,
            threshold
        ),
        PromotionDecision::NoCandidates => println!(
            "{} no candidate artifact available; pointer unchanged",
            "Nothing to promote:".yellow().bold()
        ),
    }

    if let Some(pointer) = &report.pointer_after {
        println!(
            "   {} {} (version {})",
            "active model".dimmed(),
            pointer.artifact.display(),
            pointer.version
        );
    }
}

/// Serving report for one file.
pub fn display_serving_report(report: &ServingReport) {
    #[derive(Tabled)]
    struct RiskRow {
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Line")]
        line: usize,
        #[tabled(rename = "Requires")]
        requires: String,
        #[tabled(rename = "Ensures")]
        ensures: String,
        #[tabled(rename = "P(RISKY)")]
        probability: String,
        #[tabled(rename = "Risk")]
        level: String,
    }

    println!(
        "{} {} {} {}",
        "Risk report for".bright_blue().bold(),
        report.file.cyan(),
        "using".dimmed(),
        report.model
    );
    let rows = report
        .entries
        .iter()
        .map(|entry| RiskRow {
            unit: match &entry.class {
                Some(class) => format!("{class}.{}", entry.name),
                None => entry.name.clone(),
            },
            line: entry.line,
            requires: clauses(&entry.requires),
            ensures: clauses(&entry.ensures),
            probability: format!("{:.3}", entry.probability),
            level: colored_level(entry.level),
        })
        .collect();
    println!("{}", render(rows));
    println!(
        "{} HIGH {} | MEDIUM {} | LOW {}",
        "Summary:".bold(),
        report.count(RiskLevel::High),
        report.count(RiskLevel::Medium),
        report.count(RiskLevel::Low)
    );
}

/// Pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
