//! Directory of annotated sources to labeled dataset.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::table::{Dataset, LabeledExample};
use crate::core::config::{DatasetConfig, OracleConfig, SpecLensConfig};
use crate::core::errors::{Result, SpecLensError};
use crate::core::featureset::{ContractFeatureExtractor, FeatureExtractor, FeatureSchema, FeatureVector};
use crate::core::file_utils::discover_sources;
use crate::lang::common::AnalyzableUnit;
use crate::lang::python::ContractParser;
use crate::oracle::{unit_seed, Label, Verdict, VerificationOracle};
use crate::runtime::{ExecutionLimits, LoadedModule};

/// Interpreter recursion is deep; worker threads get a generous stack.
const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// A unit with its features and the oracle's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledUnit {
    /// Parsed unit
    pub unit: AnalyzableUnit,
    /// Features in schema order
    pub features: FeatureVector,
    /// Oracle result
    pub verdict: Verdict,
}

/// A file left out of the dataset and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// File name
    pub file: String,
    /// Parse or load failure
    pub reason: String,
}

/// Counts and diagnostics from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Source files discovered
    pub files_seen: usize,
    /// Files skipped entirely
    pub files_skipped: Vec<SkippedFile>,
    /// Rows produced
    pub units_labeled: usize,
    /// Dunder units left out
    pub units_skipped: usize,
    /// Rows labelled RISKY
    pub risky: usize,
    /// Rows whose unit could not be exercised
    pub unresolved: usize,
}

struct FileResult {
    file: String,
    outcome: std::result::Result<Vec<LabeledUnit>, String>,
    units_skipped: usize,
}

/// Parses, labels and featurizes every unit in a directory.
pub struct DatasetBuilder {
    oracle_config: OracleConfig,
    dataset_config: DatasetConfig,
    oracle: VerificationOracle,
    extractor: ContractFeatureExtractor,
}

impl DatasetBuilder {
    /// Builder for the given oracle and dataset settings
    pub fn new(oracle_config: OracleConfig, dataset_config: DatasetConfig) -> Self {
        let oracle = VerificationOracle::new(&oracle_config);
        Self {
            oracle_config,
            dataset_config,
            oracle,
            extractor: ContractFeatureExtractor::new(),
        }
    }

    /// Builder from the full configuration
    pub fn from_config(config: &SpecLensConfig) -> Self {
        Self::new(config.oracle.clone(), config.dataset.clone())
    }

    /// Schema of every dataset this builder produces
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.extractor.features().into_iter().map(|f| f.name))
    }

    /// Build one row per in-scope unit. Per-file failures are recorded in the
    /// summary; only an unreadable directory fails the build.
    pub fn build(&self, dir: &Path) -> Result<(Dataset, BuildSummary)> {
        let files = discover_sources(dir, &self.dataset_config.extensions)?;
        let seed = self.base_seed();
        info!(dir = %dir.display(), files = files.len(), seed, "Building dataset");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(if self.dataset_config.parallel { 0 } else { 1 })
            .stack_size(WORKER_STACK_SIZE)
            .build()
            .map_err(|e| SpecLensError::internal(format!("Failed to start worker pool: {e}")))?;

        let results: Vec<FileResult> =
            pool.install(|| files.par_iter().map(|path| self.process_file(path, seed)).collect());

        let mut dataset = Dataset::new(self.schema());
        let mut summary = BuildSummary {
            files_seen: files.len(),
            ..BuildSummary::default()
        };

        for result in results {
            summary.units_skipped += result.units_skipped;
            let labeled = match result.outcome {
                Ok(labeled) => labeled,
                Err(reason) => {
                    warn!(file = %result.file, reason = %reason, "Skipping file");
                    summary.files_skipped.push(SkippedFile {
                        file: result.file,
                        reason,
                    });
                    continue;
                }
            };

            for item in labeled {
                summary.units_labeled += 1;
                if item.verdict.label == Label::Risky {
                    summary.risky += 1;
                }
                if item.verdict.is_unresolved() {
                    summary.unresolved += 1;
                }
                dataset.examples.push(LabeledExample {
                    features: item.features,
                    label: item.verdict.label,
                    source_file: result.file.clone(),
                    name: item.unit.name,
                    class: item.unit.enclosing_type,
                });
            }
        }

        info!(
            rows = summary.units_labeled,
            risky = summary.risky,
            unresolved = summary.unresolved,
            skipped_files = summary.files_skipped.len(),
            "Dataset built"
        );
        Ok((dataset, summary))
    }

    /// Label every unit of one file, failing fast on parse or load errors.
    /// Dunder units are included.
    pub fn label_file(&self, path: &Path) -> Result<Vec<LabeledUnit>> {
        let seed = self.base_seed();
        let file = file_name(path);
        let mut parser = ContractParser::new()?;
        let source = parser.parse_file(path)?;
        let units = parser.units(&source);
        let limits = ExecutionLimits::from(&self.oracle_config);

        run_with_stack(move || {
            let module = LoadedModule::load(&source, limits)?;
            Ok(units
                .into_iter()
                .map(|unit| self.label_unit(unit, &module, &file, seed))
                .collect())
        })
    }

    fn process_file(&self, path: &Path, seed: u64) -> FileResult {
        let file = file_name(path);
        let mut units_skipped = 0;

        let outcome = (|| -> std::result::Result<Vec<LabeledUnit>, String> {
            let mut parser = ContractParser::new().map_err(|e| e.to_string())?;
            let source = parser.parse_file(path).map_err(|e| e.to_string())?;
            let module = LoadedModule::load(&source, ExecutionLimits::from(&self.oracle_config))
                .map_err(|e| e.to_string())?;

            let mut labeled = Vec::new();
            for unit in parser.units(&source) {
                if self.dataset_config.skip_dunder && unit.is_dunder() {
                    units_skipped += 1;
                    continue;
                }
                labeled.push(self.label_unit(unit, &module, &file, seed));
            }
            Ok(labeled)
        })();

        debug!(file = %file, ok = outcome.is_ok(), "Processed file");
        FileResult {
            file,
            outcome,
            units_skipped,
        }
    }

    fn label_unit(&self, unit: AnalyzableUnit, module: &LoadedModule, file: &str, seed: u64) -> LabeledUnit {
        let mut rng = StdRng::seed_from_u64(unit_seed(seed, file, &unit.qualified_name()));
        let verdict = self.oracle.verify(&unit, module, &mut rng);
        let features = self.extractor.extract(&unit);
        LabeledUnit {
            unit,
            features,
            verdict,
        }
    }

    fn base_seed(&self) -> u64 {
        match self.oracle_config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random();
                warn!(seed, "No oracle seed configured; labels are not reproducible");
                seed
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run `job` on a single worker thread with [`WORKER_STACK_SIZE`].
fn run_with_stack<T, F>(job: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .stack_size(WORKER_STACK_SIZE)
        .build()
        .map_err(|e| SpecLensError::internal(format!("Failed to start worker: {e}")))?;
    pool.install(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config() -> (OracleConfig, DatasetConfig) {
        let oracle = OracleConfig {
            seed: Some(3),
            step_budget: 5_000,
            ..OracleConfig::default()
        };
        (oracle, DatasetConfig::default())
    }

    fn write(dir: &Path, name: &str, code: &str) {
        fs::write(dir.join(name), code).unwrap();
    }

    fn sample_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a_math.py",
            "# @requires b != 0\n# @ensures result * b == a\ndef div(a, b):\n    return a // b\n\n# @ensures result >= 0\ndef square(x):\n    return x * x\n",
        );
        write(
            dir.path(),
            "b_shapes.py",
            "class Square:\n    def __init__(self, side):\n        self.side = side\n\n    # @ensures result == self.side * 4\n    def perimeter(self):\n        return self.side * 4\n",
        );
        write(dir.path(), "c_broken.py", "def oops(:\n    pass\n");
        write(dir.path(), "d_raises.py", "raise ValueError('at import')\n");
        write(dir.path(), "notes.txt", "not python");
        dir
    }

    #[test]
    fn builds_rows_and_records_skipped_files() {
        let dir = sample_dir();
        let (oracle, dataset) = config();
        let builder = DatasetBuilder::new(oracle, dataset);
        let (data, summary) = builder.build(dir.path()).unwrap();

        assert_eq!(summary.files_seen, 4);
        let skipped: Vec<&str> = summary.files_skipped.iter().map(|s| s.file.as_str()).collect();
        assert_eq!(skipped, vec!["c_broken.py", "d_raises.py"]);
        assert_eq!(summary.units_skipped, 1);
        assert_eq!(summary.units_labeled, 3);

        let names: Vec<&str> = data.examples.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["div", "square", "perimeter"]);
        assert_eq!(data.examples[0].label, Label::Risky);
        assert_eq!(data.examples[1].label, Label::Safe);
        assert_eq!(data.examples[2].class.as_deref(), Some("Square"));
        assert_eq!(data.examples[2].source_file, "b_shapes.py");
        assert_eq!(summary.risky, 1);
        assert_eq!(data.schema, FeatureSchema::contract());
    }

    #[test]
    fn seeded_builds_are_byte_identical_in_parallel_and_serial() {
        let dir = sample_dir();
        let (oracle, dataset) = config();
        let parallel = DatasetBuilder::new(oracle.clone(), dataset.clone());
        let serial = DatasetBuilder::new(
            oracle,
            DatasetConfig {
                parallel: false,
                ..dataset
            },
        );
        let (a, _) = parallel.build(dir.path()).unwrap();
        let (b, _) = serial.build(dir.path()).unwrap();
        assert_eq!(a.to_csv_string(), b.to_csv_string());
    }

    #[test]
    fn label_file_fails_fast_on_syntax_error() {
        let dir = sample_dir();
        let (oracle, dataset) = config();
        let builder = DatasetBuilder::new(oracle, dataset);
        assert!(builder.label_file(&dir.path().join("c_broken.py")).is_err());

        let labeled = builder.label_file(&dir.path().join("b_shapes.py")).unwrap();
        let names: Vec<&str> = labeled.iter().map(|l| l.unit.name.as_str()).collect();
        assert_eq!(names, vec!["__init__", "perimeter"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let (oracle, dataset) = config();
        let builder = DatasetBuilder::new(oracle, dataset);
        assert!(builder.build(Path::new("/no/such/place")).is_err());
    }
}
