//! CLI Command Implementations
//!
//! - config: configuration management commands
//! - pipeline: parse, label, build-dataset and train
//! - governance: promote and predict

pub mod config;
pub mod governance;
pub mod pipeline;

pub use config::{init_config, print_default_config, validate_config};
pub use governance::{predict_command, promote_command};
pub use pipeline::{build_dataset_command, label_command, parse_command, train_command};
