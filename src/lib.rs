pub mod ant;
pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod report;
pub mod workspace;
pub mod xmllint;

pub use app::{Mode, RunOptions, Summary, Tools};
pub use config::{Config, ConfigManager, ExerciseFiles, Layout, Settings};
pub use error::GraderError;
pub use extract::{extract_submission, Extraction};
pub use pipeline::{standard_stages, PipelineContext, PipelineRun, StageId, StageOutcome};
pub use report::Report;
pub use xmllint::{LintCheck, LintOutcome, XmlValidator, Xmllint};
