// xml-grader/src/error.rs

use std::path::PathBuf;

use crate::config::dir_display;

/// Errors that stop a grading run before the pipeline starts.
#[derive(Debug, thiserror::Error)]
pub enum GraderError {
    #[error("No file in '{}'!!", dir_display(dir))]
    NoInputFile { dir: PathBuf },

    #[error("More than 1 file in '{}'!!", dir_display(dir))]
    AmbiguousInput { dir: PathBuf, found: usize },

    #[error("invalid ignore pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("cannot parse config {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl GraderError {
    /// Input errors abort the run; the binary maps them to exit status 2.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::NoInputFile { .. } | Self::AmbiguousInput { .. })
    }
}
