// xml-grader/src/workspace.rs

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::config::Layout;

/// Creates whichever of the four working directories are missing.
/// Returns the ones that had to be created.
pub fn ensure_layout(layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut created = vec![];
    for dir in layout.all() {
        if dir.is_dir() { continue; }
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), "created working directory");
        created.push(dir.to_path_buf());
    }
    Ok(created)
}
