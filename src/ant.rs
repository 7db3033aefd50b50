// xml-grader/src/ant.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{fs, io::Write, path::Path};
use tokio::process::Command;
use walkdir::WalkDir;

use crate::{config::AntTask, report::Report};

#[async_trait]
pub trait BuildTool: Send + Sync {
    fn command_line(&self, target: &str) -> String;
    /// Runs `target` inside `cwd`; returns the exit code, `None` if killed by a signal.
    async fn run_target(&self, target: &str, cwd: &Path) -> Result<Option<i32>>;
}

/// Apache Ant; its output goes straight to the terminal.
#[derive(Clone, Debug)]
pub struct Ant {
    binary: std::path::PathBuf,
}

impl Ant {
    pub fn new(binary: impl Into<std::path::PathBuf>) -> Self { Self { binary: binary.into() } }
}

#[async_trait]
impl BuildTool for Ant {
    fn command_line(&self, target: &str) -> String { format!("{} {}", self.binary.display(), target) }

    async fn run_target(&self, target: &str, cwd: &Path) -> Result<Option<i32>> {
        let status = Command::new(&self.binary)
            .arg(target)
            .current_dir(cwd)
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.binary.display()))?;
        Ok(status.code())
    }
}

/// Copies the build scaffolding (build.xml, lib/, ...) from the solution
/// into the extraction directory. Returns the entries that were missing.
pub fn copy_solution_context<W: Write>(
    context: &[String],
    solution: &Path,
    extract: &Path,
    report: &mut Report<W>,
) -> Vec<String> {
    let mut missing = vec![];
    for name in context {
        let src = solution.join(name);
        let dst = extract.join(name);
        let res = if src.is_dir() {
            copy_tree(&src, &dst)
        } else if src.is_file() {
            fs::copy(&src, &dst).map(|_| ()).with_context(|| format!("copy {}", src.display()))
        } else {
            report.failure(format_args!("{} not found in solution folder", name));
            missing.push(name.clone());
            continue;
        };
        if let Err(err) = res {
            report.exception(format_args!("Cannot copy {}", name), Some(&format_args!("{err:#}")));
        }
    }
    missing
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("create {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| format!("copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Runs each grading target in order. Failures are reported; later tasks
/// still run. Returns the exit code of every task.
pub async fn run_tasks<W: Write>(
    tasks: &[AntTask],
    extract: &Path,
    tool: &dyn BuildTool,
    report: &mut Report<W>,
) -> Vec<Option<i32>> {
    let mut codes = vec![];
    for task in tasks {
        report.plain("");
        report.step(&task.title);
        report.command(format_args!("Running {}", tool.command_line(&task.target)));
        let code = match tool.run_target(&task.target, extract).await {
            Ok(code) => code,
            Err(err) => {
                report.exception(format_args!("{} failed", task.target), Some(&format_args!("{err:#}")));
                None
            }
        };
        if code != Some(0) {
            let status = code.map_or_else(|| "no exit code".to_string(), |c| c.to_string());
            report.failure(format_args!("{} finished with {}", task.target, status));
        }
        report.plain(format_args!(
            "If no error occurred, then {} should be created!",
            extract.join(&task.output).display()
        ));
        codes.push(code);
    }
    codes
}
