// xml-grader/src/xmllint.rs

use async_trait::async_trait;
use std::{ffi::OsString, io::Write, path::{Path, PathBuf}, process::Stdio};
use tokio::process::Command;

use crate::report::Report;

/// One xmllint invocation. Always run with `--noout`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LintCheck {
    WellFormed { doc: PathBuf },
    Schema { xsd: PathBuf, doc: PathBuf },
    Dtd { dtd: PathBuf, doc: PathBuf },
}

impl LintCheck {
    pub fn args(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = vec!["--noout".into()];
        match self {
            Self::WellFormed { doc } => argv.push(doc.into()),
            Self::Schema { xsd, doc } => argv.extend([OsString::from("--schema"), xsd.into(), doc.into()]),
            Self::Dtd { dtd, doc } => argv.extend([OsString::from("--dtdvalid"), dtd.into(), doc.into()]),
        }
        argv
    }

    /// Every file the check reads, schema first.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::WellFormed { doc } => vec![doc.as_path()],
            Self::Schema { xsd, doc } => vec![xsd.as_path(), doc.as_path()],
            Self::Dtd { dtd, doc } => vec![dtd.as_path(), doc.as_path()],
        }
    }
}

/// Result of a check: an empty diagnostic means success.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LintOutcome {
    pub diagnostic: String,
}

impl LintOutcome {
    pub fn ok() -> Self { Self::default() }
    pub fn failed(diagnostic: impl Into<String>) -> Self { Self { diagnostic: diagnostic.into() } }
    pub fn passed(&self) -> bool { self.diagnostic.is_empty() }
}

#[async_trait]
pub trait XmlValidator: Send + Sync {
    /// Human-readable command line, echoed to the transcript.
    fn command_line(&self, check: &LintCheck) -> String;
    async fn check(&self, check: &LintCheck) -> LintOutcome;
}

/// The external `xmllint` binary.
#[derive(Clone, Debug)]
pub struct Xmllint {
    binary: PathBuf,
}

impl Xmllint {
    pub fn new(binary: impl Into<PathBuf>) -> Self { Self { binary: binary.into() } }
}

#[async_trait]
impl XmlValidator for Xmllint {
    fn command_line(&self, check: &LintCheck) -> String {
        let mut line = self.binary.display().to_string();
        for a in check.args() {
            line.push(' ');
            line.push_str(&a.to_string_lossy());
        }
        line
    }

    async fn check(&self, check: &LintCheck) -> LintOutcome {
        let output = Command::new(&self.binary)
            .args(check.args())
            .stdin(Stdio::null())
            .output()
            .await;
        let output = match output {
            Ok(o) => o,
            Err(err) => return LintOutcome::failed(format!("failed to run {}: {err}", self.binary.display())),
        };
        tracing::debug!(status = %output.status, "xmllint finished");
        if output.status.success() {
            return LintOutcome::ok();
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if text.trim().is_empty() {
            text = format!("{} exited with {}", self.binary.display(), output.status);
        }
        LintOutcome::failed(text)
    }
}

/// Echoes the command line, then runs the check.
pub async fn invoke<W: Write>(validator: &dyn XmlValidator, check: &LintCheck, report: &mut Report<W>) -> LintOutcome {
    report.command(validator.command_line(check));
    validator.check(check).await
}
