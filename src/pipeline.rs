// xml-grader/src/pipeline.rs

use std::{fmt, io::Write, path::{Path, PathBuf}};

use crate::{
    config::ExerciseFiles,
    report::Report,
    xmllint::{invoke, LintCheck, XmlValidator},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    SchemaWellFormed,
    SchemaInstanceWellFormed,
    SchemaValid,
    DtdPresent,
    DtdInstanceWellFormed,
    DtdValid,
    StudentSchemaVsReference,
    ReferenceSchemaVsStudent,
    StudentDtdVsReference,
    ReferenceDtdVsStudent,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SchemaWellFormed => "schema well-formed",
            Self::SchemaInstanceWellFormed => "schema instance well-formed",
            Self::SchemaValid => "schema validation",
            Self::DtdPresent => "dtd present",
            Self::DtdInstanceWellFormed => "dtd instance well-formed",
            Self::DtdValid => "dtd validation",
            Self::StudentSchemaVsReference => "student schema vs. reference instance",
            Self::ReferenceSchemaVsStudent => "reference schema vs. student instance",
            Self::StudentDtdVsReference => "student dtd vs. reference instance",
            Self::ReferenceDtdVsStudent => "reference dtd vs. student instance",
        };
        f.write_str(s)
    }
}

/// Which of the four exercise files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role { Schema, SchemaXml, Dtd, DtdXml }

/// Where a file is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source { Submission, Solution }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileRef { pub source: Source, pub role: Role }

const fn student(role: Role) -> FileRef { FileRef { source: Source::Submission, role } }
const fn reference(role: Role) -> FileRef { FileRef { source: Source::Solution, role } }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Exists(Role),
    WellFormed(Role),
    ValidateSchema { xsd: FileRef, doc: FileRef },
    ValidateDtd { dtd: FileRef, doc: FileRef },
}

/// One pipeline step. It runs only when every stage in `requires` passed;
/// its own failure never stops later stages.
#[derive(Clone, Debug)]
pub struct Stage {
    pub id: StageId,
    pub requires: &'static [StageId],
    pub action: Action,
    /// Point deduction printed on failure; `None` for advisory cross-checks.
    pub penalty: Option<&'static str>,
    pub cross_check: bool,
}

fn graded(id: StageId, requires: &'static [StageId], action: Action, penalty: &'static str) -> Stage {
    Stage { id, requires, action, penalty: Some(penalty), cross_check: false }
}

fn advisory(id: StageId, requires: &'static [StageId], action: Action) -> Stage {
    Stage { id, requires, action, penalty: None, cross_check: true }
}

pub fn standard_stages(dtd_cross_check: bool) -> Vec<Stage> {
    use Role::*;
    use StageId::*;

    let mut stages = vec![
        graded(SchemaWellFormed, &[], Action::WellFormed(Schema), "0 points for ex. 1 & 2"),
        graded(SchemaInstanceWellFormed, &[], Action::WellFormed(SchemaXml), "0 points for ex. 3"),
        graded(
            SchemaValid,
            &[SchemaWellFormed, SchemaInstanceWellFormed],
            Action::ValidateSchema { xsd: student(Schema), doc: student(SchemaXml) },
            "0 points for ex. 3",
        ),
        graded(DtdPresent, &[], Action::Exists(Dtd), "0 points for ex. 4"),
        graded(DtdInstanceWellFormed, &[], Action::WellFormed(DtdXml), "0 points for ex. 5"),
        graded(
            DtdValid,
            &[DtdInstanceWellFormed],
            Action::ValidateDtd { dtd: student(Dtd), doc: student(DtdXml) },
            "0 points for ex. 5",
        ),
        advisory(
            StudentSchemaVsReference,
            &[SchemaWellFormed],
            Action::ValidateSchema { xsd: student(Schema), doc: reference(SchemaXml) },
        ),
        advisory(
            ReferenceSchemaVsStudent,
            &[SchemaInstanceWellFormed],
            Action::ValidateSchema { xsd: reference(Schema), doc: student(SchemaXml) },
        ),
    ];
    if dtd_cross_check {
        stages.push(advisory(
            StudentDtdVsReference,
            &[DtdPresent],
            Action::ValidateDtd { dtd: student(Dtd), doc: reference(DtdXml) },
        ));
        stages.push(advisory(
            ReferenceDtdVsStudent,
            &[DtdInstanceWellFormed],
            Action::ValidateDtd { dtd: reference(Dtd), doc: student(DtdXml) },
        ));
    }
    stages
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Passed,
    Failed { diagnostic: Option<String> },
    Skipped { missing: Vec<StageId> },
}

impl StageOutcome {
    pub fn passed(&self) -> bool { matches!(self, Self::Passed) }
    pub fn skipped(&self) -> bool { matches!(self, Self::Skipped { .. }) }
}

/// Where the pipeline reads student and reference files from.
#[derive(Clone, Copy, Debug)]
pub struct PipelineContext<'a> {
    pub files: &'a ExerciseFiles,
    pub submission: &'a Path,
    pub solution: &'a Path,
}

impl PipelineContext<'_> {
    pub fn name(&self, role: Role) -> &str {
        match role {
            Role::Schema => &self.files.schema,
            Role::SchemaXml => &self.files.schema_xml,
            Role::Dtd => &self.files.dtd,
            Role::DtdXml => &self.files.dtd_xml,
        }
    }

    pub fn path(&self, file: FileRef) -> PathBuf {
        let dir = match file.source {
            Source::Submission => self.submission,
            Source::Solution => self.solution,
        };
        dir.join(self.name(file.role))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineRun {
    pub outcomes: Vec<(StageId, StageOutcome)>,
}

impl PipelineRun {
    pub fn outcome(&self, id: StageId) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|(s, _)| *s == id).map(|(_, o)| o)
    }

    pub fn passed(&self, id: StageId) -> bool { self.outcome(id).is_some_and(StageOutcome::passed) }
}

/// Runs every stage in order and prints the transcript.
pub async fn run<W: Write>(
    stages: &[Stage],
    ctx: &PipelineContext<'_>,
    validator: &dyn XmlValidator,
    report: &mut Report<W>,
) -> PipelineRun {
    let mut done = PipelineRun::default();
    let mut in_cross_checks = false;
    report.step("Start validating files");

    for stage in stages {
        if stage.cross_check && !in_cross_checks {
            in_cross_checks = true;
            report.step("Start validating files against the sample solution");
            report.step("Attention: errors are possible.");
        }
        let missing: Vec<StageId> = stage.requires.iter().copied().filter(|r| !done.passed(*r)).collect();
        let outcome = if missing.is_empty() {
            run_stage(stage, ctx, validator, report).await
        } else {
            tracing::debug!(stage = %stage.id, ?missing, "stage skipped");
            StageOutcome::Skipped { missing }
        };
        tracing::info!(stage = %stage.id, ?outcome, "stage finished");
        done.outcomes.push((stage.id, outcome));
    }
    done
}

async fn run_stage<W: Write>(
    stage: &Stage,
    ctx: &PipelineContext<'_>,
    validator: &dyn XmlValidator,
    report: &mut Report<W>,
) -> StageOutcome {
    match stage.action {
        Action::Exists(role) => {
            if file_exists(ctx, role, stage.penalty, report) { StageOutcome::Passed } else { StageOutcome::Failed { diagnostic: None } }
        }
        Action::WellFormed(role) => {
            if !file_exists(ctx, role, stage.penalty, report) {
                return StageOutcome::Failed { diagnostic: None };
            }
            let check = LintCheck::WellFormed { doc: ctx.path(student(role)) };
            let out = invoke(validator, &check, report).await;
            if out.passed() {
                report.success(format_args!("File {} is well-formed.", ctx.name(role)));
                StageOutcome::Passed
            } else {
                if let Some(p) = stage.penalty { report.failure(p); }
                report.failure(&out.diagnostic);
                StageOutcome::Failed { diagnostic: Some(out.diagnostic) }
            }
        }
        Action::ValidateSchema { xsd, doc } => {
            validate(LintCheck::Schema { xsd: ctx.path(xsd), doc: ctx.path(doc) }, stage.penalty, validator, report).await
        }
        Action::ValidateDtd { dtd, doc } => {
            validate(LintCheck::Dtd { dtd: ctx.path(dtd), doc: ctx.path(doc) }, stage.penalty, validator, report).await
        }
    }
}

fn file_exists<W: Write>(ctx: &PipelineContext<'_>, role: Role, penalty: Option<&str>, report: &mut Report<W>) -> bool {
    if ctx.path(student(role)).is_file() {
        return true;
    }
    if let Some(p) = penalty { report.failure(p); }
    false
}

async fn validate<W: Write>(
    check: LintCheck,
    penalty: Option<&str>,
    validator: &dyn XmlValidator,
    report: &mut Report<W>,
) -> StageOutcome {
    let out = invoke(validator, &check, report).await;
    if out.passed() {
        report.success("No errors by xmllint.");
        return StageOutcome::Passed;
    }
    report.failure("Some errors during the validation");
    report.failure(&out.diagnostic);
    if let Some(p) = penalty { report.failure(p); }
    StageOutcome::Failed { diagnostic: Some(out.diagnostic) }
}
