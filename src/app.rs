// xml-grader/src/app.rs

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::io::Write;

use crate::{
    ant::{self, BuildTool},
    config::{dir_display, Settings},
    error::GraderError,
    extract::{self, Extraction},
    pipeline::{self, PipelineContext, PipelineRun},
    report::Report,
    workspace,
    xmllint::XmlValidator,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// xmllint well-formedness, XSD and DTD checks.
    #[default]
    Xmllint,
    /// Ant targets copied from the solution folder.
    Ant,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    pub extract: bool,
    pub mode: Mode,
}

/// External programs used by a run.
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub validator: &'a dyn XmlValidator,
    pub build: &'a dyn BuildTool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grading {
    Pipeline(PipelineRun),
    Ant(Vec<Option<i32>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub extraction: Option<Extraction>,
    pub grading: Grading,
}

/// One grading run: directories, optional extraction, then the checks.
/// A missing or ambiguous submission is printed and returned as
/// [`GraderError`]; failed checks are not errors. `clock` names the
/// validated record and is read only when a submission gets filed.
pub async fn run<W: Write>(
    settings: &Settings,
    opts: RunOptions,
    tools: Tools<'_>,
    clock: impl Fn() -> DateTime<Utc>,
    report: &mut Report<W>,
) -> Result<Summary> {
    let layout = &settings.layout;
    report.banner();
    workspace::ensure_layout(layout)?;

    let extraction = if opts.extract {
        // ant projects depend on their folder structure
        let unpack = match opts.mode {
            Mode::Xmllint => settings.extract.clone(),
            Mode::Ant => settings.extract.unflattened(),
        };
        match extract::extract_submission(layout, &unpack, clock, report) {
            Ok(x) => Some(x),
            Err(err) => {
                report.exception(&err, None);
                return Err(err.into());
            }
        }
    } else {
        report.step(format_args!("Validating with files in {} folder", dir_display(&layout.extract)));
        None
    };

    let grading = match opts.mode {
        Mode::Xmllint => {
            let ctx = PipelineContext { files: &settings.files, submission: &layout.extract, solution: &layout.solution };
            let stages = pipeline::standard_stages(settings.dtd_cross_check);
            Grading::Pipeline(pipeline::run(&stages, &ctx, tools.validator, report).await)
        }
        Mode::Ant => {
            if opts.extract {
                ant::copy_solution_context(&settings.ant.context, &layout.solution, &layout.extract, report);
            }
            Grading::Ant(ant::run_tasks(&settings.ant.tasks, &layout.extract, tools.build, report).await)
        }
    };

    report.step("Validation finished!");
    Ok(Summary { extraction, grading })
}

/// True when `err` is a missing or ambiguous submission.
pub fn is_input_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GraderError>().is_some_and(GraderError::is_input_error)
}
