// xml-grader/src/report.rs

use crossterm::style::{style, Color, Stylize};
use std::{fmt::Display, io::{self, Write}};

/// Transcript tone; maps to the terminal color of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone { Plain, Step, Success, Failure, Exception }

/// The grading transcript the instructor reads. Write errors are ignored:
/// a closed stdout must not abort grading.
pub struct Report<W: Write = io::Stdout> {
    out: W,
    color: bool,
}

impl Report<io::Stdout> {
    pub fn stdout(color: bool) -> Self { Self::new(io::stdout(), color) }
}

impl<W: Write> Report<W> {
    pub fn new(out: W, color: bool) -> Self { Self { out, color } }

    pub fn into_inner(self) -> W { self.out }

    pub fn line(&mut self, tone: Tone, message: impl Display) {
        let res = if !self.color || tone == Tone::Plain {
            writeln!(self.out, "{message}")
        } else {
            let s = style(message);
            let s = match tone {
                Tone::Step => s.with(Color::Cyan).bold(),
                Tone::Success => s.with(Color::DarkGreen),
                Tone::Failure => s.with(Color::Red).bold(),
                Tone::Exception => s.with(Color::Red).reverse(),
                Tone::Plain => s,
            };
            writeln!(self.out, "{s}")
        };
        let _ = res.and_then(|_| self.out.flush());
    }

    pub fn plain(&mut self, message: impl Display) { self.line(Tone::Plain, message) }
    pub fn step(&mut self, message: impl Display) { self.line(Tone::Step, message) }
    pub fn success(&mut self, message: impl Display) { self.line(Tone::Success, message) }
    pub fn failure(&mut self, message: impl Display) { self.line(Tone::Failure, message) }

    /// The validator or build-tool command line, echoed before it runs.
    pub fn command(&mut self, line: impl Display) { self.line(Tone::Plain, line) }

    /// `Error at <context>` followed by the error text, if any.
    pub fn exception(&mut self, at: impl Display, detail: Option<&dyn Display>) {
        self.line(Tone::Exception, format_args!("Error at {at}"));
        if let Some(d) = detail {
            self.line(Tone::Exception, d);
        }
    }

    pub fn banner(&mut self) {
        self.plain("");
        self.line(Tone::Step, format_args!("xml-grader {}", env!("CARGO_PKG_VERSION")));
        self.plain("");
    }
}
