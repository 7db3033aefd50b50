#![allow(dead_code)]

use std::{fs, io::Write, path::{Path, PathBuf}, sync::Mutex};

use async_trait::async_trait;
use xml_grader::{
    ant::BuildTool,
    config::Settings,
    LintCheck, LintOutcome, Report, XmlValidator,
};

pub const GOOD_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="system" type="xs:string"/>
</xs:schema>
"#;
pub const GOOD_XML: &str = "<?xml version=\"1.0\"?>\n<system>ok</system>\n";
pub const BROKEN_XSD: &str = "<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\">\n<unclosed>\n</xs:schema>\n";

/// Stands in for xmllint: a file is malformed when it contains `<unclosed>`,
/// a check fails when any file it reads is missing.
#[derive(Default)]
pub struct FakeLint {
    pub seen: Mutex<Vec<LintCheck>>,
}

impl FakeLint {
    pub fn seen(&self) -> Vec<LintCheck> { self.seen.lock().unwrap().clone() }
}

#[async_trait]
impl XmlValidator for FakeLint {
    fn command_line(&self, check: &LintCheck) -> String {
        let args: Vec<String> = check.args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        format!("xmllint {}", args.join(" "))
    }

    async fn check(&self, check: &LintCheck) -> LintOutcome {
        self.seen.lock().unwrap().push(check.clone());
        for path in check.paths() {
            let Ok(text) = fs::read_to_string(path) else {
                return LintOutcome::failed(format!("warning: failed to load external entity \"{}\"", path.display()));
            };
            if let Some(line) = text.lines().position(|l| l.contains("<unclosed>")) {
                return LintOutcome::failed(format!(
                    "{}:{}: parser error : Opening and ending tag mismatch: unclosed line {} and schema",
                    path.display(), line + 1, line + 1
                ));
            }
        }
        LintOutcome::ok()
    }
}

/// Build tool that only records the targets it was asked for.
#[derive(Default)]
pub struct NoopBuild {
    pub targets: Mutex<Vec<String>>,
}

#[async_trait]
impl BuildTool for NoopBuild {
    fn command_line(&self, target: &str) -> String { format!("ant {target}") }
    async fn run_target(&self, target: &str, _cwd: &Path) -> anyhow::Result<Option<i32>> {
        self.targets.lock().unwrap().push(target.to_string());
        Ok(Some(0))
    }
}

pub struct Sandbox {
    pub dir: tempfile::TempDir,
    pub settings: Settings,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::defaults(dir.path());
        for d in settings.layout.all() {
            fs::create_dir_all(d).unwrap();
        }
        Self { dir, settings }
    }

    pub fn download(&self, name: &str) -> PathBuf { self.settings.layout.download.join(name) }
    pub fn extracted(&self, name: &str) -> PathBuf { self.settings.layout.extract.join(name) }
    pub fn solution(&self, name: &str) -> PathBuf { self.settings.layout.solution.join(name) }

    pub fn validated(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.settings.layout.validated).unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn extract_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.settings.layout.extract).unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Puts the default reference files into `solution/`.
    pub fn with_solution(self) -> Self {
        fs::write(self.solution("system.xsd"), GOOD_XSD).unwrap();
        fs::write(self.solution("system-xsd.xml"), GOOD_XML).unwrap();
        fs::write(self.solution("system.dtd"), "<!ELEMENT system (#PCDATA)>\n").unwrap();
        fs::write(self.solution("system-dtd.xml"), GOOD_XML).unwrap();
        self
    }
}

/// Writes a zip archive with the given `(entry name, contents)` pairs.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut w = zip::ZipWriter::new(fs::File::create(path).unwrap());
    let opts = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        if name.ends_with('/') {
            w.add_directory(*name, opts).unwrap();
        } else {
            w.start_file(*name, opts).unwrap();
            w.write_all(body.as_bytes()).unwrap();
        }
    }
    w.finish().unwrap();
}

pub fn transcript(report: Report<Vec<u8>>) -> String {
    String::from_utf8(report.into_inner()).unwrap()
}
