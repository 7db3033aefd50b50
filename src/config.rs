use anyhow::{Context, Result};
use directories::ProjectDirs;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::{fs, io::IsTerminal, path::{Path, PathBuf}};

use crate::error::GraderError;

pub const WORKSPACE_CONFIG: &str = "grader.toml";

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub files: FilesConfig,
    pub dirs: DirsConfig,
    pub xmllint: XmllintConfig,
    pub extract: ExtractConfig,
    pub ant: AntConfig,
    pub report: ReportConfig,
}

/// Names of the student files inside the extraction (and solution) directory.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilesConfig {
    pub schema: Option<String>,
    pub schema_xml: Option<String>,
    pub dtd: Option<String>,
    pub dtd_xml: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DirsConfig {
    pub download: Option<PathBuf>,
    pub extract: Option<PathBuf>,
    pub validated: Option<PathBuf>,
    pub solution: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct XmllintConfig {
    pub binary: Option<PathBuf>,
    pub dtd_cross_check: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractConfig {
    pub flatten_depth: Option<usize>,
    pub ignore: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AntConfig {
    pub binary: Option<PathBuf>,
    pub context: Vec<String>,
    pub tasks: Vec<AntTask>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AntTask {
    pub title: String,
    pub target: String,
    pub output: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    pub color: Option<bool>,
}

fn merge(a: &mut Config, b: &Config) {
    let overlay = |dst: &mut Option<String>, src: &Option<String>| { if src.is_some() { *dst = src.clone(); } };
    overlay(&mut a.files.schema, &b.files.schema);
    overlay(&mut a.files.schema_xml, &b.files.schema_xml);
    overlay(&mut a.files.dtd, &b.files.dtd);
    overlay(&mut a.files.dtd_xml, &b.files.dtd_xml);

    let overlay_path = |dst: &mut Option<PathBuf>, src: &Option<PathBuf>| { if src.is_some() { *dst = src.clone(); } };
    overlay_path(&mut a.dirs.download, &b.dirs.download);
    overlay_path(&mut a.dirs.extract, &b.dirs.extract);
    overlay_path(&mut a.dirs.validated, &b.dirs.validated);
    overlay_path(&mut a.dirs.solution, &b.dirs.solution);

    overlay_path(&mut a.xmllint.binary, &b.xmllint.binary);
    if b.xmllint.dtd_cross_check.is_some() { a.xmllint.dtd_cross_check = b.xmllint.dtd_cross_check; }

    if b.extract.flatten_depth.is_some() { a.extract.flatten_depth = b.extract.flatten_depth; }
    if !b.extract.ignore.is_empty() { a.extract.ignore = b.extract.ignore.clone(); }

    overlay_path(&mut a.ant.binary, &b.ant.binary);
    if !b.ant.context.is_empty() { a.ant.context = b.ant.context.clone(); }
    if !b.ant.tasks.is_empty() { a.ant.tasks = b.ant.tasks.clone(); }

    if b.report.color.is_some() { a.report.color = b.report.color; }
}

fn config_paths(root: &Path) -> (PathBuf, Option<PathBuf>, PathBuf) {
    let system = if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\ProgramData\xml-grader\config.toml")
    } else {
        PathBuf::from("/etc/xml-grader/config.toml")
    };
    let user = ProjectDirs::from("org", "xml-grader", "xml-grader").map(|p| p.config_dir().join("config.toml"));
    let workspace = root.join(WORKSPACE_CONFIG);
    (system, user, workspace)
}

/// Collects the configuration layers for one run; later layers win.
#[derive(Clone, Debug)]
pub struct ConfigManager {
    root: PathBuf,
    layers: Vec<PathBuf>,
    merged: Config,
}

impl ConfigManager {
    /// Reads system, user and workspace files plus an optional explicit file.
    pub fn load(root: impl AsRef<Path>, extra: Option<&Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let (system, user, workspace) = config_paths(&root);
        let mut layers = vec![system];
        layers.extend(user);
        layers.push(workspace);
        layers.extend(extra.map(Path::to_path_buf));

        let mut merged = Config::default();
        for path in &layers {
            if let Some(cfg) = Self::read_file(path)? {
                tracing::debug!(path = %path.display(), "loaded config layer");
                merge(&mut merged, &cfg);
            }
        }
        Ok(Self { root, layers, merged })
    }

    fn read_file(path: &Path) -> Result<Option<Config>, GraderError> {
        let Ok(text) = fs::read_to_string(path) else { return Ok(None) };
        let cfg = toml::from_str(&text).map_err(|source| GraderError::ConfigParse { path: path.to_path_buf(), source })?;
        Ok(Some(cfg))
    }

    /// In-memory overlay (CLI flags); never persisted.
    pub fn apply_runtime_overlay(&mut self, patch: &Config) { merge(&mut self.merged, patch); }

    pub fn layers(&self) -> &[PathBuf] { &self.layers }

    pub fn settings(&self) -> Result<Settings> {
        Settings::resolve(&self.root, &self.merged).context("resolve settings")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExerciseFiles {
    pub schema: String,
    pub schema_xml: String,
    pub dtd: String,
    pub dtd_xml: String,
}

impl Default for ExerciseFiles {
    fn default() -> Self {
        Self {
            schema: "system.xsd".into(),
            schema_xml: "system-xsd.xml".into(),
            dtd: "system.dtd".into(),
            dtd_xml: "system-dtd.xml".into(),
        }
    }
}

/// The four working directories, already joined onto the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub download: PathBuf,
    pub extract: PathBuf,
    pub validated: PathBuf,
    pub solution: PathBuf,
}

impl Layout {
    pub fn under(root: &Path) -> Self {
        Self {
            download: root.join("download"),
            extract: root.join("extract"),
            validated: root.join("validated"),
            solution: root.join("solution"),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [self.download.as_path(), self.extract.as_path(), self.validated.as_path(), self.solution.as_path()]
    }
}

/// Directory as printed in the transcript, always with a trailing separator.
pub fn dir_display(dir: &Path) -> String {
    let mut s = dir.display().to_string();
    if !s.ends_with(std::path::MAIN_SEPARATOR) && !s.ends_with('/') {
        s.push(std::path::MAIN_SEPARATOR);
    }
    s
}

#[derive(Clone, Debug)]
pub struct ExtractSettings {
    pub flatten_depth: usize,
    pub ignore: GlobSet,
}

impl ExtractSettings {
    pub fn new(flatten_depth: usize, patterns: &[String]) -> Result<Self, GraderError> {
        Ok(Self { flatten_depth, ignore: build_globset(patterns)? })
    }

    /// Same ignore rules, nested folders kept as unpacked.
    pub fn unflattened(&self) -> Self { Self { flatten_depth: 0, ignore: self.ignore.clone() } }

    /// True for OS bookkeeping entries such as `.DS_Store` or `__MACOSX`.
    pub fn is_ignored(&self, name: &std::ffi::OsStr) -> bool { self.ignore.is_match(Path::new(name)) }
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self::new(1, &default_ignore()).unwrap_or_else(|_| Self { flatten_depth: 1, ignore: GlobSet::empty() })
    }
}

#[derive(Clone, Debug)]
pub struct AntSettings {
    pub binary: PathBuf,
    pub context: Vec<String>,
    pub tasks: Vec<AntTask>,
}

impl Default for AntSettings {
    fn default() -> Self {
        Self {
            binary: "ant".into(),
            context: vec!["build".into(), "build.xml".into(), "lib".into()],
            tasks: default_ant_tasks(),
        }
    }
}

/// Resolved configuration record handed to the extractor, pipeline and ant runner.
#[derive(Clone, Debug)]
pub struct Settings {
    pub files: ExerciseFiles,
    pub layout: Layout,
    pub xmllint: PathBuf,
    pub dtd_cross_check: bool,
    pub extract: ExtractSettings,
    pub ant: AntSettings,
    pub color: bool,
}

impl Settings {
    pub fn resolve(root: &Path, cfg: &Config) -> Result<Self, GraderError> {
        let files = ExerciseFiles::default();
        let files = ExerciseFiles {
            schema: cfg.files.schema.clone().unwrap_or(files.schema),
            schema_xml: cfg.files.schema_xml.clone().unwrap_or(files.schema_xml),
            dtd: cfg.files.dtd.clone().unwrap_or(files.dtd),
            dtd_xml: cfg.files.dtd_xml.clone().unwrap_or(files.dtd_xml),
        };
        let base = Layout::under(root);
        let dir = |p: &Option<PathBuf>, default: PathBuf| p.as_ref().map(|p| root.join(p)).unwrap_or(default);
        let layout = Layout {
            download: dir(&cfg.dirs.download, base.download),
            extract: dir(&cfg.dirs.extract, base.extract),
            validated: dir(&cfg.dirs.validated, base.validated),
            solution: dir(&cfg.dirs.solution, base.solution),
        };
        let ignore = if cfg.extract.ignore.is_empty() { default_ignore() } else { cfg.extract.ignore.clone() };
        let extract = ExtractSettings::new(cfg.extract.flatten_depth.unwrap_or(1), &ignore)?;
        let ant = AntSettings::default();
        let ant = AntSettings {
            binary: cfg.ant.binary.clone().unwrap_or(ant.binary),
            context: if cfg.ant.context.is_empty() { ant.context } else { cfg.ant.context.clone() },
            tasks: if cfg.ant.tasks.is_empty() { ant.tasks } else { cfg.ant.tasks.clone() },
        };
        Ok(Self {
            files,
            layout,
            xmllint: cfg.xmllint.binary.clone().unwrap_or_else(|| "xmllint".into()),
            dtd_cross_check: cfg.xmllint.dtd_cross_check.unwrap_or(true),
            extract,
            ant,
            color: cfg.report.color.unwrap_or_else(|| std::io::stdout().is_terminal()),
        })
    }

    /// Defaults rooted at `root`, as if no config file existed.
    pub fn defaults(root: &Path) -> Self {
        Self {
            files: ExerciseFiles::default(),
            layout: Layout::under(root),
            xmllint: "xmllint".into(),
            dtd_cross_check: true,
            extract: ExtractSettings::default(),
            ant: AntSettings::default(),
            color: false,
        }
    }
}

pub fn default_ignore() -> Vec<String> {
    vec![".*".into(), "__MACOSX".into(), "Thumbs.db".into(), "desktop.ini".into()]
}

fn default_ant_tasks() -> Vec<AntTask> {
    let task = |title: &str, target: &str, output: &str| AntTask { title: title.into(), target: target.into(), output: output.into() };
    vec![
        task("Task 1", "run-xslt", "output/area-overview.html"),
        task("Task 2", "run-xquery", "output/xquery-out.xml"),
        task("Task 3", "run-dry", "output/system-out.xml"),
    ]
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, GraderError> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        let glob = Glob::new(p).map_err(|source| GraderError::InvalidPattern { pattern: p.clone(), source })?;
        b.add(glob);
    }
    b.build().map_err(|source| GraderError::InvalidPattern { pattern: patterns.join(","), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn defaults_match_the_exercise_layout() {
        let s = Settings::resolve(Path::new("/work"), &Config::default()).unwrap();
        assert_eq!(s.files.schema, "system.xsd");
        assert_eq!(s.files.dtd_xml, "system-dtd.xml");
        assert_eq!(s.layout.download, Path::new("/work/download"));
        assert_eq!(s.layout.solution, Path::new("/work/solution"));
        assert_eq!(s.xmllint, Path::new("xmllint"));
        assert!(s.dtd_cross_check);
        assert_eq!(s.extract.flatten_depth, 1);
        assert_eq!(s.ant.tasks.len(), 3);
        assert_eq!(s.ant.tasks[1].target, "run-xquery");
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let mut base: Config = toml::from_str(
            r#"
            [files]
            schema = "library.xsd"
            dtd = "library.dtd"
            [xmllint]
            dtd_cross_check = false
            "#,
        ).unwrap();
        let patch: Config = toml::from_str(
            r#"
            [files]
            dtd = "books.dtd"
            [extract]
            flatten_depth = 3
            "#,
        ).unwrap();
        merge(&mut base, &patch);
        let s = Settings::resolve(Path::new("."), &base).unwrap();
        assert_eq!(s.files.schema, "library.xsd");
        assert_eq!(s.files.dtd, "books.dtd");
        assert_eq!(s.files.schema_xml, "system-xsd.xml");
        assert!(!s.dtd_cross_check);
        assert_eq!(s.extract.flatten_depth, 3);
    }

    #[test]
    fn workspace_file_and_runtime_overlay_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WORKSPACE_CONFIG), "[files]\nschema_xml = \"lib-xsd.xml\"\n[dirs]\nextract = \"extracted\"\n").unwrap();
        let mut cm = ConfigManager::load(dir.path(), None).unwrap();
        let mut cli = Config::default();
        cli.xmllint.binary = Some("/opt/bin/xmllint".into());
        cm.apply_runtime_overlay(&cli);
        let s = cm.settings().unwrap();
        assert_eq!(s.files.schema_xml, "lib-xsd.xml");
        assert_eq!(s.layout.extract, dir.path().join("extracted"));
        assert_eq!(s.xmllint, Path::new("/opt/bin/xmllint"));
    }

    #[test]
    fn broken_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.toml");
        fs::write(&path, "[files\nschema = ").unwrap();
        let err = ConfigManager::load(dir.path(), Some(&path)).unwrap_err();
        assert!(matches!(err.downcast_ref::<GraderError>(), Some(GraderError::ConfigParse { .. })));
    }

    #[test]
    fn ignore_patterns_hide_bookkeeping_files() {
        let s = ExtractSettings::default();
        assert!(s.is_ignored(OsStr::new(".DS_Store")));
        assert!(s.is_ignored(OsStr::new("__MACOSX")));
        assert!(!s.is_ignored(OsStr::new("submission.zip")));
    }

    #[test]
    fn directories_print_with_a_trailing_separator() {
        let layout = Layout::under(Path::new("."));
        assert_eq!(dir_display(&layout.download), "./download/");
        assert_eq!(dir_display(Path::new("extract/")), "extract/");
    }

    #[test]
    fn unflattened_keeps_ignore_rules() {
        let s = ExtractSettings::default().unflattened();
        assert_eq!(s.flatten_depth, 0);
        assert!(s.is_ignored(OsStr::new("__MACOSX")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = ExtractSettings::new(1, &["[".into()]).unwrap_err();
        assert!(matches!(err, GraderError::InvalidPattern { .. }));
    }
}
