// xml-grader/src/main.rs

use clap::{Parser, ValueEnum};
use std::{path::PathBuf, process::ExitCode};

use xml_grader::{
    ant::Ant,
    app::{self, Mode, RunOptions, Tools},
    Config, ConfigManager, Report, Xmllint,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg { Xmllint, Ant }

#[derive(Parser, Debug)]
#[command(name = "xml-grader", version, about = "Unpack a submission and grade its XML files")]
struct Args {
    /// Extract the archive from the download folder before validating (default: only validate files)
    #[arg(short, long)]
    extract: bool,
    /// Alternative XML Schema file name (default: system.xsd)
    #[arg(short = 's', long)]
    schema: Option<String>,
    /// Alternative XML file name for XSD validation (default: system-xsd.xml)
    #[arg(short = 'S', long)]
    schema_xml: Option<String>,
    /// Alternative DTD file name (default: system.dtd)
    #[arg(short = 'd', long)]
    dtd: Option<String>,
    /// Alternative XML file name for DTD validation (default: system-dtd.xml)
    #[arg(short = 'D', long)]
    dtd_xml: Option<String>,
    /// Name (and path) of the xmllint binary
    #[arg(short = 'x', long)]
    xmllint: Option<PathBuf>,
    /// Grading lineage: xmllint checks or ant targets
    #[arg(long, value_enum, default_value_t = ModeArg::Xmllint)]
    mode: ModeArg,
    /// Name (and path) of the ant binary
    #[arg(long)]
    ant: Option<PathBuf>,
    /// Nesting levels to flatten after unzipping (0 disables)
    #[arg(long)]
    flatten_depth: Option<usize>,
    /// Skip the DTD cross-checks against the solution
    #[arg(long)]
    no_dtd_cross_check: bool,
    /// Folder holding download/, extract/, validated/ and solution/
    #[arg(short = 'C', long, default_value = ".")]
    root: PathBuf,
    /// Extra config file, applied after grader.toml
    #[arg(long)]
    config: Option<PathBuf>,
    /// Plain transcript without colors
    #[arg(long)]
    no_color: bool,
}

impl Args {
    fn overlay(&self) -> Config {
        let mut cfg = Config::default();
        cfg.files.schema = self.schema.clone();
        cfg.files.schema_xml = self.schema_xml.clone();
        cfg.files.dtd = self.dtd.clone();
        cfg.files.dtd_xml = self.dtd_xml.clone();
        cfg.xmllint.binary = self.xmllint.clone();
        if self.no_dtd_cross_check { cfg.xmllint.dtd_cross_check = Some(false); }
        cfg.extract.flatten_depth = self.flatten_depth;
        cfg.ant.binary = self.ant.clone();
        if self.no_color { cfg.report.color = Some(false); }
        cfg
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut cm = ConfigManager::load(&args.root, args.config.as_deref())?;
    cm.apply_runtime_overlay(&args.overlay());
    let settings = cm.settings()?;
    tracing::debug!(layers = ?cm.layers(), ?settings, "configuration resolved");

    let validator = Xmllint::new(&settings.xmllint);
    let build = Ant::new(&settings.ant.binary);
    let opts = RunOptions {
        extract: args.extract,
        mode: match args.mode { ModeArg::Xmllint => Mode::Xmllint, ModeArg::Ant => Mode::Ant },
    };
    let mut report = Report::stdout(settings.color);

    match app::run(&settings, opts, Tools { validator: &validator, build: &build }, chrono::Utc::now, &mut report).await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(err) if app::is_input_error(&err) => Ok(ExitCode::from(2)),
        Err(err) => Err(err),
    }
}
