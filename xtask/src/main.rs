use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{fs, io, path::{Path, PathBuf}};
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, ZipWriter};

#[derive(Parser)]
#[command(name = "xtask", about = "xml-grader workspace tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Zip a folder into a submission archive for trying out the grader
    Pack {
        dir: PathBuf,
        /// Target archive (default: download/<folder name>.zip)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Put the files under a top-level folder, like students often do
        #[arg(long)]
        wrap: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Pack { dir, out, wrap } => {
            let name = dir.file_name().context("folder has no name")?.to_string_lossy().into_owned();
            let out = out.unwrap_or_else(|| PathBuf::from("download").join(format!("{name}.zip")));
            let count = pack(&dir, &out, wrap.then_some(name.as_str()))?;
            println!("packed {count} files into {}", out.display());
            Ok(())
        }
    }
}

fn pack(dir: &Path, out: &Path, wrap: Option<&str>) -> Result<usize> {
    if !dir.is_dir() {
        bail!("{} is not a folder", dir.display());
    }
    if let Some(parent) = out.parent() { fs::create_dir_all(parent)?; }
    let file = fs::File::create(out).with_context(|| format!("create {}", out.display()))?;
    let mut zip = ZipWriter::new(file);
    let opts = SimpleFileOptions::default();
    let mut count = 0;
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(dir)?;
        let mut name = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
        if let Some(top) = wrap { name = format!("{top}/{name}"); }
        if entry.file_type().is_dir() {
            zip.add_directory(name, opts)?;
        } else {
            zip.start_file(name, opts)?;
            io::copy(&mut fs::File::open(entry.path())?, &mut zip)?;
            count += 1;
        }
    }
    zip.finish()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_nests_entries_under_one_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("hand-in");
        fs::create_dir_all(src.join("extra")).unwrap();
        fs::write(src.join("system.xsd"), "<xs:schema/>").unwrap();
        fs::write(src.join("extra/notes.txt"), "hi").unwrap();
        let out = tmp.path().join("download/hand-in.zip");

        assert_eq!(pack(&src, &out, Some("hand-in")).unwrap(), 2);
        let archive = zip::ZipArchive::new(fs::File::open(&out).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, ["hand-in/extra/", "hand-in/extra/notes.txt", "hand-in/system.xsd"]);
    }
}
