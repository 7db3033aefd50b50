// xml-grader/src/extract.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::{fs, io::{self, Write}, path::{Path, PathBuf}};
use walkdir::WalkDir;

use crate::{config::{ExtractSettings, Layout}, error::GraderError, report::Report};

/// What one extraction run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub archive: PathBuf,
    pub unpacked: bool,
    pub flattened: usize,
    pub record: Option<PathBuf>,
}

/// Returns the single submission in `dir`, ignoring OS bookkeeping files.
pub fn locate_single_archive(dir: &Path, settings: &ExtractSettings) -> Result<PathBuf, GraderError> {
    let mut files = vec![];
    match fs::read_dir(dir) {
        Ok(rd) => {
            for e in rd.flatten() {
                let path = e.path();
                if !path.is_file() || settings.is_ignored(&e.file_name()) { continue; }
                files.push(path);
            }
        }
        Err(err) => tracing::warn!(dir = %dir.display(), %err, "cannot list download directory"),
    }
    match files.len() {
        0 => Err(GraderError::NoInputFile { dir: dir.to_path_buf() }),
        1 => Ok(files.remove(0)),
        found => Err(GraderError::AmbiguousInput { dir: dir.to_path_buf(), found }),
    }
}

/// Removes everything inside `dir`. Failures are reported and skipped.
/// Returns the number of entries that could not be removed.
pub fn clean_directory<W: Write>(dir: &Path, report: &mut Report<W>) -> usize {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) => {
            report.exception("Cannot delete files in extract folder", Some(&err));
            return 1;
        }
    };
    let mut failed = 0;
    for e in rd.flatten() {
        let path = e.path();
        let res = match e.file_type() {
            Ok(ft) if ft.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        if let Err(err) = res {
            tracing::warn!(path = %path.display(), %err, "cleanup failed");
            report.exception("Cannot delete files in extract folder", Some(&err));
            failed += 1;
        }
    }
    failed
}

fn unzip(archive: &Path, dir: &Path) -> Result<()> {
    let file = fs::File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("read zip directory")?;
    zip.extract(dir).with_context(|| format!("extract into {}", dir.display()))?;
    Ok(())
}

/// Unpacks `archive` into `dir`. A corrupt or unsupported archive is reported,
/// never raised; whatever was written before the failure stays.
pub fn expand_archive<W: Write>(archive: &Path, dir: &Path, report: &mut Report<W>) -> bool {
    match unzip(archive, dir) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(archive = %archive.display(), "unzip failed: {err:#}");
            report.exception("Cannot unzip file", Some(&format_args!("{err:#}")));
            false
        }
    }
}

/// Moves files nested up to `depth` folders deep to the root of `dir` and
/// drops folders left without files. Returns the number of files moved.
pub fn flatten<W: Write>(dir: &Path, settings: &ExtractSettings, report: &mut Report<W>) -> usize {
    if settings.flatten_depth == 0 { return 0; }
    let Ok(rd) = fs::read_dir(dir) else { return 0 };
    let folders: Vec<PathBuf> = rd.flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.path())
        .collect();

    let mut moved = 0;
    for folder in folders {
        if folder.file_name().is_some_and(|n| settings.is_ignored(n)) {
            if let Err(err) = fs::remove_dir_all(&folder) {
                tracing::warn!(folder = %folder.display(), %err, "cannot drop ignored folder");
            }
            continue;
        }
        let nested: Vec<PathBuf> = WalkDir::new(&folder)
            .min_depth(1)
            .max_depth(settings.flatten_depth)
            .into_iter()
            .filter_entry(|e| !settings.is_ignored(e.file_name()))
            .filter_map(|e| e.map_err(|err| tracing::warn!(%err, "walk failed")).ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        for file in nested {
            let Some(name) = file.file_name() else { continue };
            let target = dir.join(name);
            if target.exists() {
                report.failure(format_args!("{} exists twice in the submission, keeping the nested copy", name.to_string_lossy()));
            }
            match move_file(&file, &target) {
                Ok(()) => moved += 1,
                Err(err) => report.exception(format_args!("Cannot move {}", file.display()), Some(&format_args!("{err:#}"))),
            }
        }

        if is_hollow(&folder, settings) {
            if let Err(err) = fs::remove_dir_all(&folder) {
                report.exception(format_args!("Cannot remove folder {}", folder.display()), Some(&err));
            }
        } else {
            tracing::info!(folder = %folder.display(), depth = settings.flatten_depth, "folder nested deeper than flatten depth left in place");
        }
    }
    moved
}

/// True when `dir` holds nothing but folders and ignored entries.
fn is_hollow(dir: &Path, settings: &ExtractSettings) -> bool {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !settings.is_ignored(e.file_name()))
        .all(|e| e.is_ok_and(|e| e.file_type().is_dir()))
}

/// `YYYYMMDDHHMM-<lowercased name without .zip>.zip`
pub fn validated_name(archive: &Path, now: DateTime<Utc>) -> String {
    let base = archive.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    let base = base.strip_suffix(".zip").unwrap_or(&base);
    format!("{}-{}.zip", now.format("%Y%m%d%H%M"), base)
}

/// Moves `archive` into `validated` under its timestamped name. An existing
/// record is never replaced; a numeric suffix is added instead.
pub fn archive_original(archive: &Path, validated: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    let name = validated_name(archive, now);
    let mut target = validated.join(&name);
    let stem = name.trim_end_matches(".zip");
    let mut n = 1;
    while target.exists() {
        target = validated.join(format!("{stem}-{n}.zip"));
        n += 1;
    }
    move_file(archive, &target)?;
    Ok(target)
}

/// Renames `from` to `to`, copying only across filesystems. A copy whose
/// source cannot be removed is rolled back so the file exists exactly once.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
            if let Err(err) = fs::remove_file(from) {
                if let Err(undo) = fs::remove_file(to) {
                    tracing::warn!(path = %to.display(), %undo, "cannot roll back copy");
                }
                return Err(err).with_context(|| format!("remove {}", from.display()));
            }
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("move {} to {}", from.display(), to.display())),
    }
}

/// Locates the submission, refills the extraction directory from it and
/// files the original under `validated`. Only a missing or ambiguous
/// submission is an error; it is raised before anything is touched.
/// `clock` is read once, when the original is filed.
pub fn extract_submission<W: Write>(
    layout: &Layout,
    settings: &ExtractSettings,
    clock: impl Fn() -> DateTime<Utc>,
    report: &mut Report<W>,
) -> Result<Extraction, GraderError> {
    let archive = locate_single_archive(&layout.download, settings)?;
    tracing::info!(archive = %archive.display(), "extracting submission");

    report.step("Delete previous files");
    clean_directory(&layout.extract, report);

    report.step("unzip file");
    let unpacked = expand_archive(&archive, &layout.extract, report);
    let flattened = flatten(&layout.extract, settings, report);

    let record = match archive_original(&archive, &layout.validated, clock()) {
        Ok(p) => Some(p),
        Err(err) => {
            report.exception("Cannot move submission to validated folder", Some(&format_args!("{err:#}")));
            None
        }
    };
    Ok(Extraction { archive, unpacked, flattened, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quiet() -> Report<Vec<u8>> { Report::new(Vec::new(), false) }

    #[test]
    fn validated_name_is_timestamped_and_lowercased() {
        let now = Utc.with_ymd_and_hms(2018, 10, 7, 9, 5, 59).unwrap();
        assert_eq!(validated_name(Path::new("download/Max_Muster.ZIP"), now), "201810070905-max_muster.zip");
        assert_eq!(validated_name(Path::new("hand-in.tar.gz"), now), "201810070905-hand-in.tar.gz.zip");
    }

    #[test]
    fn locate_skips_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        fs::create_dir(dir.path().join("stray-folder")).unwrap();
        assert!(matches!(
            locate_single_archive(dir.path(), &ExtractSettings::default()),
            Err(GraderError::NoInputFile { .. })
        ));

        fs::write(dir.path().join("a.zip"), b"").unwrap();
        assert_eq!(locate_single_archive(dir.path(), &ExtractSettings::default()).unwrap(), dir.path().join("a.zip"));

        fs::write(dir.path().join("b.zip"), b"").unwrap();
        assert!(matches!(
            locate_single_archive(dir.path(), &ExtractSettings::default()),
            Err(GraderError::AmbiguousInput { found: 2, .. })
        ));
    }

    #[test]
    fn clean_directory_removes_files_and_trees() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.xml"), b"<a/>").unwrap();
        fs::create_dir_all(dir.path().join("x/y")).unwrap();
        fs::write(dir.path().join("x/y/z.xml"), b"<z/>").unwrap();
        assert_eq!(clean_directory(dir.path(), &mut quiet()), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_archive_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();
        let mut r = quiet();
        assert!(!expand_archive(&archive, dir.path(), &mut r));
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert!(out.starts_with("Error at Cannot unzip file\n"));
    }

    #[test]
    fn flatten_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("outer/inner")).unwrap();
        fs::write(root.join("top.xml"), b"").unwrap();
        fs::write(root.join("outer/a.xml"), b"").unwrap();
        fs::write(root.join("outer/.DS_Store"), b"").unwrap();
        fs::write(root.join("outer/inner/b.xml"), b"").unwrap();

        let one = ExtractSettings::new(1, &crate::config::default_ignore()).unwrap();
        assert_eq!(flatten(root, &one, &mut quiet()), 1);
        assert!(root.join("a.xml").is_file());
        assert!(root.join("top.xml").is_file());
        assert!(root.join("outer/inner/b.xml").is_file(), "deeper file stays at depth 1");

        let deep = ExtractSettings::new(usize::MAX, &crate::config::default_ignore()).unwrap();
        assert_eq!(flatten(root, &deep, &mut quiet()), 1);
        assert!(root.join("b.xml").is_file());
        assert!(!root.join("outer").exists());
    }

    #[test]
    fn flatten_drops_macos_metadata_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("__MACOSX/sub")).unwrap();
        fs::write(root.join("__MACOSX/sub/._system.xsd"), b"").unwrap();
        fs::write(root.join("system.xsd"), b"<xs:schema/>").unwrap();
        assert_eq!(flatten(root, &ExtractSettings::default(), &mut quiet()), 0);
        assert!(!root.join("__MACOSX").exists());
        assert!(root.join("system.xsd").is_file());
    }

    #[test]
    fn flatten_disabled_at_depth_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.xml"), b"").unwrap();
        let off = ExtractSettings::new(0, &[]).unwrap();
        assert_eq!(flatten(dir.path(), &off, &mut quiet()), 0);
        assert!(dir.path().join("sub/a.xml").is_file());
    }

    #[test]
    fn failed_move_keeps_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("Submit.zip");
        fs::write(&from, b"1").unwrap();
        let to = dir.path().join("missing/Submit.zip");
        let err = move_file(&from, &to).unwrap_err();
        assert!(format!("{err:#}").starts_with("move "));
        assert!(from.is_file());
        assert!(!to.exists());
    }

    #[test]
    fn timestamp_is_taken_when_the_original_is_filed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::under(dir.path());
        for d in layout.all() { fs::create_dir_all(d).unwrap(); }
        let mut w = zip::ZipWriter::new(fs::File::create(layout.download.join("Hand-In.zip")).unwrap());
        w.start_file("system.xsd", zip::write::SimpleFileOptions::default()).unwrap();
        w.write_all(b"<xs:schema/>").unwrap();
        w.finish().unwrap();

        let reads = std::cell::Cell::new(0);
        let unpacked_first = std::cell::Cell::new(false);
        let clock = || {
            reads.set(reads.get() + 1);
            unpacked_first.set(layout.extract.join("system.xsd").is_file());
            Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 0).unwrap()
        };
        let x = extract_submission(&layout, &ExtractSettings::default(), clock, &mut quiet()).unwrap();
        assert_eq!(reads.get(), 1);
        assert!(unpacked_first.get());
        assert_eq!(x.record, Some(layout.validated.join("201901020304-hand-in.zip")));

        let never = || -> DateTime<Utc> { panic!("clock read without a submission") };
        assert!(extract_submission(&layout, &ExtractSettings::default(), never, &mut quiet()).is_err());
    }

    #[test]
    fn archive_original_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let validated = dir.path().join("validated");
        fs::create_dir(&validated).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        let first = dir.path().join("Submit.zip");
        fs::write(&first, b"1").unwrap();
        let a = archive_original(&first, &validated, now).unwrap();
        assert_eq!(a, validated.join("202403011230-submit.zip"));
        assert!(!first.exists());

        fs::write(&first, b"2").unwrap();
        let b = archive_original(&first, &validated, now).unwrap();
        assert_eq!(b, validated.join("202403011230-submit-1.zip"));
        assert_eq!(fs::read(a).unwrap(), b"1");
    }
}
