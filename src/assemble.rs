//! Unpacking, moving and repacking guide archives.
//!
//! Each run works in scratch directories below the work directory named after
//! the archives involved. They are created exclusively, so a leftover from an
//! earlier failed run must be removed before retrying.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::archive::{SourceArchive, prep_relative, write_dir};
use crate::book::{BASE_LOCALE, BookMetadata, known_locales};
use crate::docbook::GuideSource;
use crate::error::{Error, Result};
use crate::mapping::BookPlan;
use crate::reconcile::reconcile;
use crate::repair::{XmlRepair, default_repair};
use crate::util::parent_dir;

/// Summary of one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The archive that was written.
    pub archive: PathBuf,
    pub course: String,
    pub locale: String,
    /// Number of documents moved into place.
    pub moved: usize,
    /// Original paths of documents with no prep file.
    pub missing: Vec<String>,
    /// Prep files no document claimed.
    pub unmatched: Vec<String>,
}

/// Converts guide archives between source and prep form.
pub struct Assembler {
    work_dir: PathBuf,
    output_dir: PathBuf,
    remove_inputs: bool,
    repair: Box<dyn XmlRepair>,
}

impl Assembler {
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            remove_inputs: false,
            repair: default_repair(),
        }
    }

    /// Delete the consumed archives after a successful run.
    pub fn remove_inputs(mut self, remove: bool) -> Self {
        self.remove_inputs = remove;
        self
    }

    pub fn with_repair(mut self, repair: Box<dyn XmlRepair>) -> Self {
        self.repair = repair;
        self
    }

    /// Flatten a source archive into a prep archive.
    ///
    /// Writes `<course>-<serial>.zip` to the output directory with every
    /// content document under `en-US/<bucket>/...`.
    pub fn unsource(&self, source_zip: &Path) -> Result<RunReport> {
        let mut source = SourceArchive::open(source_zip)?;
        let meta = BookMetadata::from_archive(&mut source)?;
        let course = meta.course()?.to_string();
        let guide = GuideSource::load(&mut source, &course)?;
        let plan = BookPlan::from_tree(&guide.walk());

        let source_dir = self.scratch_dir(source_zip, "")?;
        source.extract(&source_dir)?;
        let prep_dir = self.scratch_dir(source_zip, "-prep")?;
        let prep_root = prep_dir.join(BASE_LOCALE);

        let guide_dir = fs_path(&source_dir, guide.dir());
        for file in plan.files() {
            move_file(
                &fs_path(&guide_dir, &file.original),
                &fs_path(&prep_root, &file.flattened_path()),
            )?;
        }

        let archive = self
            .output_dir
            .join(format!("{course}-{}.zip", meta.serial_number));
        write_dir(&prep_dir, &archive)?;

        fs::remove_dir_all(&source_dir)?;
        fs::remove_dir_all(&prep_dir)?;
        self.consume(source_zip)?;

        info!("unsourced {} documents of {course} into {}", plan.len(), archive.display());
        Ok(RunReport {
            archive,
            course,
            locale: BASE_LOCALE.to_string(),
            moved: plan.len(),
            missing: Vec::new(),
            unmatched: Vec::new(),
        })
    }

    /// Restore a translated prep archive onto its source archive.
    ///
    /// Every matched prep file replaces its original document. Locale
    /// directories other than the base one are dropped and the base one is
    /// renamed to the target locale. Writes `<course>-<serial>_<locale>.zip`
    /// rooted like the source archive.
    pub fn resource(&self, source_zip: &Path, target_zip: &Path) -> Result<RunReport> {
        let mut target = SourceArchive::open(target_zip)?;
        let meta = BookMetadata::from_archive(&mut target)?;
        let course = meta.course()?.to_string();
        let locale = meta.locale;

        let mut source = SourceArchive::open(source_zip)?;
        let guide = GuideSource::load(&mut source, &course)?;
        let plan = BookPlan::from_tree(&guide.walk());

        let entries: Vec<(String, String)> = target
            .names()
            .into_iter()
            .filter_map(|name| prep_relative(&name).map(|rel| (rel.to_string(), name.clone())))
            .collect();
        let actual: Vec<String> = entries.iter().map(|(rel, _)| rel.clone()).collect();
        let result = reconcile(&plan, &actual);

        let source_dir = self.scratch_dir(source_zip, "")?;
        source.extract(&source_dir)?;
        let target_dir = self.scratch_dir(target_zip, "")?;
        target.extract(&target_dir)?;
        self.repair.repair_tree(&target_dir)?;

        let guide_dir = fs_path(&source_dir, guide.dir());
        for m in &result.matches {
            let Some((_, entry)) = entries.iter().find(|(rel, _)| *rel == m.actual) else {
                continue;
            };
            move_file(&fs_path(&target_dir, entry), &fs_path(&guide_dir, &m.file.original))?;
        }
        fs::remove_dir_all(&target_dir)?;

        let guides_dir = fs_path(&source_dir, parent_dir(guide.dir()));
        retarget_locale(&guides_dir, locale)?;

        let archive = self
            .output_dir
            .join(format!("{course}-{}_{locale}.zip", meta.serial_number));
        write_dir(&source_dir, &archive)?;

        fs::remove_dir_all(&source_dir)?;
        self.consume(source_zip)?;
        self.consume(target_zip)?;

        info!(
            "resourced {} documents of {course} ({locale}) into {}",
            result.matches.len(),
            archive.display()
        );
        Ok(RunReport {
            archive,
            course,
            locale: locale.to_string(),
            moved: result.matches.len(),
            missing: result.missing.iter().map(|f| f.original.clone()).collect(),
            unmatched: result.unmatched,
        })
    }

    /// Create a fresh scratch directory named after `archive`.
    fn scratch_dir(&self, archive: &Path, suffix: &str) -> Result<PathBuf> {
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidArchive(archive.display().to_string()))?;
        let dir = self.work_dir.join(format!("{stem}{suffix}"));
        fs::create_dir(&dir)?;
        debug!("mkdir {}", dir.display());
        Ok(dir)
    }

    fn consume(&self, archive: &Path) -> Result<()> {
        if self.remove_inputs {
            debug!("rm {}", archive.display());
            fs::remove_file(archive)?;
        }
        Ok(())
    }
}

/// Drop every other known locale directory at any depth below `guides_dir`
/// and rename the base locale directory to `locale`.
fn retarget_locale(guides_dir: &Path, locale: &str) -> Result<()> {
    let mut stale = Vec::new();
    let mut walker = WalkDir::new(guides_dir).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name != BASE_LOCALE && known_locales().any(|l| l == name) {
            stale.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    for dir in stale {
        debug!("rm -r {}", dir.display());
        fs::remove_dir_all(&dir)?;
    }

    if locale != BASE_LOCALE {
        move_file(&guides_dir.join(BASE_LOCALE), &guides_dir.join(locale))?;
    }
    Ok(())
}

/// Rename `from` to `to`, creating the destination's parent on demand.
///
/// A rename that still fails once the parent exists is an error.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    debug!("mv {} {}", from.display(), to.display());
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to).map_err(|source| Error::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Filesystem location of a `/`-separated archive path below `base`.
fn fs_path(base: &Path, archive_path: &str) -> PathBuf {
    archive_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.xml");
        fs::write(&from, "<a/>").unwrap();

        let to = dir.path().join("en-US/01-ch01/topics/01-a.xml");
        move_file(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "<a/>");
        assert!(!from.exists());
    }

    #[test]
    fn test_move_file_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_file(&dir.path().join("nope.xml"), &dir.path().join("x/y.xml")).unwrap_err();
        assert!(matches!(err, Error::Move { .. }));
    }

    #[test]
    fn test_retarget_locale() {
        let dir = tempfile::tempdir().unwrap();
        let guides = dir.path();
        for sub in ["en-US", "de-DE", "ja-JP", "images"] {
            fs::create_dir(guides.join(sub)).unwrap();
        }
        fs::write(guides.join("en-US/Book_Info.xml"), "<bookinfo/>").unwrap();

        retarget_locale(guides, "fr-FR").unwrap();

        assert!(guides.join("fr-FR/Book_Info.xml").exists());
        assert!(!guides.join("en-US").exists());
        assert!(!guides.join("de-DE").exists());
        assert!(!guides.join("ja-JP").exists());
        assert!(guides.join("images").exists());
    }

    #[test]
    fn test_retarget_locale_removes_nested_locales() {
        let dir = tempfile::tempdir().unwrap();
        let guides = dir.path();
        fs::create_dir_all(guides.join("en-US/images/ja-JP")).unwrap();
        fs::create_dir_all(guides.join("en-US/images/ko-KR/nested")).unwrap();
        fs::write(guides.join("en-US/images/logo.svg"), "<svg/>").unwrap();

        retarget_locale(guides, "de-DE").unwrap();

        assert!(guides.join("de-DE/images/logo.svg").exists());
        assert!(!guides.join("de-DE/images/ja-JP").exists());
        assert!(!guides.join("de-DE/images/ko-KR").exists());
    }

    #[test]
    fn test_retarget_base_locale_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("en-US")).unwrap();
        retarget_locale(dir.path(), "en-US").unwrap();
        assert!(dir.path().join("en-US").exists());
    }

    #[test]
    fn test_scratch_dir_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = Assembler::new(dir.path(), dir.path());
        let archive = dir.path().join("RH124-v7.2.zip");

        let scratch = assembler.scratch_dir(&archive, "").unwrap();
        assert_eq!(scratch.file_name().unwrap(), "RH124-v7.2");
        assert!(assembler.scratch_dir(&archive, "").is_err());
    }

    #[test]
    fn test_fs_path() {
        let base = Path::new("/tmp/x");
        assert_eq!(fs_path(base, "a/b/c.xml"), base.join("a").join("b").join("c.xml"));
        assert_eq!(fs_path(base, ""), base.to_path_buf());
    }
}
