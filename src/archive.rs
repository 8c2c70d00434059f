//! Zip archive access: listing, reading, extraction, writing and re-rooting.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::util::strip_dir;

/// A zip archive opened for reading.
pub struct SourceArchive<R: Read + Seek = BufReader<File>> {
    archive: ZipArchive<R>,
    label: String,
}

impl SourceArchive {
    /// Open an archive on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read + Seek> SourceArchive<R> {
    /// Read an archive from any seekable source. `label` names it in errors.
    pub fn from_reader(reader: R, label: impl Into<String>) -> Result<Self> {
        Ok(Self {
            archive: ZipArchive::new(reader)?,
            label: label.into(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Paths of all file entries, in archive order.
    pub fn names(&self) -> Vec<String> {
        self.archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect()
    }

    /// Bytes of one entry.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(contents)
    }

    /// The single top-level directory every entry lives under.
    pub fn top_level_dir(&self) -> Option<String> {
        top_level_dir(self.archive.file_names())
    }

    /// Every file below `dir`, keyed by its path relative to `dir`.
    ///
    /// Only entries accepted by `load` have their bytes read; the others map
    /// to an empty buffer so that their presence is still known.
    pub fn read_dir(
        &mut self,
        dir: &str,
        load: impl Fn(&str) -> bool,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut files = BTreeMap::new();
        for name in self.names() {
            let Some(relative) = strip_dir(&name, dir) else {
                continue;
            };
            let data = if load(relative) { self.read(&name)? } else { Vec::new() };
            files.insert(relative.to_string(), data);
        }
        Ok(files)
    }

    /// Unpack the whole archive below `dest`.
    pub fn extract(&mut self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        debug!("extracting {} into {}", self.label, dest.display());
        self.archive.extract(dest)?;
        Ok(())
    }

    /// Copy every entry into `writer`, replacing the top-level directory with
    /// `root`.
    ///
    /// Fails with [`Error::InvalidArchive`] when the entries do not share a
    /// single top-level directory.
    pub fn reroot<W: Write + Seek>(&mut self, root: &str, writer: W) -> Result<W> {
        let old_root = self.top_level_dir().ok_or_else(|| {
            Error::InvalidArchive(format!("{} has no single top-level directory", self.label))
        })?;
        let mut zip = ZipWriter::new(writer);
        let options = deflated();

        for i in 0..self.archive.len() {
            let mut entry = self.archive.by_index(i)?;
            let name = entry.name().to_string();
            let rest = strip_dir(&name, &old_root).unwrap_or("");
            let renamed = if rest.is_empty() {
                format!("{root}/")
            } else {
                format!("{root}/{rest}")
            };

            if entry.is_dir() {
                zip.add_directory(renamed, options)?;
            } else {
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents)?;
                zip.start_file(renamed, options)?;
                zip.write_all(&contents)?;
            }
        }

        Ok(zip.finish()?)
    }
}

/// The first path segment shared by all `names`, if there is exactly one.
pub fn top_level_dir<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut root: Option<&str> = None;
    for name in names {
        let (first, _) = name.split_once('/')?;
        match root {
            None => root = Some(first),
            Some(r) if r == first => {}
            Some(_) => return None,
        }
    }
    root.map(str::to_string)
}

/// Whether a path segment names a prep bucket (`NN-...`).
pub fn is_bucket(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() > 3 && bytes[0].is_ascii_digit() && bytes[1].is_ascii_digit() && bytes[2] == b'-'
}

/// Path of a prep archive entry relative to the prep root.
///
/// Entries may sit directly at bucket level or under one root directory
/// (normally `en-US`); both resolve to `<bucket>/...`. Directory entries and
/// top-level files yield `None`.
pub fn prep_relative(name: &str) -> Option<&str> {
    if name.ends_with('/') {
        return None;
    }
    let (first, rest) = name.split_once('/')?;
    if is_bucket(first) {
        Some(name)
    } else {
        Some(rest)
    }
}

/// Write everything below `dir` into a new archive at `dest`.
///
/// Entry names are relative to `dir` and written in sorted order.
pub fn write_dir(dir: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options = deflated();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name.is_empty() {
            continue;
        }

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            std::io::copy(&mut source, &mut zip)?;
        }
    }

    zip.finish()?;
    debug!("wrote {}", dest.display());
    Ok(())
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}
