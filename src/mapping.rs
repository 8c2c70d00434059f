//! Flattened path computation.
//!
//! Every content document gets a bucket (its top-level folder in the prep
//! package) and a two-digit ordinal prefixed to its file name, so that sorting
//! the prep package by path reproduces the guide's reading order.
//!
//! Two-digit ordinals allow at most 99 documents per bucket. Larger buckets
//! still map, but their three-digit ordinals no longer sort lexically.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::docbook::{BookTree, Part};
use crate::util::{file_name, file_stem, join, parent_dir, strip_dir};

/// Bucket for everything before the first chapter.
pub const INTRO_BUCKET: &str = "00-introduction";

/// Bucket shared by all appendices.
pub const APPENDIX_BUCKET: &str = "99-appendix";

/// One content document and its place in the prep package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContentFile {
    /// Path relative to the guide root, as authored.
    pub original: String,
    /// Top-level prep folder, e.g. `03-ch03-networking`.
    pub bucket: String,
    /// 1-based position within the bucket.
    pub ordinal: u32,
    /// Directory below the bucket, mirroring the source layout.
    pub subdir: String,
    /// Actual prep path when it differs from the computed one.
    pub override_target: Option<String>,
}

impl ContentFile {
    pub fn new(
        original: impl Into<String>,
        bucket: impl Into<String>,
        ordinal: u32,
        subdir: impl Into<String>,
    ) -> Self {
        Self {
            original: original.into(),
            bucket: bucket.into(),
            ordinal,
            subdir: subdir.into(),
            override_target: None,
        }
    }

    /// The zero-padded ordinal, e.g. `"07"`.
    pub fn ordinal_prefix(&self) -> String {
        format!("{:02}", self.ordinal)
    }

    /// Base name of the original document.
    pub fn original_name(&self) -> &str {
        file_name(&self.original)
    }

    /// `<ordinal>-<original base name>`.
    pub fn flattened_name(&self) -> String {
        format!("{}-{}", self.ordinal_prefix(), self.original_name())
    }

    /// Computed prep path, ignoring any override.
    pub fn expected_path(&self) -> String {
        join(&[&self.bucket, &self.subdir, &self.flattened_name()])
    }

    /// Prep path this document is read from or written to.
    pub fn flattened_path(&self) -> String {
        self.override_target
            .clone()
            .unwrap_or_else(|| self.expected_path())
    }

    /// A copy of this document pinned to another prep path.
    pub fn with_override(&self, target: impl Into<String>) -> Self {
        Self {
            override_target: Some(target.into()),
            ..self.clone()
        }
    }

    pub fn mapping(&self) -> FileMapping {
        FileMapping {
            original: self.original.clone(),
            flattened: self.flattened_path(),
        }
    }
}

/// An (original path, prep path) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileMapping {
    pub original: String,
    pub flattened: String,
}

/// The complete, ordered set of content documents of one guide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPlan {
    files: Vec<ContentFile>,
}

impl BookPlan {
    /// Number the documents of a walked guide.
    ///
    /// - Front matter lands directly in `00-introduction`, numbered in order.
    /// - Chapter `N` gets bucket `NN-<chapter stem>`; the chapter document
    ///   itself takes ordinal `N` and its sections count from 1, keeping their
    ///   directories relative to the chapter's own directory.
    /// - Appendices share `99-appendix`; each appendix document takes its
    ///   appendix index and the sections of all appendices share one counter.
    pub fn from_tree(tree: &BookTree) -> Self {
        let mut files = Vec::with_capacity(tree.len());

        for (i, path) in tree.front_matter.iter().enumerate() {
            files.push(ContentFile::new(path.clone(), INTRO_BUCKET, ordinal(i), ""));
        }

        for (i, chapter) in tree.chapters.iter().enumerate() {
            let index = ordinal(i);
            let bucket = format!("{index:02}-{}", file_stem(&chapter.path));
            files.push(ContentFile::new(chapter.path.clone(), bucket.clone(), index, ""));
            for (j, section) in chapter.sections.iter().enumerate() {
                files.push(section_file(chapter, section, &bucket, ordinal(j)));
            }
        }

        let mut counter = 0;
        for (i, appendix) in tree.appendices.iter().enumerate() {
            files.push(ContentFile::new(appendix.path.clone(), APPENDIX_BUCKET, ordinal(i), ""));
            for section in &appendix.sections {
                counter += 1;
                files.push(section_file(appendix, section, APPENDIX_BUCKET, counter));
            }
        }

        let plan = Self { files };
        for duplicate in plan.duplicate_targets() {
            warn!("more than one document maps to {duplicate}");
        }
        plan
    }

    pub fn files(&self) -> &[ContentFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Mappings in reading order.
    pub fn mappings(&self) -> Vec<FileMapping> {
        self.files.iter().map(ContentFile::mapping).collect()
    }

    /// Document whose computed prep path is `flattened`.
    pub fn by_flattened(&self, flattened: &str) -> Option<&ContentFile> {
        self.files.iter().find(|f| f.expected_path() == flattened)
    }

    /// Document whose original path is `original`.
    pub fn by_original(&self, original: &str) -> Option<&ContentFile> {
        self.files.iter().find(|f| f.original == original)
    }

    /// Prep paths claimed by more than one document.
    fn duplicate_targets(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.files
            .iter()
            .map(ContentFile::expected_path)
            .filter(|path| !seen.insert(path.clone()))
            .collect()
    }
}

fn ordinal(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

fn section_file(part: &Part, section: &str, bucket: &str, ordinal: u32) -> ContentFile {
    let part_dir = parent_dir(&part.path);
    let section_dir = parent_dir(section);
    let subdir = strip_dir(section_dir, part_dir).unwrap_or(section_dir);
    ContentFile::new(section, bucket, ordinal, subdir)
}
