//! DocBook guide sources: lenient XML scanning and table-of-contents walking.

mod parser;
mod walker;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Read, Seek};

pub use parser::{FlatDocument, child_hrefs, parse_flat_fields};
pub use walker::{
    APPENDIX_MARKER, BookTree, CHAPTERS_MARKER, DocumentSource, Part, Role, TreeWalker,
};

use crate::archive::SourceArchive;
use crate::book::BASE_LOCALE;
use crate::error::{Error, Result};
use crate::util::parent_dir;

/// The base-locale guide directory of a source archive, loaded in memory.
#[derive(Debug, Clone)]
pub struct GuideSource {
    /// Archive path of the guide directory, e.g. `RH124-v9/guides/en-US`.
    dir: String,
    /// Table of contents, relative to `dir`.
    toc: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl GuideSource {
    /// Load the guide of `course` from a source archive.
    ///
    /// The table of contents must exist at `guides/en-US/<course>-SG.xml`
    /// below the archive root. Every file of the guide directory is listed;
    /// only XML documents are read.
    pub fn load<R: Read + Seek>(archive: &mut SourceArchive<R>, course: &str) -> Result<Self> {
        let suffix = format!("guides/{BASE_LOCALE}/{course}-SG.xml");
        let toc_entry = archive
            .names()
            .into_iter()
            .find(|name| *name == suffix || name.ends_with(&format!("/{suffix}")))
            .ok_or_else(|| Error::MissingToc {
                course: course.to_string(),
                archive: archive.label().to_string(),
            })?;

        let dir = parent_dir(&toc_entry).to_string();
        let files = archive.read_dir(&dir, |path| path.ends_with(".xml"))?;
        Ok(Self {
            toc: format!("{course}-SG.xml"),
            dir,
            files,
        })
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Walk the table of contents.
    pub fn walk(&self) -> BookTree {
        TreeWalker::new(self).walk(&self.toc)
    }
}

impl DocumentSource for GuideSource {
    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> Option<Cow<'_, [u8]>> {
        self.files.read(path)
    }
}
