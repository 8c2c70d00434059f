//! Table-of-contents traversal.
//!
//! A guide is a tree of XML documents linked by `href` attributes on the
//! children of each document's root element. The walker turns that tree into
//! the ordered lists the path mapper numbers: front matter, chapters with their
//! sections, and appendices with theirs.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::debug;

use super::parser::child_hrefs;
use crate::util::{decode_xml, escapes_root, parent_dir, resolve_href};

/// Path fragment that marks chapter (and appendix) documents.
pub const CHAPTERS_MARKER: &str = "sg-chapters";

/// Path fragment that marks appendix documents.
pub const APPENDIX_MARKER: &str = "appendix";

/// Read access to the documents of one guide, keyed by path relative to the
/// guide root.
pub trait DocumentSource {
    /// Whether a file exists at `path`.
    fn contains(&self, path: &str) -> bool;

    /// Raw bytes of the file at `path`, if it exists.
    fn read(&self, path: &str) -> Option<Cow<'_, [u8]>>;
}

impl DocumentSource for BTreeMap<String, Vec<u8>> {
    fn contains(&self, path: &str) -> bool {
        self.contains_key(path)
    }

    fn read(&self, path: &str) -> Option<Cow<'_, [u8]>> {
        self.get(path).map(|data| Cow::Borrowed(data.as_slice()))
    }
}

/// Role of a document reached from the table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    FrontMatter,
    Chapter,
    Appendix,
}

impl Role {
    /// Classify a top-level document by its path. Anything outside the
    /// chapters directory is front matter.
    pub fn of(path: &str) -> Self {
        if !path.contains(CHAPTERS_MARKER) {
            Role::FrontMatter
        } else if path.contains(APPENDIX_MARKER) {
            Role::Appendix
        } else {
            Role::Chapter
        }
    }
}

/// A chapter or appendix document with the sections it pulls in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    /// The chapter's own document.
    pub path: String,
    /// Sections and nested fragments in reading order.
    pub sections: Vec<String>,
}

/// Every content document of a guide, classified and in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookTree {
    pub front_matter: Vec<String>,
    pub chapters: Vec<Part>,
    pub appendices: Vec<Part>,
}

impl BookTree {
    /// Total number of documents in the tree.
    pub fn len(&self) -> usize {
        let parts = |ps: &[Part]| ps.iter().map(|p| 1 + p.sections.len()).sum::<usize>();
        self.front_matter.len()
            + parts(self.chapters.as_slice())
            + parts(self.appendices.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How child hrefs are resolved.
#[derive(Debug, Clone, Copy)]
enum Base<'b> {
    /// Against one fixed directory, whatever document they appear in.
    Fixed(&'b str),
    /// Against the directory of the referencing document.
    Parent,
}

/// Walks a guide's document tree.
pub struct TreeWalker<'a, S: DocumentSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: DocumentSource + ?Sized> TreeWalker<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Walk the whole guide starting at its table of contents.
    ///
    /// Top-level references resolve against the table of contents' directory.
    /// Chapter and appendix documents are not expanded at that level; their
    /// sections (and the fragments those include, at any depth) resolve
    /// against the directory of the document that references them.
    ///
    /// A document reached twice is only listed the first time.
    pub fn walk(&self, toc: &str) -> BookTree {
        let toc_dir = parent_dir(toc);
        let top = self.expand(toc, Base::Fixed(toc_dir), |path| {
            Role::of(path) == Role::FrontMatter
        });

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(toc.to_string());
        let mut tree = BookTree::default();

        for path in top {
            if !seen.insert(path.clone()) {
                continue;
            }
            match Role::of(&path) {
                Role::FrontMatter => tree.front_matter.push(path),
                Role::Chapter => tree.chapters.push(self.part(path, &mut seen)),
                Role::Appendix => tree.appendices.push(self.part(path, &mut seen)),
            }
        }

        debug!(
            "walked {toc}: {} front matter, {} chapters, {} appendices",
            tree.front_matter.len(),
            tree.chapters.len(),
            tree.appendices.len()
        );
        tree
    }

    fn part(&self, path: String, seen: &mut HashSet<String>) -> Part {
        let sections = self
            .expand(&path, Base::Parent, |_| true)
            .into_iter()
            .filter(|section| seen.insert(section.clone()))
            .collect();
        Part { path, sections }
    }

    /// Existing, non-escaping hrefs of the root children of `path`.
    fn children(&self, path: &str, base: Base<'_>) -> Vec<String> {
        let Some(bytes) = self.source.read(path) else {
            return Vec::new();
        };
        let dir = match base {
            Base::Fixed(dir) => dir,
            Base::Parent => parent_dir(path),
        };

        child_hrefs(&decode_xml(&bytes))
            .iter()
            .map(|href| resolve_href(dir, href))
            .filter(|child| {
                let keep = !escapes_root(child) && self.source.contains(child);
                if !keep {
                    debug!("skipping unresolved reference {child} in {path}");
                }
                keep
            })
            .collect()
    }

    /// Pre-order expansion of everything reachable from `root`.
    ///
    /// Runs as a worklist: a document's children are queued ahead of its
    /// remaining siblings, and in the output they are inserted directly after
    /// the document when it is already listed. `descend` decides which
    /// documents are opened; the root always is.
    fn expand(&self, root: &str, base: Base<'_>, descend: impl Fn(&str) -> bool) -> Vec<String> {
        let mut working: Vec<String> = Vec::new();
        let mut listed: HashSet<String> = HashSet::from([root.to_string()]);
        let mut expanded: HashSet<String> = HashSet::new();
        let mut pending: VecDeque<String> = VecDeque::from([root.to_string()]);

        while let Some(file) = pending.pop_front() {
            if !expanded.insert(file.clone()) || (file != root && !descend(&file)) {
                continue;
            }

            let children: Vec<String> = self
                .children(&file, base)
                .into_iter()
                .filter(|child| listed.insert(child.clone()))
                .collect();
            if children.is_empty() {
                continue;
            }

            match working.iter().position(|listed| *listed == file) {
                Some(index) => {
                    working.splice(index + 1..index + 1, children.iter().cloned());
                }
                None => working.extend(children.iter().cloned()),
            }
            for child in children.into_iter().rev() {
                pending.push_front(child);
            }
        }

        working
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(hrefs: &[&str]) -> Vec<u8> {
        let mut xml = String::from("<?xml version=\"1.0\"?>\n<book>\n");
        for href in hrefs {
            xml.push_str(&format!("  <xi:include href=\"{href}\"/>\n"));
        }
        xml.push_str("</book>\n");
        xml.into_bytes()
    }

    fn source(files: &[(&str, &[&str])]) -> BTreeMap<String, Vec<u8>> {
        files
            .iter()
            .map(|(path, hrefs)| (path.to_string(), doc(hrefs)))
            .collect()
    }

    #[test]
    fn test_role_of() {
        assert_eq!(Role::of("Preface.xml"), Role::FrontMatter);
        assert_eq!(Role::of("sg-chapters/ch01.xml"), Role::Chapter);
        assert_eq!(Role::of("sg-chapters/appendix-a.xml"), Role::Appendix);
        assert_eq!(Role::of("Common/appendix-conventions.xml"), Role::FrontMatter);
    }

    #[test]
    fn test_walk_classifies_top_level() {
        let src = source(&[
            (
                "RH124-SG.xml",
                &[
                    "Book_Info.xml",
                    "Preface.xml",
                    "sg-chapters/ch01.xml",
                    "sg-chapters/appendix-a.xml",
                ],
            ),
            ("Book_Info.xml", &[]),
            ("Preface.xml", &[]),
            ("sg-chapters/ch01.xml", &["topics/s1.xml"]),
            ("sg-chapters/topics/s1.xml", &[]),
            ("sg-chapters/appendix-a.xml", &["topics/a1.xml"]),
            ("sg-chapters/topics/a1.xml", &[]),
        ]);

        let tree = TreeWalker::new(&src).walk("RH124-SG.xml");
        assert_eq!(tree.front_matter, vec!["Book_Info.xml", "Preface.xml"]);
        assert_eq!(tree.chapters.len(), 1);
        assert_eq!(tree.chapters[0].path, "sg-chapters/ch01.xml");
        assert_eq!(tree.chapters[0].sections, vec!["sg-chapters/topics/s1.xml"]);
        assert_eq!(tree.appendices[0].sections, vec!["sg-chapters/topics/a1.xml"]);
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn test_missing_href_is_skipped() {
        let src = source(&[
            ("X-SG.xml", &["Book_Info.xml", "Missing.xml", "Preface.xml"]),
            ("Book_Info.xml", &[]),
            ("Preface.xml", &[]),
        ]);

        let tree = TreeWalker::new(&src).walk("X-SG.xml");
        assert_eq!(tree.front_matter, vec!["Book_Info.xml", "Preface.xml"]);
    }

    #[test]
    fn test_front_matter_is_pre_order() {
        let src = source(&[
            ("X-SG.xml", &["a.xml", "b.xml"]),
            ("a.xml", &["a1.xml", "a2.xml"]),
            ("a1.xml", &["a1x.xml"]),
            ("a1x.xml", &[]),
            ("a2.xml", &[]),
            ("b.xml", &[]),
        ]);

        let tree = TreeWalker::new(&src).walk("X-SG.xml");
        assert_eq!(
            tree.front_matter,
            vec!["a.xml", "a1.xml", "a1x.xml", "a2.xml", "b.xml"]
        );
    }

    #[test]
    fn test_fragments_nest_below_sections() {
        let src = source(&[
            ("X-SG.xml", &["sg-chapters/ch01.xml"]),
            ("sg-chapters/ch01.xml", &["topics/s1.xml", "topics/s2.xml"]),
            ("sg-chapters/topics/s1.xml", &["frag/f1.xml", "../../escape.xml"]),
            ("sg-chapters/topics/frag/f1.xml", &["deeper.xml"]),
            ("sg-chapters/topics/frag/deeper.xml", &[]),
            ("sg-chapters/topics/s2.xml", &[]),
            ("escape.xml", &[]),
        ]);

        let tree = TreeWalker::new(&src).walk("X-SG.xml");
        assert_eq!(
            tree.chapters[0].sections,
            vec![
                "sg-chapters/topics/s1.xml",
                "sg-chapters/topics/frag/f1.xml",
                "sg-chapters/topics/frag/deeper.xml",
                "sg-chapters/topics/s2.xml",
            ]
        );
    }

    #[test]
    fn test_duplicates_and_cycles_listed_once() {
        let src = source(&[
            ("X-SG.xml", &["a.xml", "b.xml", "a.xml"]),
            ("a.xml", &["b.xml", "X-SG.xml"]),
            ("b.xml", &["a.xml"]),
        ]);

        let tree = TreeWalker::new(&src).walk("X-SG.xml");
        assert_eq!(tree.front_matter, vec!["a.xml", "b.xml"]);
    }

    #[test]
    fn test_shared_fragment_belongs_to_first_chapter() {
        let src = source(&[
            ("X-SG.xml", &["sg-chapters/ch01.xml", "sg-chapters/ch02.xml"]),
            ("sg-chapters/ch01.xml", &["common.xml"]),
            ("sg-chapters/ch02.xml", &["common.xml", "own.xml"]),
            ("sg-chapters/common.xml", &[]),
            ("sg-chapters/own.xml", &[]),
        ]);

        let tree = TreeWalker::new(&src).walk("X-SG.xml");
        assert_eq!(tree.chapters[0].sections, vec!["sg-chapters/common.xml"]);
        assert_eq!(tree.chapters[1].sections, vec!["sg-chapters/own.xml"]);
    }

    #[test]
    fn test_malformed_chapter_keeps_earlier_sections() {
        let mut src = source(&[
            ("X-SG.xml", &["sg-chapters/ch01.xml"]),
            ("sg-chapters/s1.xml", &[]),
            ("sg-chapters/s2.xml", &[]),
        ]);
        src.insert(
            "sg-chapters/ch01.xml".to_string(),
            concat!(
                r#"<chapter><xi:include href="s1.xml"/><title>&PRODUCT;</title>"#,
                r#"<xi:include href="s2.xml"/><oops"#,
            )
            .as_bytes()
            .to_vec(),
        );

        let tree = TreeWalker::new(&src).walk("X-SG.xml");
        assert_eq!(
            tree.chapters[0].sections,
            vec!["sg-chapters/s1.xml", "sg-chapters/s2.xml"]
        );
    }

    #[test]
    fn test_missing_toc_yields_empty_tree() {
        let src: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        assert!(TreeWalker::new(&src).walk("X-SG.xml").is_empty());
    }
}
