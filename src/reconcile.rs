//! Matching prep files back onto the documents of a guide.
//!
//! Translated prep packages come back with files renamed or dropped. Every
//! expected document is first looked up at its computed prep path; the rest
//! are matched by name within their bucket. Gaps on either side are reported
//! and never fatal.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fuzz::token_set_ratio;
use crate::mapping::{BookPlan, ContentFile, FileMapping};
use crate::util::file_name;

/// How an actual file was paired with its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum MatchKind {
    Exact,
    Fuzzy { score: u8 },
}

/// An actual prep file claimed by an expected document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    /// The document, with its override set to `actual` for fuzzy matches.
    pub file: ContentFile,
    pub actual: String,
    pub kind: MatchKind,
}

/// Outcome of matching one prep package against a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Claimed pairs in plan order.
    pub matches: Vec<Match>,
    /// Expected documents with no actual file.
    pub missing: Vec<ContentFile>,
    /// Actual files no document claimed, sorted.
    pub unmatched: Vec<String>,
}

impl Reconciliation {
    /// Mappings of every matched document, in plan order.
    pub fn mappings(&self) -> Vec<FileMapping> {
        self.matches.iter().map(|m| m.file.mapping()).collect()
    }

    /// Whether every document was found and every file claimed.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unmatched.is_empty()
    }

    pub fn fuzzy_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| matches!(m.kind, MatchKind::Fuzzy { .. }))
            .count()
    }
}

/// Pair the documents of `plan` with the prep paths in `actual`.
///
/// Exact matches are all claimed before any fuzzy match is attempted. A fuzzy
/// candidate must sit in the document's bucket and contain the document's
/// original base name in its path; the candidate whose file name scores best
/// against the expected flattened name wins, the first one on ties. Documents
/// are served in plan order, and a claimed file is never offered again.
pub fn reconcile(plan: &BookPlan, actual: &[String]) -> Reconciliation {
    let mut actual: Vec<&str> = actual.iter().map(String::as_str).collect();
    actual.sort_unstable();
    actual.dedup();

    let present: HashSet<&str> = actual.iter().copied().collect();
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut slots: Vec<Option<Match>> = Vec::with_capacity(plan.len());

    for file in plan.files() {
        let expected = file.expected_path();
        match present.get(expected.as_str()) {
            Some(&path) if claimed.insert(path) => slots.push(Some(Match {
                file: file.clone(),
                actual: path.to_string(),
                kind: MatchKind::Exact,
            })),
            _ => slots.push(None),
        }
    }

    for (slot, file) in slots.iter_mut().zip(plan.files()) {
        if slot.is_some() {
            continue;
        }
        if let Some((path, score)) = best_candidate(file, &actual, &claimed) {
            claimed.insert(path);
            info!(
                "matched {} to {path} (score {score}, expected {})",
                file.original,
                file.expected_path()
            );
            *slot = Some(Match {
                file: file.with_override(path),
                actual: path.to_string(),
                kind: MatchKind::Fuzzy { score },
            });
        }
    }

    let mut result = Reconciliation::default();
    for (slot, file) in slots.into_iter().zip(plan.files()) {
        match slot {
            Some(m) => result.matches.push(m),
            None => {
                warn!(
                    "no prep file found for {} (expected {})",
                    file.original,
                    file.expected_path()
                );
                result.missing.push(file.clone());
            }
        }
    }
    for path in actual {
        if !claimed.contains(path) {
            warn!("prep file {path} does not belong to any document");
            result.unmatched.push(path.to_string());
        }
    }

    debug!(
        "reconciled {} documents: {} exact, {} fuzzy, {} missing, {} unmatched",
        plan.len(),
        result.matches.len() - result.fuzzy_count(),
        result.fuzzy_count(),
        result.missing.len(),
        result.unmatched.len()
    );
    result
}

fn best_candidate<'a>(
    file: &ContentFile,
    actual: &[&'a str],
    claimed: &HashSet<&str>,
) -> Option<(&'a str, u8)> {
    let name = file.original_name();
    let expected_name = file.flattened_name();
    let mut best: Option<(&'a str, u8)> = None;

    for &path in actual {
        if claimed.contains(path) || !in_bucket(path, &file.bucket) || !path.contains(name) {
            continue;
        }
        let score = token_set_ratio(file_name(path), &expected_name);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((path, score));
        }
    }

    best
}

fn in_bucket(path: &str, bucket: &str) -> bool {
    path.split('/').next() == Some(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docbook::{BookTree, Part};

    fn plan() -> BookPlan {
        BookPlan::from_tree(&BookTree {
            front_matter: vec!["Book_Info.xml".into(), "Preface.xml".into()],
            chapters: vec![Part {
                path: "sg-chapters/ch01-intro.xml".into(),
                sections: vec![
                    "sg-chapters/topics/s1.xml".into(),
                    "sg-chapters/topics/s2.xml".into(),
                ],
            }],
            appendices: vec![],
        })
    }

    fn paths(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_untouched_package_matches_exactly() {
        let plan = plan();
        let actual: Vec<String> = plan.files().iter().map(ContentFile::expected_path).collect();

        let result = reconcile(&plan, &actual);
        assert!(result.is_complete());
        assert_eq!(result.fuzzy_count(), 0);
        assert_eq!(result.mappings(), plan.mappings());
    }

    #[test]
    fn test_renamed_file_matched_fuzzily() {
        let plan = plan();
        let actual = paths(&[
            "00-introduction/01-Book_Info.xml",
            "00-introduction/02-Preface.xml",
            "01-ch01-intro/01-ch01-intro.xml",
            "01-ch01-intro/topics/1-s1.xml",
            "01-ch01-intro/topics/02-s2.xml",
        ]);

        let result = reconcile(&plan, &actual);
        assert!(result.is_complete());
        let s1 = result
            .matches
            .iter()
            .find(|m| m.file.original == "sg-chapters/topics/s1.xml")
            .unwrap();
        assert!(matches!(s1.kind, MatchKind::Fuzzy { .. }));
        assert_eq!(s1.file.flattened_path(), "01-ch01-intro/topics/1-s1.xml");
    }

    #[test]
    fn test_claimed_file_not_reused() {
        let plan = plan();
        // Both Preface variants contain the base name; only one may be claimed,
        // and the exact path wins it.
        let actual = paths(&[
            "00-introduction/02-Preface.xml",
            "00-introduction/2-Preface.xml",
        ]);

        let result = reconcile(&plan, &actual);
        let preface: Vec<&Match> = result
            .matches
            .iter()
            .filter(|m| m.file.original == "Preface.xml")
            .collect();
        assert_eq!(preface.len(), 1);
        assert_eq!(preface[0].kind, MatchKind::Exact);
        assert_eq!(result.unmatched, vec!["00-introduction/2-Preface.xml"]);
    }

    #[test]
    fn test_contested_rename_goes_to_first_document() {
        let plan = BookPlan::from_tree(&BookTree {
            front_matter: vec![],
            chapters: vec![Part {
                path: "sg-chapters/ch01.xml".into(),
                sections: vec![
                    "sg-chapters/topics/a/s.xml".into(),
                    "sg-chapters/topics/b/s.xml".into(),
                ],
            }],
            appendices: vec![],
        });
        let actual = paths(&["01-ch01/01-ch01.xml", "01-ch01/topics/a/1-s.xml"]);

        let result = reconcile(&plan, &actual);
        assert_eq!(result.matches.len(), 2);
        let fuzzy: Vec<&Match> = result
            .matches
            .iter()
            .filter(|m| m.actual == "01-ch01/topics/a/1-s.xml")
            .collect();
        assert_eq!(fuzzy.len(), 1);
        assert_eq!(fuzzy[0].file.original, "sg-chapters/topics/a/s.xml");
        assert!(matches!(fuzzy[0].kind, MatchKind::Fuzzy { .. }));

        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].original, "sg-chapters/topics/b/s.xml");
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn test_candidates_restricted_to_bucket() {
        let plan = plan();
        let actual = paths(&["99-appendix/01-s1.xml"]);

        let result = reconcile(&plan, &actual);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched, vec!["99-appendix/01-s1.xml"]);
        assert_eq!(result.missing.len(), plan.len());
    }

    #[test]
    fn test_missing_and_unmatched_reported() {
        let plan = plan();
        let actual = paths(&[
            "00-introduction/01-Book_Info.xml",
            "01-ch01-intro/topics/extra.xml",
        ]);

        let result = reconcile(&plan, &actual);
        assert_eq!(result.matches.len(), 1);
        let missing: Vec<&str> = result.missing.iter().map(|f| f.original.as_str()).collect();
        assert_eq!(
            missing,
            vec![
                "Preface.xml",
                "sg-chapters/ch01-intro.xml",
                "sg-chapters/topics/s1.xml",
                "sg-chapters/topics/s2.xml"
            ]
        );
        assert_eq!(result.unmatched, vec!["01-ch01-intro/topics/extra.xml"]);
    }

    #[test]
    fn test_fuzzy_prefers_closest_name() {
        let plan = plan();
        let actual = paths(&["01-ch01-intro/topics/17-s2.xml", "01-ch01-intro/topics/2-s2.xml"]);

        let result = reconcile(&plan, &actual);
        let s2 = result
            .matches
            .iter()
            .find(|m| m.file.original == "sg-chapters/topics/s2.xml")
            .unwrap();
        assert_eq!(s2.actual, "01-ch01-intro/topics/2-s2.xml");
        assert_eq!(result.unmatched, vec!["01-ch01-intro/topics/17-s2.xml"]);
    }
}
