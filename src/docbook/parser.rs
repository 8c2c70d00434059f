//! Lenient DocBook scanning (table-of-contents hrefs, flat metadata fields).
//!
//! Guide sources routinely carry undeclared entities, bare ampersands, stray
//! end tags and truncated files. Both scanners skip past syntax errors and
//! keep scanning until the input stops yielding events.

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

/// A document whose root element holds flat `key -> text` children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatDocument {
    /// Local name of the root element.
    pub root: String,
    /// Child elements in document order.
    pub fields: Vec<(String, String)>,
}

impl FlatDocument {
    /// First non-empty value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

fn lenient_reader(content: &str, trim: bool) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text(trim);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;
    reader
}

/// Tracks syntax errors so a scan resumes after each one but stops once the
/// reader no longer moves forward.
#[derive(Default)]
struct Recovery {
    last_error: Option<u64>,
}

impl Recovery {
    /// Returns `true` when scanning should continue.
    fn resume(&mut self, reader: &Reader<&[u8]>, err: &quick_xml::Error) -> bool {
        let pos = reader.buffer_position();
        if self.last_error == Some(pos) {
            debug!("giving up on XML at byte {pos}: {err}");
            return false;
        }
        debug!("skipping XML error at byte {pos}: {err}");
        self.last_error = Some(pos);
        true
    }
}

/// Collect the `href` attribute of every direct child of the root element.
///
/// Order follows the document. Children without an `href` are skipped, as is
/// anything nested deeper than one level.
pub fn child_hrefs(content: &str) -> Vec<String> {
    let mut reader = lenient_reader(content, true);
    let mut hrefs = Vec::new();
    let mut open = OpenElements::default();
    let mut recovery = Recovery::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if open.depth() == 1
                    && let Some(href) = href_attr(&e)
                {
                    hrefs.push(href);
                }
                open.push(e.name().as_ref());
            }
            Ok(Event::Empty(e)) => {
                if open.depth() == 1
                    && let Some(href) = href_attr(&e)
                {
                    hrefs.push(href);
                }
            }
            Ok(Event::End(e)) => open.close(e.name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                if !recovery.resume(&reader, &e) {
                    break;
                }
            }
            _ => {}
        }
    }

    hrefs
}

fn href_attr(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref() == b"href")
        .map(|attr| String::from_utf8_lossy(&attr.value).trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Parse a document whose root children are simple `key/text` pairs.
///
/// Text nested below a child (for example `<subtitle><phrase>..</phrase>`) is
/// folded into that child's value. Returns `None` when no root element was
/// found.
pub fn parse_flat_fields(content: &str) -> Option<FlatDocument> {
    let mut reader = lenient_reader(content, false);
    let mut doc: Option<FlatDocument> = None;
    let mut open = OpenElements::default();
    let mut current: Option<(String, String)> = None;
    let mut recovery = Recovery::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(local_name(e.name().as_ref())).to_string();
                match open.depth() {
                    0 if doc.is_none() => {
                        doc = Some(FlatDocument {
                            root: name,
                            fields: Vec::new(),
                        })
                    }
                    1 => current = Some((name, String::new())),
                    _ => {
                        if let Some((_, text)) = current.as_mut() {
                            text.push(' ');
                        }
                    }
                }
                open.push(e.name().as_ref());
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(local_name(e.name().as_ref())).to_string();
                match open.depth() {
                    0 if doc.is_none() => {
                        doc = Some(FlatDocument {
                            root: name,
                            fields: Vec::new(),
                        })
                    }
                    1 => {
                        if let Some(doc) = doc.as_mut() {
                            doc.fields.push((name, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, text)) = current.as_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    match resolve_entity(&entity) {
                        Some(resolved) => text.push_str(&resolved),
                        None => {
                            text.push('&');
                            text.push_str(&entity);
                            text.push(';');
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                open.close(e.name().as_ref());
                if open.depth() > 1 {
                    if let Some((_, text)) = current.as_mut() {
                        text.push(' ');
                    }
                } else if let Some((name, text)) = current.take()
                    && let Some(doc) = doc.as_mut()
                {
                    doc.fields.push((name, collapse_whitespace(&text)));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if !recovery.resume(&reader, &e) {
                    break;
                }
            }
            _ => {}
        }
    }

    doc
}

/// Stack of open element names that tolerates stray end tags.
///
/// An end tag closes the nearest matching open element (and everything
/// opened after it); an end tag matching nothing is ignored.
#[derive(Default)]
struct OpenElements {
    names: Vec<Vec<u8>>,
}

impl OpenElements {
    fn depth(&self) -> usize {
        self.names.len()
    }

    fn push(&mut self, name: &[u8]) {
        self.names.push(name.to_vec());
    }

    fn close(&mut self, name: &[u8]) {
        if let Some(pos) = self.names.iter().rposition(|n| n == name) {
            self.names.truncate(pos);
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract local name from namespaced XML name (e.g., "xi:include" -> "include").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve the builtin XML entities and character references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x") {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_hrefs_direct_children_only() {
        let toc = r#"<?xml version="1.0"?>
<book xmlns:xi="http://www.w3.org/2001/XInclude">
  <xi:include href="Book_Info.xml"/>
  <xi:include href="Preface.xml"></xi:include>
  <part>
    <xi:include href="nested.xml"/>
  </part>
  <xi:include href="sg-chapters/ch01.xml"/>
  <title>No href</title>
</book>"#;

        assert_eq!(
            child_hrefs(toc),
            vec!["Book_Info.xml", "Preface.xml", "sg-chapters/ch01.xml"]
        );
    }

    #[test]
    fn test_child_hrefs_keeps_hrefs_before_syntax_error() {
        let toc = r#"<book>
  <xi:include href="a.xml"/>
  <xi:include href="b.xml"/>
  <broken attr="x
"#;
        let hrefs = child_hrefs(toc);
        assert_eq!(&hrefs[..2], &["a.xml".to_string(), "b.xml".to_string()]);
    }

    #[test]
    fn test_child_hrefs_bare_ampersand_in_title() {
        let chapter = concat!(
            r#"<chapter><title>R&D tools</title>"#,
            r#"<xi:include href="s1.xml"/><xi:include href="s2.xml"/></chapter>"#,
        );
        assert_eq!(child_hrefs(chapter), vec!["s1.xml", "s2.xml"]);
    }

    #[test]
    fn test_recovery_resumes_after_error() {
        let chapter = r#"<chapter><title>R&D</title><xi:include href="s1.xml"/></chapter>"#;
        let mut reader = Reader::from_str(chapter);
        let mut recovery = Recovery::default();
        let mut errors = 0;
        let mut hrefs = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Empty(e)) => hrefs.extend(href_attr(&e)),
                Ok(Event::Eof) => break,
                Err(e) => {
                    errors += 1;
                    if !recovery.resume(&reader, &e) {
                        break;
                    }
                }
                _ => {}
            }
        }

        assert_eq!(errors, 1);
        assert_eq!(hrefs, vec!["s1.xml"]);
    }

    #[test]
    fn test_recovery_stops_without_progress() {
        let reader = Reader::from_str("<a>");
        let mut recovery = Recovery::default();
        let err = quick_xml::Error::Syntax(quick_xml::errors::SyntaxError::UnclosedTag);
        assert!(recovery.resume(&reader, &err));
        assert!(!recovery.resume(&reader, &err));
    }

    #[test]
    fn test_child_hrefs_tolerates_undeclared_entities() {
        let toc =
            r#"<chapter><title>&PRODUCT; Basics</title><xi:include href="s1.xml"/></chapter>"#;
        assert_eq!(child_hrefs(toc), vec!["s1.xml"]);
    }

    #[test]
    fn test_child_hrefs_mismatched_end_tags() {
        let toc = concat!(
            r#"<book><xi:include href="a.xml"/><para>text</emphasis></para>"#,
            r#"<xi:include href="b.xml"/></book>"#,
        );
        assert_eq!(child_hrefs(toc), vec!["a.xml", "b.xml"]);
    }

    #[test]
    fn test_child_hrefs_empty_input() {
        assert!(child_hrefs("").is_empty());
        assert!(child_hrefs("not xml at all").is_empty());
    }

    #[test]
    fn test_parse_flat_fields() {
        let info = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE bookinfo PUBLIC "-//OASIS//DTD DocBook XML V4.5//EN" "docbookx.dtd">
<bookinfo id="book-info">
  <title>Red Hat System Administration I</title>
  <subtitle xml:lang="fr-FR">Manuel d&apos;exercices</subtitle>
  <productname>&PRODUCT;</productname>
  <edition>Edition 1</edition>
  <pubsnumber/>
  <abstract><para>First</para><para>Second</para></abstract>
</bookinfo>"#;

        let doc = parse_flat_fields(info).unwrap();
        assert_eq!(doc.root, "bookinfo");
        assert_eq!(doc.get("title"), Some("Red Hat System Administration I"));
        assert_eq!(doc.get("subtitle"), Some("Manuel d'exercices"));
        assert_eq!(doc.get("productname"), Some("&PRODUCT;"));
        assert_eq!(doc.get("edition"), Some("Edition 1"));
        assert_eq!(doc.get("pubsnumber"), None);
        assert_eq!(doc.get("abstract"), Some("First Second"));
    }

    #[test]
    fn test_parse_flat_fields_bare_ampersand() {
        let info = "<bookinfo><title>R&D</title><productname>RHEL</productname>\
                    <invpartnumber>RH124</invpartnumber></bookinfo>";

        let doc = parse_flat_fields(info).unwrap();
        assert_eq!(doc.root, "bookinfo");
        assert_eq!(doc.get("title"), Some("R&D"));
        assert_eq!(doc.get("productname"), Some("RHEL"));
        assert_eq!(doc.get("invpartnumber"), Some("RH124"));
    }

    #[test]
    fn test_parse_flat_fields_no_root() {
        assert_eq!(parse_flat_fields(""), None);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"include"), b"include");
        assert_eq!(local_name(b"xi:include"), b"include");
        assert_eq!(local_name(b""), b"");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("apos"), Some("'".to_string()));
        assert_eq!(resolve_entity("amp"), Some("&".to_string()));
        assert_eq!(resolve_entity("#65"), Some("A".to_string()));
        assert_eq!(resolve_entity("#x2019"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("PRODUCT"), None);
    }
}
