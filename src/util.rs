//! Text decoding and archive path helpers.
//!
//! Archive paths are always `/`-separated strings, independent of the host
//! platform. Conversion to [`std::path::Path`] happens only at the filesystem
//! boundary in [`crate::assemble`].

use std::borrow::Cow;

// ============================================================================
// Encoding Detection
// ============================================================================

/// Decode bytes to a string, handling various encodings.
///
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode an XML document using the encoding named in its declaration.
pub fn decode_xml(bytes: &[u8]) -> Cow<'_, str> {
    decode_text(bytes, extract_xml_encoding(bytes))
}

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` within the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

// ============================================================================
// Archive Paths
// ============================================================================

/// Directory part of an archive path (`""` for top-level entries).
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Final component of an archive path.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// File name without everything after the first `.`.
///
/// `ch03-networking.xml` becomes `ch03-networking`; `a.b.xml` becomes `a`.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    name.split_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Join archive path segments, skipping empty ones.
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve an `href` against a base directory.
///
/// Leading `./` segments are dropped and percent-escapes are decoded. `..`
/// segments are kept as-is so that callers can reject them.
pub fn resolve_href(base: &str, href: &str) -> String {
    let decoded = percent_encoding::percent_decode_str(href)
        .decode_utf8()
        .map(Cow::into_owned)
        .unwrap_or_else(|_| href.to_string());
    let relative: Vec<&str> = decoded
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    join(&[base, &relative.join("/")])
}

/// Whether a path climbs above its base with a `..` segment.
pub fn escapes_root(path: &str) -> bool {
    path.contains("..")
}

/// Strip a leading directory prefix from an archive path.
pub fn strip_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(path);
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_windows_1252_fallback() {
        // 0x92 is a right single quote in CP1252 and invalid UTF-8
        let bytes = b"Don\x92t";
        assert_eq!(decode_text(bytes, None), "Don\u{2019}t");
        assert_eq!(decode_text("plain".as_bytes(), None), "plain");
    }

    #[test]
    fn test_extract_xml_encoding() {
        let xml = br#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#;
        assert_eq!(extract_xml_encoding(xml), Some("ISO-8859-1"));
        assert_eq!(extract_xml_encoding(b"<a/>"), None);
        assert_eq!(extract_xml_encoding(b"<?xml version='1.0' encoding='utf-8'?>"), Some("utf-8"));
    }

    #[test]
    fn test_path_components() {
        assert_eq!(parent_dir("sg-chapters/topics/s1.xml"), "sg-chapters/topics");
        assert_eq!(parent_dir("Preface.xml"), "");
        assert_eq!(file_name("sg-chapters/ch01.xml"), "ch01.xml");
        assert_eq!(file_stem("sg-chapters/ch01-intro.xml"), "ch01-intro");
        assert_eq!(file_stem("a.b.xml"), "a");
    }

    #[test]
    fn test_join_skips_empty_segments() {
        assert_eq!(join(&["en-US", "", "01-a.xml"]), "en-US/01-a.xml");
        assert_eq!(join(&["", "x/y/", "z"]), "x/y/z");
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("sg-chapters", "topics/s1.xml"), "sg-chapters/topics/s1.xml");
        assert_eq!(resolve_href("", "./Preface.xml"), "Preface.xml");
        assert_eq!(resolve_href("a", "my%20file.xml"), "a/my file.xml");
        assert!(escapes_root(&resolve_href("a", "../b.xml")));
    }

    #[test]
    fn test_strip_dir() {
        assert_eq!(strip_dir("root/guides/en-US/a.xml", "root/guides/en-US"), Some("a.xml"));
        assert_eq!(strip_dir("other/a.xml", "root"), None);
        assert_eq!(strip_dir("a.xml", ""), Some("a.xml"));
    }

    #[test]
    fn test_decode_xml_skips_bom() {
        let bytes = b"\xEF\xBB\xBF<?xml version=\"1.0\"?><a/>";
        assert!(decode_xml(bytes).starts_with("<?xml"));
    }
}
