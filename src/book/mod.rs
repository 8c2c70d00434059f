//! Guide metadata read from `Book_Info.xml`.

mod locale;

use std::io::{Read, Seek};

use serde::Serialize;
use tracing::debug;

pub use locale::{BASE_LOCALE, SUBTITLE_LOCALES, known_locales, locale_for_subtitle};

use crate::archive::SourceArchive;
use crate::docbook::{FlatDocument, parse_flat_fields};
use crate::error::{Error, Result};
use crate::util::decode_xml;

/// File name of the metadata document.
pub const METADATA_FILE: &str = "Book_Info.xml";

/// Serial used when the guide carries neither a publication number nor date.
pub const SERIAL_PLACEHOLDER: &str = "12345678";

/// Normalized metadata of one guide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    /// Uppercase product acronym, e.g. `RH` or `DO`.
    pub product_name: Option<String>,
    pub product_number: Option<String>,
    pub edition: Option<u32>,
    /// Inventory part number; doubles as the course identifier.
    pub part_number: Option<String>,
    pub pub_date: Option<String>,
    pub serial_number: String,
    pub subtitle: Option<String>,
    /// Always one of the locale table's tags.
    pub locale: &'static str,
}

impl BookMetadata {
    /// Build the record from parsed `bookinfo` fields.
    pub fn from_fields(doc: &FlatDocument) -> Self {
        let field = |key: &str| doc.get(key).map(str::to_string);

        let (pub_date, serial_number) = normalize_serial(field("pubdate"), field("pubsnumber"));
        let subtitle = field("subtitle");
        let locale = locale_for_subtitle(subtitle.as_deref());

        Self {
            title: field("title"),
            product_name: field("productname").map(|p| normalize_product_name(&p)),
            product_number: field("productnumber"),
            edition: doc.get("edition").and_then(parse_edition),
            part_number: field("invpartnumber"),
            pub_date,
            serial_number,
            subtitle,
            locale,
        }
    }

    /// Parse a `Book_Info.xml` document.
    pub fn from_xml(content: &str) -> Self {
        let doc = parse_flat_fields(content).unwrap_or_default();
        if doc.root != "bookinfo" {
            debug!("metadata root element is <{}>, expected <bookinfo>", doc.root);
        }
        Self::from_fields(&doc)
    }

    /// Read the metadata document of an archive.
    pub fn from_archive<R: Read + Seek>(archive: &mut SourceArchive<R>) -> Result<Self> {
        let entry = find_metadata_entry(&archive.names(), archive.label())?;
        debug!("reading metadata from {entry}");
        let bytes = archive.read(&entry)?;
        Ok(Self::from_xml(&decode_xml(&bytes)))
    }

    /// The course identifier.
    pub fn course(&self) -> Result<&str> {
        self.part_number
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(Error::MissingField("invpartnumber"))
    }

    /// `<productname><productnumber>-en-<edition>-<serial>`, the tag of the
    /// source release this guide was built from.
    pub fn release_id(&self) -> String {
        format!(
            "{}{}-en-{}-{}",
            self.product_name.as_deref().unwrap_or_default(),
            self.product_number.as_deref().unwrap_or_default(),
            self.edition.map(|e| e.to_string()).unwrap_or_default(),
            self.serial_number
        )
    }
}

/// Pick the metadata entry among an archive's entry names.
///
/// A single `Book_Info.xml` wins outright. With several, the single one
/// under `en-US` wins; anything else is ambiguous.
pub fn find_metadata_entry(names: &[String], archive: &str) -> Result<String> {
    let candidates: Vec<&String> = names.iter().filter(|n| n.contains(METADATA_FILE)).collect();
    match candidates.as_slice() {
        [] => Err(Error::MissingMetadata(archive.to_string())),
        [only] => Ok(only.to_string()),
        _ => {
            let base: Vec<&&String> =
                candidates.iter().filter(|n| n.contains(BASE_LOCALE)).collect();
            match base.as_slice() {
                [only] => Ok(only.to_string()),
                _ => Err(Error::AmbiguousMetadata {
                    archive: archive.to_string(),
                    candidates: candidates.iter().map(|c| c.to_string()).collect(),
                }),
            }
        }
    }
}

/// Keep uppercase letters only, unless the name already is all uppercase.
fn normalize_product_name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase()) {
        return name.to_string();
    }
    name.chars().filter(|c| c.is_uppercase()).collect()
}

/// Digits of an edition string, e.g. `Edition 2` -> 2.
fn parse_edition(edition: &str) -> Option<u32> {
    let digits: String = edition.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Resolve the publication date and serial number.
///
/// Each falls back to the other. When both are numeric they both become the
/// larger value. With neither, the serial is the placeholder.
fn normalize_serial(pub_date: Option<String>, serial: Option<String>) -> (Option<String>, String) {
    match (pub_date, serial) {
        (Some(date), Some(serial)) => match (date.parse::<u64>(), serial.parse::<u64>()) {
            (Ok(d), Ok(s)) => {
                let current = d.max(s).to_string();
                (Some(current.clone()), current)
            }
            _ => (Some(date), serial),
        },
        (Some(date), None) => (Some(date.clone()), date),
        (None, Some(serial)) => (Some(serial.clone()), serial),
        (None, None) => (None, SERIAL_PLACEHOLDER.to_string()),
    }
}
