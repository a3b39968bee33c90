//! Item type tags and per-type field tables
//!
//! The remote service models dozens of item subtypes. Locally a single
//! generic item record holds the payload as a field map; the subtype is an
//! enumerated tag, and subtype-specific validation is a lookup table from
//! tag to allowed-field set rather than distinct types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fields accepted on every item type
const COMMON_FIELDS: &[&str] = &[
    "itemType",
    "title",
    "creators",
    "tags",
    "collections",
    "relations",
    "dateAdded",
    "dateModified",
    "extra",
];

/// Enumerated item subtype tag
///
/// The common subtypes are enumerated; anything else passes through as
/// `Other` so unknown remote types never fail to round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Book,
    BookSection,
    JournalArticle,
    ConferencePaper,
    Report,
    Thesis,
    Webpage,
    Manuscript,
    Note,
    Attachment,
    /// Pass-through for subtypes without a dedicated tag
    #[serde(untagged)]
    Other(String),
}

impl ItemType {
    /// Parses a remote item type name; unknown names become `Other`
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "book" => ItemType::Book,
            "bookSection" => ItemType::BookSection,
            "journalArticle" => ItemType::JournalArticle,
            "conferencePaper" => ItemType::ConferencePaper,
            "report" => ItemType::Report,
            "thesis" => ItemType::Thesis,
            "webpage" => ItemType::Webpage,
            "manuscript" => ItemType::Manuscript,
            "note" => ItemType::Note,
            "attachment" => ItemType::Attachment,
            other => ItemType::Other(other.to_string()),
        }
    }

    /// Returns the remote name of this type
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ItemType::Book => "book",
            ItemType::BookSection => "bookSection",
            ItemType::JournalArticle => "journalArticle",
            ItemType::ConferencePaper => "conferencePaper",
            ItemType::Report => "report",
            ItemType::Thesis => "thesis",
            ItemType::Webpage => "webpage",
            ItemType::Manuscript => "manuscript",
            ItemType::Note => "note",
            ItemType::Attachment => "attachment",
            ItemType::Other(name) => name,
        }
    }

    /// Returns the type-specific fields accepted on top of the common set
    ///
    /// `None` means the type is unknown locally and no field validation is
    /// performed (the payload is opaque pass-through).
    #[must_use]
    pub fn extra_fields(&self) -> Option<&'static [&'static str]> {
        match self {
            ItemType::Book => Some(&[
                "abstractNote",
                "series",
                "seriesNumber",
                "volume",
                "numberOfVolumes",
                "edition",
                "place",
                "publisher",
                "date",
                "numPages",
                "language",
                "ISBN",
                "shortTitle",
                "url",
                "accessDate",
                "archive",
                "archiveLocation",
                "libraryCatalog",
                "callNumber",
                "rights",
            ]),
            ItemType::BookSection => Some(&[
                "abstractNote",
                "bookTitle",
                "series",
                "volume",
                "edition",
                "place",
                "publisher",
                "date",
                "pages",
                "language",
                "ISBN",
                "shortTitle",
                "url",
                "accessDate",
                "rights",
            ]),
            ItemType::JournalArticle => Some(&[
                "abstractNote",
                "publicationTitle",
                "volume",
                "issue",
                "pages",
                "date",
                "series",
                "seriesTitle",
                "journalAbbreviation",
                "language",
                "DOI",
                "ISSN",
                "shortTitle",
                "url",
                "accessDate",
                "rights",
            ]),
            ItemType::ConferencePaper => Some(&[
                "abstractNote",
                "date",
                "proceedingsTitle",
                "conferenceName",
                "place",
                "publisher",
                "volume",
                "pages",
                "series",
                "language",
                "DOI",
                "ISBN",
                "shortTitle",
                "url",
                "accessDate",
                "rights",
            ]),
            ItemType::Report => Some(&[
                "abstractNote",
                "reportNumber",
                "reportType",
                "seriesTitle",
                "place",
                "institution",
                "date",
                "pages",
                "language",
                "shortTitle",
                "url",
                "accessDate",
                "rights",
            ]),
            ItemType::Thesis => Some(&[
                "abstractNote",
                "thesisType",
                "university",
                "place",
                "date",
                "numPages",
                "language",
                "shortTitle",
                "url",
                "accessDate",
                "rights",
            ]),
            ItemType::Webpage => Some(&[
                "abstractNote",
                "websiteTitle",
                "websiteType",
                "date",
                "shortTitle",
                "url",
                "accessDate",
                "language",
                "rights",
            ]),
            ItemType::Manuscript => Some(&[
                "abstractNote",
                "manuscriptType",
                "place",
                "date",
                "numPages",
                "language",
                "shortTitle",
                "url",
                "accessDate",
                "rights",
            ]),
            ItemType::Note => Some(&["note", "parentItem"]),
            ItemType::Attachment => Some(&[
                "parentItem",
                "linkMode",
                "note",
                "contentType",
                "charset",
                "filename",
                "md5",
                "mtime",
                "url",
                "accessDate",
            ]),
            ItemType::Other(_) => None,
        }
    }

    /// Validates a payload's field names against this type's allowed set
    ///
    /// Returns the list of unknown field names. Unknown item types accept
    /// everything (empty result).
    #[must_use]
    pub fn validate_fields(&self, payload: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
        let Some(extra) = self.extra_fields() else {
            return Vec::new();
        };
        payload
            .keys()
            .filter(|k| !COMMON_FIELDS.contains(&k.as_str()) && !extra.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
