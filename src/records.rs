use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What kind of file a document points at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Text,
    #[default]
    Other,
}

impl ContentType {
    /// Infer the content type from a file extension.
    ///
    /// ```
    /// use std::path::Path;
    /// use docshelf::records::ContentType;
    ///
    /// assert_eq!(ContentType::from_path(Path::new("a.PDF")), ContentType::Pdf);
    /// assert_eq!(ContentType::from_path(Path::new("b.md")), ContentType::Text);
    /// assert_eq!(ContentType::from_path(Path::new("c.epub")), ContentType::Other);
    /// ```
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("md" | "markdown" | "txt") => Self::Text,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "text" => Ok(Self::Text),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!(
                "unknown content type '{other}'"
            ))),
        }
    }
}

/// A stored document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub title: String,
    pub author: Option<String>,
    pub kind: ContentType,
    /// Location of the file on disk. The file itself belongs to the host
    /// filesystem; the store only keeps the reference.
    pub file_path: String,
    pub summary: Option<String>,
    /// Seconds since the Unix epoch.
    pub imported_at: u64,
}

/// A document before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewDocument {
    pub title: String,
    pub author: Option<String>,
    pub kind: ContentType,
    pub file_path: String,
    pub summary: Option<String>,
    pub imported_at: u64,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, kind: ContentType) -> Self {
        Self {
            title: title.into(),
            kind,
            ..Self::default()
        }
    }

    pub(crate) fn with_id(self, id: u64) -> Document {
        Document {
            id,
            title: self.title,
            author: self.author,
            kind: self.kind,
            file_path: self.file_path,
            summary: self.summary,
            imported_at: self.imported_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

/// A change committed to the record store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    DocumentUpserted(Document),
    DocumentRemoved(u64),
    CategoryUpserted(Category),
    CategoryRemoved(u64),
    /// The set of categories linked to a document changed.
    LinksChanged { document_id: u64 },
}

/// Encode a record for storage in the database.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_serializes_lowercase() {
        let json = serde_json::to_string(&ContentType::Pdf).unwrap();
        assert_eq!(json, "\"pdf\"");
        let back: ContentType = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(back, ContentType::Text);
    }

    #[test]
    fn content_type_parse_rejects_unknown() {
        assert_eq!("other".parse::<ContentType>().unwrap(), ContentType::Other);
        assert!("docx".parse::<ContentType>().is_err());
    }

    #[test]
    fn markdown_variants_are_text() {
        for name in ["notes.md", "NOTES.Markdown", "plain.txt"] {
            assert_eq!(ContentType::from_path(Path::new(name)), ContentType::Text);
        }
        assert_eq!(ContentType::from_path(Path::new("noext")), ContentType::Other);
    }

    #[test]
    fn document_decodes_what_it_encodes() {
        let doc = NewDocument {
            title: "Quantum Computing".into(),
            author: Some("Prof. John Doe".into()),
            kind: ContentType::Pdf,
            file_path: "/tmp/q.pdf".into(),
            summary: None,
            imported_at: 1_700_000_000,
        }
        .with_id(7);

        let bytes = encode(&doc).unwrap();
        let restored: Document = decode(&bytes).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode::<Category>(b"not json").is_err());
    }
}
