//! PDF parsing using lopdf
//!
//! [`PdfDocument`] keeps the parsed object graph next to the exact bytes it
//! came from. Incremental revisions are appended to those bytes, so both
//! views must stay in sync.

use crate::error::{PdfError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Parent chains deeper than this are treated as cycles
const MAX_INHERITANCE_DEPTH: usize = 64;

/// Page rectangle in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box anchored at the origin
    pub fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }
}

/// Parsed document plus its original bytes
pub struct PdfDocument {
    pub(crate) doc: Document,
    pub(crate) bytes: Vec<u8>,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    ///
    /// Encrypted documents are rejected: their strings and streams would need
    /// re-encryption in every appended revision.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let doc = Document::load_mem(&bytes).map_err(|e| PdfError::ParseError(e.to_string()))?;
        if doc.trailer.has(b"Encrypt") {
            return Err(PdfError::Encrypted);
        }
        Ok(Self { doc, bytes })
    }

    /// Get the raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Get the number of pages
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Page object IDs in document order
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.doc.get_pages().into_values().collect()
    }

    /// Get page object ID for a 0-based page index
    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.page_ids();
        if pages.is_empty() {
            return Err(PdfError::EmptyDocument);
        }
        pages.get(index).copied().ok_or(PdfError::PageNotFound {
            index,
            count: pages.len(),
        })
    }

    /// Highest object number in use
    pub fn max_id(&self) -> u32 {
        self.doc.max_id
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.doc.trailer
    }

    /// Object ID of the document catalog
    pub fn root_id(&self) -> Result<ObjectId> {
        self.doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| PdfError::StructureError("trailer has no /Root reference".to_string()))
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        self.dictionary(self.root_id()?)
    }

    /// Resolve an object ID to a dictionary
    pub fn dictionary(&self, id: ObjectId) -> Result<&Dictionary> {
        self.doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|_| {
                PdfError::StructureError(format!("object {} {} is not a dictionary", id.0, id.1))
            })
    }

    /// Follow a reference, returning direct objects untouched
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        match object {
            Object::Reference(id) => self.doc.get_object(*id).map_err(|e| {
                PdfError::StructureError(format!("dangling reference {} {}: {e}", id.0, id.1))
            }),
            direct => Ok(direct),
        }
    }

    /// Look up a page attribute, walking up the page tree for inheritable keys
    pub fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Result<Option<&Object>> {
        let mut current = self.dictionary(page_id)?;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(value) = current.get(key) {
                return Ok(Some(value));
            }
            match current.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => current = self.dictionary(parent)?,
                Err(_) => return Ok(None),
            }
        }
        Err(PdfError::StructureError(
            "page tree parent chain does not terminate".to_string(),
        ))
    }

    /// MediaBox of a page, or `None` when neither the page nor its ancestors set one
    pub fn media_box(&self, page_id: ObjectId) -> Result<Option<PageBox>> {
        match self.inherited(page_id, b"MediaBox")? {
            Some(object) => self.parse_rect(object).map(Some),
            None => Ok(None),
        }
    }

    /// Offset recorded after the last `startxref` keyword
    pub fn startxref(&self) -> Result<usize> {
        let marker = find_last_occurrence(&self.bytes, b"startxref").ok_or_else(|| {
            PdfError::StructureError("no startxref keyword found".to_string())
        })?;
        let digits: String = self.bytes[marker + b"startxref".len()..]
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .take_while(|b| b.is_ascii_digit())
            .map(|&b| b as char)
            .collect();
        digits
            .parse()
            .map_err(|_| PdfError::StructureError("startxref offset is not a number".to_string()))
    }

    /// Parse a PDF rectangle array into a normalized [`PageBox`]
    fn parse_rect(&self, obj: &Object) -> Result<PageBox> {
        let arr = self
            .resolve(obj)?
            .as_array()
            .map_err(|_| PdfError::StructureError("MediaBox is not an array".to_string()))?;

        if arr.len() != 4 {
            return Err(PdfError::StructureError(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }

        let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
        let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
        Ok(PageBox::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Extract a number from a PDF object
    fn extract_number(&self, obj: &Object) -> Result<f64> {
        match self.resolve(obj)? {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(f64::from(*r)),
            _ => Err(PdfError::StructureError(
                "Expected number in rectangle".to_string(),
            )),
        }
    }
}

/// Find the last occurrence of a pattern in bytes
pub fn find_last_occurrence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let len = needle.len();
    if len == 0 || len > haystack.len() {
        return None;
    }

    (0..=(haystack.len() - len))
        .rev()
        .find(|&i| &haystack[i..i + len] == needle)
}
