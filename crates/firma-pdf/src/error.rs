use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Encrypted PDFs cannot be signed")]
    Encrypted,

    #[error("PDF structure error: {0}")]
    StructureError(String),

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("Page {index} not found (document has {count} pages)")]
    PageNotFound { index: usize, count: usize },

    #[error("Signature needs {needed} bytes but only {reserved} were reserved")]
    EncodingOverflow { needed: usize, reserved: usize },

    #[error("Content encoding failed: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;
