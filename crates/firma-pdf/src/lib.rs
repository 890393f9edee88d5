//! PDF side of signing: visible stamps, signature placeholders and assembly
//!
//! Every change is written as an incremental revision appended to the
//! original bytes, so earlier revisions stay byte-for-byte intact.

pub mod byte_range;
pub mod error;
pub mod fonts;
pub mod parser;
pub mod signer;
pub mod watermark;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use byte_range::ByteRange;
pub use error::{PdfError, Result};
pub use fonts::StandardFont;
pub use parser::{PageBox, PdfDocument};
pub use signer::{
    finalize, reserve, PreparedDocument, SignatureDescriptor, SignatureDictionary, SubFilter,
    DEFAULT_RESERVED_BYTES, MAX_RESERVED_BYTES,
};
pub use watermark::{composite, CompositorConfig, PageSelection, Placement, WatermarkSpec};
