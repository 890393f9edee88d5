//! `/ByteRange` arithmetic
//!
//! A signature covers the whole file except one gap: the `/Contents`
//! hex-string token, delimiters included.

use crate::error::{PdfError, Result};
use std::ops::Range;

/// Widest value a fixed-width ByteRange field can hold
pub const MAX_FIELD_VALUE: u64 = 9_999_999_999;

/// `[` + four 10-digit fields + three separators + `]`
pub const FIXED_WIDTH: usize = 45;

/// Written before the real offsets are known
pub const PLACEHOLDER: &[u8; FIXED_WIDTH] = b"[0000000000 0000000000 0000000000 0000000000]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start1: usize,
    pub len1: usize,
    pub start2: usize,
    pub len2: usize,
}

impl ByteRange {
    /// Range covering `0..file_len` except `gap`
    pub fn around(gap: Range<usize>, file_len: usize) -> Result<Self> {
        if gap.start > gap.end || gap.end > file_len {
            return Err(PdfError::StructureError(format!(
                "signature gap {}..{} outside a {file_len}-byte file",
                gap.start, gap.end
            )));
        }
        Ok(Self {
            start1: 0,
            len1: gap.start,
            start2: gap.end,
            len2: file_len - gap.end,
        })
    }

    pub fn gap(&self) -> Range<usize> {
        self.start1 + self.len1..self.start2
    }

    /// Total length of the file the range describes
    pub fn file_len(&self) -> usize {
        self.start2 + self.len2
    }

    pub fn as_array(&self) -> [usize; 4] {
        [self.start1, self.len1, self.start2, self.len2]
    }

    /// Check the partition invariants against a concrete buffer length
    pub fn validate(&self, file_len: usize) -> Result<()> {
        let valid = self.start1 == 0
            && self.start1 + self.len1 <= self.start2
            && self.file_len() == file_len;
        if valid {
            Ok(())
        } else {
            Err(PdfError::StructureError(format!(
                "ByteRange {:?} does not partition a {file_len}-byte file",
                self.as_array()
            )))
        }
    }

    /// The two signed spans of `bytes`, in file order
    pub fn spans<'a>(&self, bytes: &'a [u8]) -> Result<[&'a [u8]; 2]> {
        self.validate(bytes.len())?;
        Ok([
            &bytes[self.start1..self.start1 + self.len1],
            &bytes[self.start2..self.start2 + self.len2],
        ])
    }

    /// `[a b c d]` space-padded to exactly [`FIXED_WIDTH`] bytes
    pub fn to_fixed_width(&self) -> Result<Vec<u8>> {
        if let Some(&too_big) = self.as_array().iter().find(|&&v| !fits_field(v)) {
            return Err(PdfError::EncodingOverflow {
                needed: too_big,
                reserved: usize::try_from(MAX_FIELD_VALUE).unwrap_or(usize::MAX),
            });
        }
        let mut text = format!(
            "[{} {} {} {}]",
            self.start1, self.len1, self.start2, self.len2
        )
        .into_bytes();
        text.resize(FIXED_WIDTH, b' ');
        Ok(text)
    }
}

fn fits_field(value: usize) -> bool {
    u64::try_from(value).is_ok_and(|v| v <= MAX_FIELD_VALUE)
}
