//! Signature placeholder insertion and assembly
//!
//! [`reserve`] appends a revision holding the signature field and a
//! signature dictionary whose `/Contents` is a zero-filled hex string of a
//! fixed size. Once the CMS blob for the two signed spans exists,
//! [`finalize`] writes it over the zeros without moving any other byte.

use crate::byte_range::{ByteRange, FIXED_WIDTH, PLACEHOLDER};
use crate::error::{PdfError, Result};
use crate::parser::PdfDocument;
use crate::watermark::{PageSelection, Placement};
use crate::writer::{text_string, write_object, IncrementalUpdate};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use lopdf::{Dictionary, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Reservation used when the caller has no better estimate
pub const DEFAULT_RESERVED_BYTES: usize = 16_384;

/// Largest signature the placeholder may be sized for
pub const MAX_RESERVED_BYTES: usize = 1 << 20;

/// SignaturesExist | AppendOnly
const SIG_FLAGS: i64 = 3;

/// Print | Locked
const WIDGET_FLAGS: i64 = 132;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubFilter {
    #[default]
    #[serde(rename = "adbe.pkcs7.detached")]
    AdbePkcs7Detached,
    #[serde(rename = "ETSI.CAdES.detached")]
    EtsiCadesDetached,
}

impl SubFilter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AdbePkcs7Detached => "adbe.pkcs7.detached",
            Self::EtsiCadesDetached => "ETSI.CAdES.detached",
        }
    }
}

/// What the signature dictionary should say about the signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDescriptor {
    pub signing_time: DateTime<Utc>,
    /// UTC offset the stamp's `Fecha:` line is written in
    pub stamp_offset: FixedOffset,
    pub name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
    /// 0-based page that carries the widget and, by default, the stamp
    pub page: usize,
    pub sub_filter: SubFilter,
    /// Draw a visible stamp before reserving the signature
    pub visible: bool,
    pub placement: Placement,
    /// Stamp every page instead of only `page`
    pub all_pages: bool,
}

impl SignatureDescriptor {
    pub fn new(signing_time: DateTime<Utc>) -> Self {
        Self {
            signing_time,
            stamp_offset: Utc.fix(),
            name: None,
            reason: None,
            location: None,
            contact: None,
            page: 0,
            sub_filter: SubFilter::default(),
            visible: false,
            placement: Placement::default(),
            all_pages: false,
        }
    }

    /// Signing time as shown on the stamp
    pub fn stamp_time(&self) -> DateTime<FixedOffset> {
        self.signing_time.with_timezone(&self.stamp_offset)
    }

    /// Pages the visible stamp goes on
    pub fn stamp_pages(&self) -> PageSelection {
        if self.all_pages {
            PageSelection::All
        } else {
            PageSelection::Single(self.page)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_sub_filter(mut self, sub_filter: SubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Request a visible stamp with the given placement
    pub fn with_stamp(mut self, placement: Placement) -> Self {
        self.visible = true;
        self.placement = placement;
        self
    }

    pub fn with_all_pages(mut self, all_pages: bool) -> Self {
        self.all_pages = all_pages;
        self
    }

    pub fn with_stamp_offset(mut self, offset: FixedOffset) -> Self {
        self.stamp_offset = offset;
        self
    }
}

/// The `/Type /Sig` dictionary with its two placeholders
pub struct SignatureDictionary<'a> {
    descriptor: &'a SignatureDescriptor,
    reserved_bytes: usize,
}

/// Serialized signature dictionary and where its placeholders sit
struct RenderedDictionary {
    body: Vec<u8>,
    /// Start of the fixed-width `/ByteRange` array
    byte_range_at: usize,
    /// The `<…>` token, delimiters included
    contents: Range<usize>,
}

impl<'a> SignatureDictionary<'a> {
    pub fn new(descriptor: &'a SignatureDescriptor, reserved_bytes: usize) -> Self {
        Self {
            descriptor,
            reserved_bytes,
        }
    }

    /// Length of the `/Contents` token: two hex digits per byte plus `<` and `>`
    pub fn placeholder_len(&self) -> usize {
        2 * self.reserved_bytes + 2
    }

    fn render(&self) -> Result<RenderedDictionary> {
        let d = self.descriptor;
        let mut body = Vec::with_capacity(self.placeholder_len() + 512);
        body.extend_from_slice(b"<</Type /Sig/Filter /Adobe.PPKLite/SubFilter /");
        body.extend_from_slice(d.sub_filter.name().as_bytes());

        body.extend_from_slice(b"/ByteRange ");
        let byte_range_at = body.len();
        body.extend_from_slice(PLACEHOLDER);

        body.extend_from_slice(b"/Contents ");
        let contents_start = body.len();
        body.push(b'<');
        body.resize(body.len() + 2 * self.reserved_bytes, b'0');
        body.push(b'>');
        let contents = contents_start..body.len();

        body.extend_from_slice(b"/M ");
        write_object(&mut body, &text_string(&pdf_date(&d.signing_time)))?;
        let optional = [
            (&b"/Name "[..], &d.name),
            (&b"/Reason "[..], &d.reason),
            (&b"/Location "[..], &d.location),
            (&b"/ContactInfo "[..], &d.contact),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                body.extend_from_slice(key);
                write_object(&mut body, &text_string(value))?;
            }
        }
        body.extend_from_slice(b">>");

        Ok(RenderedDictionary {
            body,
            byte_range_at,
            contents,
        })
    }
}

/// A document with a sized, still-empty signature
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    bytes: Vec<u8>,
    byte_range: ByteRange,
}

impl PreparedDocument {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_range(&self) -> ByteRange {
        self.byte_range
    }

    /// Bytes the signature may occupy once decoded
    pub fn reserved_bytes(&self) -> usize {
        (self.byte_range.gap().len() - 2) / 2
    }

    /// Hex digits between `<` and `>`
    pub fn contents_digits(&self) -> Range<usize> {
        let gap = self.byte_range.gap();
        gap.start + 1..gap.end - 1
    }

    /// The two spans the signature must cover
    pub fn signed_spans(&self) -> Result<[&[u8]; 2]> {
        self.byte_range.spans(&self.bytes)
    }
}

/// Append the signature field and placeholder dictionary as a new revision
pub fn reserve(
    pdf: &PdfDocument,
    descriptor: &SignatureDescriptor,
    reserved_bytes: usize,
) -> Result<PreparedDocument> {
    if reserved_bytes == 0 || reserved_bytes > MAX_RESERVED_BYTES {
        return Err(PdfError::EncodingOverflow {
            needed: reserved_bytes,
            reserved: MAX_RESERVED_BYTES,
        });
    }
    let page_id = pdf.page_id(descriptor.page)?;
    let root_id = pdf.root_id()?;

    let mut update = IncrementalUpdate::new(pdf);

    // Step 1: signature dictionary, serialized by hand so placeholder offsets are exact
    let sig_id = update.allocate();
    let rendered = SignatureDictionary::new(descriptor, reserved_bytes).render()?;
    let (byte_range_at, contents) = (rendered.byte_range_at, rendered.contents.clone());
    update.set_raw(sig_id, rendered.body);

    // Step 2: widget annotation merged with its field
    let field_name = unused_field_name(pdf)?;
    let widget_id = update.allocate();
    let mut widget = Dictionary::new();
    widget.set("Type", Object::Name(b"Annot".to_vec()));
    widget.set("Subtype", Object::Name(b"Widget".to_vec()));
    widget.set("FT", Object::Name(b"Sig".to_vec()));
    widget.set("T", text_string(&field_name));
    widget.set("V", Object::Reference(sig_id));
    widget.set("P", Object::Reference(page_id));
    widget.set("Rect", Object::Array(vec![Object::Integer(0); 4]));
    widget.set("F", Object::Integer(WIDGET_FLAGS));
    update.set(widget_id, widget);

    // Step 3: page annotations and AcroForm
    add_to_page_annots(&mut update, page_id, widget_id)?;
    add_to_acroform(&mut update, root_id, widget_id)?;

    // Step 4: serialize, then patch the real ByteRange over its placeholder
    let revision = update.finish()?;
    let body_at = revision.body_offset(sig_id).ok_or_else(|| {
        PdfError::SerializationError("signature dictionary missing from revision".to_string())
    })?;
    let mut bytes = revision.bytes;
    let gap = body_at + contents.start..body_at + contents.end;
    let byte_range = ByteRange::around(gap, bytes.len())?;
    let at = body_at + byte_range_at;
    bytes[at..at + FIXED_WIDTH].copy_from_slice(&byte_range.to_fixed_width()?);

    tracing::info!(
        field = %field_name,
        reserved_bytes,
        byte_range = ?byte_range.as_array(),
        "reserved signature placeholder"
    );

    Ok(PreparedDocument { bytes, byte_range })
}

/// Write `signature_der` into the reserved `/Contents` hex string
pub fn finalize(prepared: PreparedDocument, signature_der: &[u8]) -> Result<Vec<u8>> {
    let reserved = prepared.reserved_bytes();
    if signature_der.len() > reserved {
        return Err(PdfError::EncodingOverflow {
            needed: signature_der.len(),
            reserved,
        });
    }
    let digits = prepared.contents_digits();
    let encoded = hex::encode(signature_der);
    let mut bytes = prepared.bytes;
    bytes[digits.start..digits.start + encoded.len()].copy_from_slice(encoded.as_bytes());

    tracing::debug!(
        signature_bytes = signature_der.len(),
        reserved,
        "embedded signature"
    );
    Ok(bytes)
}

/// PDF date string in UTC, e.g. `D:20240309140507Z`
pub fn pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// First `SignatureN` not already used by a top-level AcroForm field
fn unused_field_name(pdf: &PdfDocument) -> Result<String> {
    let mut taken: Vec<Vec<u8>> = Vec::new();
    if let Ok(acroform) = pdf.catalog()?.get(b"AcroForm") {
        if let Ok(acroform) = pdf.resolve(acroform)?.as_dict() {
            if let Ok(fields) = acroform.get(b"Fields") {
                for field in pdf.resolve(fields)?.as_array().map(Vec::as_slice).unwrap_or(&[]) {
                    let name = pdf
                        .resolve(field)?
                        .as_dict()
                        .and_then(|f| f.get(b"T"))
                        .and_then(Object::as_str);
                    if let Ok(name) = name {
                        taken.push(name.to_vec());
                    }
                }
            }
        }
    }

    Ok((1..)
        .map(|n| format!("Signature{n}"))
        .find(|name| !taken.iter().any(|t| t == name.as_bytes()))
        .unwrap_or_else(|| "Signature".to_string()))
}

/// Add the widget to the page's `/Annots`, updating an indirect array in place
fn add_to_page_annots(
    update: &mut IncrementalUpdate<'_>,
    page_id: ObjectId,
    widget_id: ObjectId,
) -> Result<()> {
    let mut page = update.dictionary(page_id)?;
    match page.get(b"Annots").ok().cloned() {
        Some(Object::Reference(annots_id)) => {
            let mut annots = match update.get(annots_id)? {
                Some(Object::Array(items)) => items.clone(),
                _ => {
                    return Err(PdfError::StructureError(
                        "page /Annots reference is not an array".to_string(),
                    ))
                }
            };
            annots.push(Object::Reference(widget_id));
            update.set(annots_id, Object::Array(annots));
        }
        Some(Object::Array(mut annots)) => {
            annots.push(Object::Reference(widget_id));
            page.set("Annots", Object::Array(annots));
            update.set(page_id, page);
        }
        _ => {
            page.set("Annots", Object::Array(vec![Object::Reference(widget_id)]));
            update.set(page_id, page);
        }
    }
    Ok(())
}

/// Append the field to the AcroForm, creating the form when the catalog has none
fn add_to_acroform(
    update: &mut IncrementalUpdate<'_>,
    root_id: ObjectId,
    field_id: ObjectId,
) -> Result<()> {
    let mut catalog = update.dictionary(root_id)?;
    let existing = catalog.get(b"AcroForm").ok().cloned();

    let (acroform_id, mut acroform, catalog_changed) = match existing {
        Some(Object::Reference(id)) => (id, update.dictionary(id)?, false),
        // Inline forms move into their own object so the catalog only changes once
        Some(Object::Dictionary(dict)) => (update.allocate(), dict, true),
        _ => (update.allocate(), Dictionary::new(), true),
    };

    let fields = acroform.get(b"Fields").ok().cloned();
    match fields {
        Some(Object::Reference(fields_id)) => {
            let mut items = match update.get(fields_id)? {
                Some(Object::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            items.push(Object::Reference(field_id));
            update.set(fields_id, Object::Array(items));
        }
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(field_id));
            acroform.set("Fields", Object::Array(items));
        }
        _ => acroform.set("Fields", Object::Array(vec![Object::Reference(field_id)])),
    }
    acroform.set("SigFlags", Object::Integer(SIG_FLAGS));
    update.set(acroform_id, acroform);

    if catalog_changed {
        catalog.set("AcroForm", Object::Reference(acroform_id));
        update.set(root_id, catalog);
    }
    Ok(())
}
