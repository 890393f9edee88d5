//! Incremental-update writer
//!
//! Appends a revision (changed and new objects, a classic cross-reference
//! section and a trailer with `/Prev`) after the untouched original bytes.
//! Objects are serialized here rather than through lopdf's incremental
//! saver because the signer needs the exact byte offset of every object body
//! to patch the `/ByteRange` and `/Contents` placeholders in place.

use crate::error::{PdfError, Result};
use crate::parser::PdfDocument;
use lopdf::{Dictionary, Object, ObjectId, StringFormat};
use std::collections::BTreeMap;
use std::io::Write;

/// Trailer keys carried from the previous revision
const CARRIED_TRAILER_KEYS: [&[u8]; 3] = [b"Root", b"Info", b"ID"];

enum Body {
    Object(Object),
    /// Pre-serialized object body, written verbatim
    Raw(Vec<u8>),
}

/// One pending incremental revision on top of a parsed document
pub struct IncrementalUpdate<'a> {
    base: &'a PdfDocument,
    next_id: u32,
    objects: BTreeMap<ObjectId, Body>,
}

/// Bytes of the document with the revision appended
pub struct Revision {
    pub bytes: Vec<u8>,
    body_offsets: BTreeMap<ObjectId, usize>,
}

impl Revision {
    /// Absolute offset of the first byte after `N G obj\n`
    pub fn body_offset(&self, id: ObjectId) -> Option<usize> {
        self.body_offsets.get(&id).copied()
    }
}

impl<'a> IncrementalUpdate<'a> {
    pub fn new(base: &'a PdfDocument) -> Self {
        let declared_size = base
            .trailer()
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        Self {
            base,
            next_id: declared_size.max(base.max_id() + 1),
            objects: BTreeMap::new(),
        }
    }

    /// Reserve a fresh object number
    pub fn allocate(&mut self) -> ObjectId {
        let id = (self.next_id, 0);
        self.next_id += 1;
        id
    }

    /// Add a new object and return its ID
    pub fn add(&mut self, object: impl Into<Object>) -> ObjectId {
        let id = self.allocate();
        self.objects.insert(id, Body::Object(object.into()));
        id
    }

    /// Replace (or define) the object with `id`
    pub fn set(&mut self, id: ObjectId, object: impl Into<Object>) {
        self.objects.insert(id, Body::Object(object.into()));
    }

    /// Define `id` with a body the caller already serialized
    pub fn set_raw(&mut self, id: ObjectId, body: Vec<u8>) {
        self.objects.insert(id, Body::Raw(body));
    }

    /// Current value of `id`, preferring this revision over the base document
    pub fn get(&self, id: ObjectId) -> Result<Option<&Object>> {
        match self.objects.get(&id) {
            Some(Body::Object(object)) => Ok(Some(object)),
            Some(Body::Raw(_)) => Ok(None),
            None => Ok(self.base.document().get_object(id).ok()),
        }
    }

    /// Dictionary `id` as it stands in this revision, cloned for editing
    pub fn dictionary(&self, id: ObjectId) -> Result<Dictionary> {
        match self.get(id)? {
            Some(Object::Dictionary(dict)) => Ok(dict.clone()),
            _ => Err(PdfError::StructureError(format!(
                "object {} {} is not a dictionary",
                id.0, id.1
            ))),
        }
    }

    /// Serialize the revision after the base bytes
    pub fn finish(self) -> Result<Revision> {
        let base_bytes = self.base.bytes();
        let prev = self.base.startxref()?;

        let mut out = Vec::with_capacity(base_bytes.len() + 4096);
        out.extend_from_slice(base_bytes);
        if !matches!(out.last(), Some(b'\n') | Some(b'\r')) {
            out.push(b'\n');
        }

        let mut offsets = BTreeMap::new();
        let mut body_offsets = BTreeMap::new();
        for (&id, body) in &self.objects {
            offsets.insert(id, out.len());
            writeln!(out, "{} {} obj", id.0, id.1).map_err(io_error)?;
            body_offsets.insert(id, out.len());
            match body {
                Body::Object(object) => write_object(&mut out, object)?,
                Body::Raw(raw) => out.extend_from_slice(raw),
            }
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        write_xref(&mut out, &offsets)?;

        let mut trailer = Dictionary::new();
        trailer.set("Size", Object::Integer(i64::from(self.next_id)));
        for key in CARRIED_TRAILER_KEYS {
            if let Ok(value) = self.base.trailer().get(key) {
                trailer.set(key.to_vec(), value.clone());
            }
        }
        trailer.set("Prev", Object::Integer(prev as i64));

        out.extend_from_slice(b"trailer\n");
        write_dictionary(&mut out, &trailer)?;
        writeln!(out, "\nstartxref\n{xref_offset}\n%%EOF").map_err(io_error)?;

        tracing::debug!(
            objects = offsets.len(),
            appended = out.len() - base_bytes.len(),
            prev,
            "wrote incremental revision"
        );

        Ok(Revision {
            bytes: out,
            body_offsets,
        })
    }
}

/// Classic xref section with one subsection per run of consecutive numbers
fn write_xref(out: &mut Vec<u8>, offsets: &BTreeMap<ObjectId, usize>) -> Result<()> {
    out.extend_from_slice(b"xref\n");
    let entries: Vec<(u32, u16, usize)> = offsets
        .iter()
        .map(|(&(number, generation), &offset)| (number, generation, offset))
        .collect();

    let mut start = 0;
    while start < entries.len() {
        let mut end = start + 1;
        while end < entries.len() && entries[end].0 == entries[end - 1].0 + 1 {
            end += 1;
        }
        writeln!(out, "{} {}", entries[start].0, end - start).map_err(io_error)?;
        for &(_, generation, offset) in &entries[start..end] {
            // Each entry is exactly 20 bytes including the two-byte EOL
            write!(out, "{offset:010} {generation:05} n\r\n").map_err(io_error)?;
        }
        start = end;
    }
    Ok(())
}

/// Serialize a lopdf object in PDF syntax
pub fn write_object(out: &mut Vec<u8>, object: &Object) -> Result<()> {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(value) => write!(out, "{value}").map_err(io_error)?,
        Object::Real(value) => out.extend_from_slice(format_real(f64::from(*value)).as_bytes()),
        Object::Name(name) => write_name(out, name),
        Object::String(bytes, StringFormat::Literal) => {
            out.push(b'(');
            out.extend_from_slice(&escape_literal(bytes));
            out.push(b')');
        }
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push(b'<');
            out.extend_from_slice(hex::encode(bytes).as_bytes());
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item)?;
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict)?,
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.set("Length", Object::Integer(stream.content.len() as i64));
            write_dictionary(out, &dict)?;
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference((number, generation)) => {
            write!(out, "{number} {generation} R").map_err(io_error)?
        }
    }
    Ok(())
}

pub fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        write_name(out, key);
        out.push(b' ');
        write_object(out, value)?;
    }
    out.extend_from_slice(b">>");
    Ok(())
}

/// `/Name` with delimiters, whitespace and non-printables as `#xx`
fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &byte in name {
        let regular = (0x21..=0x7e).contains(&byte)
            && !matches!(
                byte,
                b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
            );
        if regular {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        }
    }
}

/// Escape special characters for PDF string literals
pub fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                escaped.push(b'\\');
                escaped.push(byte);
            }
            b'\r' => escaped.extend_from_slice(b"\\r"),
            b'\n' => escaped.extend_from_slice(b"\\n"),
            _ => escaped.push(byte),
        }
    }
    escaped
}

/// Fixed-point rendering, PDF has no exponent syntax
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let mut text = format!("{value:.4}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn io_error(e: std::io::Error) -> PdfError {
    PdfError::SerializationError(e.to_string())
}
