//! Visible signature stamp
//!
//! The stamp is first rendered as a standalone one-page document sized to
//! the target page. That page becomes a Form XObject which is drawn on top
//! of each selected page in an incremental revision. Original content
//! streams are referenced, never rewritten.

use crate::error::{PdfError, Result};
use crate::fonts::{encode_win_ansi, StandardFont};
use crate::parser::{PageBox, PdfDocument};
use crate::writer::IncrementalUpdate;
use chrono::{DateTime, TimeZone};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Resource name of the stamp font inside the overlay
const FONT_RESOURCE: &str = "FirmaF1";

/// Prefix for the XObject name added to each stamped page
const XOBJECT_PREFIX: &str = "FirmaStamp";

/// Where the text block goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    /// Left-to-right lines from the bottom-left origin, each one lower
    #[default]
    BottomLeft,
    /// Rotated 90°, reading bottom-to-top along the left margin
    VerticalLeft,
}

/// Which pages receive the stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelection {
    /// 0-based page index
    Single(usize),
    All,
}

impl PageSelection {
    /// Concrete page indices for a document with `count` pages
    pub fn indices(&self, count: usize) -> Result<Vec<usize>> {
        if count == 0 {
            return Err(PdfError::EmptyDocument);
        }
        match *self {
            Self::All => Ok((0..count).collect()),
            Self::Single(index) if index < count => Ok(vec![index]),
            Self::Single(index) => Err(PdfError::PageNotFound { index, count }),
        }
    }
}

/// Text and placement of one stamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkSpec {
    pub lines: Vec<String>,
    pub placement: Placement,
}

impl WatermarkSpec {
    pub fn new(lines: Vec<String>, placement: Placement) -> Self {
        Self { lines, placement }
    }

    /// `Firmado por: <name>` followed by the signing time in the signer's zone
    pub fn for_signer<Tz>(common_name: &str, signed_at: &DateTime<Tz>, placement: Placement) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self::new(
            vec![
                format!("Firmado por: {common_name}"),
                format!("Fecha: {}", signed_at.format("%Y-%m-%d %H:%M:%S")),
            ],
            placement,
        )
    }
}

/// Layout constants for the stamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub font: StandardFont,
    /// Points
    pub font_size: f64,
    /// Distance between successive lines
    pub line_spacing: f64,
    /// First baseline for [`Placement::BottomLeft`]
    pub origin: [f64; 2],
    /// Distance from the page's left edge to the last rotated line
    pub left_margin: f64,
    /// Used when a page declares no MediaBox
    pub default_page_size: [f64; 2],
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            font: StandardFont::Helvetica,
            font_size: 8.0,
            line_spacing: 10.0,
            origin: [50.0, 50.0],
            left_margin: 20.0,
            // US Letter
            default_page_size: [612.0, 792.0],
        }
    }
}

/// Render the stamp as a standalone one-page document
pub fn render_overlay(
    spec: &WatermarkSpec,
    page: PageBox,
    config: &CompositorConfig,
) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set(
        "BaseFont",
        Object::Name(config.font.base_font().as_bytes().to_vec()),
    );
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    let font_id = doc.add_object(font);

    let mut fonts = Dictionary::new();
    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));

    let content = Content {
        operations: stamp_operations(spec, page, config),
    }
    .encode()
    .map_err(|e| PdfError::SerializationError(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(pages_id));
    page_dict.set("MediaBox", rect(0.0, 0.0, page.width, page.height));
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set("Contents", Object::Reference(content_id));
    let page_id = doc.add_object(page_dict);

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(1));
    pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    Ok(doc)
}

/// Content operators drawing the text block in page-local coordinates
fn stamp_operations(spec: &WatermarkSpec, page: PageBox, config: &CompositorConfig) -> Vec<Operation> {
    let encoded: Vec<Vec<u8>> = spec.lines.iter().map(|l| encode_win_ansi(l)).collect();
    let mut ops = Vec::new();

    if spec.placement == Placement::VerticalLeft {
        let last = encoded.len().saturating_sub(1) as f64;
        let tx = config.left_margin + config.line_spacing * last;
        let ty = page.height / 2.0;
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                real(0.0),
                real(1.0),
                real(-1.0),
                real(0.0),
                real(tx),
                real(ty),
            ],
        ));
    }

    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![
            Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
            real(config.font_size),
        ],
    ));
    for (i, line) in encoded.into_iter().enumerate() {
        let step = config.line_spacing * i as f64;
        let (x, y) = match spec.placement {
            Placement::BottomLeft => (config.origin[0], config.origin[1] - step),
            // Each line is centred on its own width about the rotation axis
            Placement::VerticalLeft => (-config.font.text_width(&line, config.font_size) / 2.0, step),
        };
        ops.push(Operation::new(
            "Tm",
            vec![real(1.0), real(0.0), real(0.0), real(1.0), real(x), real(y)],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(line, StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));

    if spec.placement == Placement::VerticalLeft {
        ops.push(Operation::new("Q", vec![]));
    }
    ops
}

/// Stamp the selected pages, returning the document with one appended revision
pub fn composite(
    pdf: &PdfDocument,
    spec: &WatermarkSpec,
    pages: PageSelection,
    config: &CompositorConfig,
) -> Result<Vec<u8>> {
    let page_ids = pdf.page_ids();
    let indices = pages.indices(page_ids.len())?;

    let mut update = IncrementalUpdate::new(pdf);
    let mut forms: HashMap<[u64; 4], ObjectId> = HashMap::new();
    let mut tails: HashMap<String, ObjectId> = HashMap::new();
    let open_id = update.add(Stream::new(Dictionary::new(), b"q\n".to_vec()));

    for &index in &indices {
        let page_id = page_ids[index];
        let page_box = pdf.media_box(page_id)?.unwrap_or_else(|| {
            PageBox::sized(config.default_page_size[0], config.default_page_size[1])
        });

        let key = [
            page_box.x.to_bits(),
            page_box.y.to_bits(),
            page_box.width.to_bits(),
            page_box.height.to_bits(),
        ];
        let form_id = match forms.get(&key) {
            Some(&id) => id,
            None => {
                let overlay = render_overlay(spec, page_box, config)?;
                let id = overlay_to_form(&overlay, page_box, &mut update)?;
                forms.insert(key, id);
                id
            }
        };

        let mut page = update.dictionary(page_id)?;
        let mut resources = effective_resources(pdf, page_id)?;
        let mut xobjects = match resources.get(b"XObject") {
            Ok(object) => pdf
                .resolve(object)?
                .as_dict()
                .cloned()
                .unwrap_or_else(|_| Dictionary::new()),
            Err(_) => Dictionary::new(),
        };
        let name = unused_name(&xobjects);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(form_id));
        resources.set("XObject", Object::Dictionary(xobjects));
        page.set("Resources", Object::Dictionary(resources));

        let tail_id = *tails.entry(name.clone()).or_insert_with(|| {
            update.add(Stream::new(
                Dictionary::new(),
                format!("\nQ q /{name} Do Q\n").into_bytes(),
            ))
        });

        let mut contents = vec![Object::Reference(open_id)];
        contents.extend(existing_contents(pdf, &page)?);
        contents.push(Object::Reference(tail_id));
        page.set("Contents", Object::Array(contents));
        update.set(page_id, page);
    }

    tracing::info!(
        pages = indices.len(),
        overlays = forms.len(),
        placement = ?spec.placement,
        "composited signature stamp"
    );

    Ok(update.finish()?.bytes)
}

/// Copy the overlay page into `update` as a Form XObject positioned at `page_box`
fn overlay_to_form(
    overlay: &Document,
    page_box: PageBox,
    update: &mut IncrementalUpdate<'_>,
) -> Result<ObjectId> {
    let page_id = overlay
        .get_pages()
        .into_values()
        .next()
        .ok_or(PdfError::EmptyDocument)?;
    let content = overlay
        .get_page_content(page_id)
        .map_err(|e| PdfError::StructureError(format!("overlay content: {e}")))?;
    let page = overlay
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| PdfError::StructureError(format!("overlay page: {e}")))?;

    let mut remap = HashMap::new();
    let resources = match page.get(b"Resources") {
        Ok(object) => import_object(overlay, object, update, &mut remap)?,
        Err(_) => Object::Dictionary(Dictionary::new()),
    };

    let mut form = Dictionary::new();
    form.set("Type", Object::Name(b"XObject".to_vec()));
    form.set("Subtype", Object::Name(b"Form".to_vec()));
    form.set("FormType", Object::Integer(1));
    form.set("BBox", rect(0.0, 0.0, page_box.width, page_box.height));
    form.set(
        "Matrix",
        Object::Array(vec![
            real(1.0),
            real(0.0),
            real(0.0),
            real(1.0),
            real(page_box.x),
            real(page_box.y),
        ]),
    );
    form.set("Resources", resources);
    Ok(update.add(Stream::new(form, content)))
}

/// Deep-copy `object` from `source`, giving every referenced object a fresh number
fn import_object(
    source: &Document,
    object: &Object,
    update: &mut IncrementalUpdate<'_>,
    remap: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object> {
    Ok(match object {
        Object::Reference(id) => {
            if let Some(&mapped) = remap.get(id) {
                return Ok(Object::Reference(mapped));
            }
            let target = update.allocate();
            remap.insert(*id, target);
            let resolved = source
                .get_object(*id)
                .map_err(|e| PdfError::StructureError(format!("overlay object: {e}")))?;
            let imported = import_object(source, resolved, update, remap)?;
            update.set(target, imported);
            Object::Reference(target)
        }
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| import_object(source, item, update, remap))
                .collect::<Result<_>>()?,
        ),
        Object::Dictionary(dict) => Object::Dictionary(import_dictionary(source, dict, update, remap)?),
        Object::Stream(stream) => Object::Stream(Stream::new(
            import_dictionary(source, &stream.dict, update, remap)?,
            stream.content.clone(),
        )),
        other => other.clone(),
    })
}

fn import_dictionary(
    source: &Document,
    dict: &Dictionary,
    update: &mut IncrementalUpdate<'_>,
    remap: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary> {
    let mut imported = Dictionary::new();
    for (key, value) in dict.iter() {
        imported.set(key.clone(), import_object(source, value, update, remap)?);
    }
    Ok(imported)
}

/// Page resources after inheritance, as an owned inline dictionary
fn effective_resources(pdf: &PdfDocument, page_id: ObjectId) -> Result<Dictionary> {
    match pdf.inherited(page_id, b"Resources")? {
        Some(object) => pdf
            .resolve(object)?
            .as_dict()
            .cloned()
            .map_err(|_| PdfError::StructureError("page /Resources is not a dictionary".to_string())),
        None => Ok(Dictionary::new()),
    }
}

/// Current content stream references of a page, flattened to a list
fn existing_contents(pdf: &PdfDocument, page: &Dictionary) -> Result<Vec<Object>> {
    match page.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Array(items)) => Ok(items.clone()),
        Ok(reference @ Object::Reference(_)) => match pdf.resolve(reference)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![reference.clone()]),
        },
        Ok(_) => Err(PdfError::StructureError(
            "page /Contents is neither a stream nor an array".to_string(),
        )),
    }
}

/// First `FirmaStampN` not already used by the page
fn unused_name(xobjects: &Dictionary) -> String {
    (1..)
        .map(|n| format!("{XOBJECT_PREFIX}{n}"))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| XOBJECT_PREFIX.to_string())
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rect(x: f64, y: f64, width: f64, height: f64) -> Object {
    Object::Array(vec![real(x), real(y), real(x + width), real(y + height)])
}
