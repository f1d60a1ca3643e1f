//! Stamps a signature image onto the last page of an existing PDF.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream,
};
use serde::Serialize;
use std::io::Write;

use crate::error::SignError;
use crate::geometry::Placement;

/// Linear scale applied to the raster's pixel size.
pub const SIGNATURE_SCALE: f32 = 0.5;
/// Distance of the image's bottom edge from the page's bottom edge.
pub const BOTTOM_OFFSET: f32 = 25.0;

// US Letter, used when no MediaBox can be found.
const FALLBACK_PAGE_SIZE: (f32, f32) = (612.0, 792.0);
// Bounds the walk up the page tree on malformed files.
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Compositor {
    pub scale: f32,
    pub bottom_offset: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Compositor {
            scale: SIGNATURE_SCALE,
            bottom_offset: BOTTOM_OFFSET,
        }
    }
}

/// Signs with the default placement.
pub fn sign_last_page(source: &[u8], signature_png: &[u8]) -> Result<Vec<u8>, SignError> {
    Compositor::default().sign_last_page(source, signature_png)
}

impl Compositor {
    /// Returns a new document with `signature_png` drawn on the last page of `source`.
    ///
    /// `source` is only read. Either the whole output is produced or an error is.
    pub fn sign_last_page(&self, source: &[u8], signature_png: &[u8]) -> Result<Vec<u8>, SignError> {
        let mut doc = load_document(source)?;
        let page_id = last_page(&doc)?;
        let image = decode_png(signature_png)?;

        let (page_width, _) = page_size(&doc, page_id);
        let placement = Placement::bottom_right(page_width, image.dimensions(), self.scale, self.bottom_offset);
        log::debug!("placing {}x{} signature at {:?}", image.width(), image.height(), placement);

        let image_id = embed_image(&mut doc, &image)?;
        let name = register_xobject(&mut doc, page_id, image_id)?;
        draw_xobject(&mut doc, page_id, &name, &placement)?;

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| SignError::Serialize(e.to_string()))?;
        Ok(output)
    }
}

/// What a document looks like from the outside, for the viewer and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub page_count: u32,
    pub last_page_size: (f32, f32),
    pub last_page_images: usize,
}

pub fn page_count(bytes: &[u8]) -> Result<u32, SignError> {
    let doc = load_document(bytes)?;
    Ok(doc.get_pages().len() as u32)
}

pub fn summarize(bytes: &[u8]) -> Result<DocumentSummary, SignError> {
    let doc = load_document(bytes)?;
    let page_id = last_page(&doc)?;
    Ok(DocumentSummary {
        page_count: doc.get_pages().len() as u32,
        last_page_size: page_size(&doc, page_id),
        last_page_images: page_images(&doc, page_id).len(),
    })
}

fn load_document(bytes: &[u8]) -> Result<Document, SignError> {
    if bytes.is_empty() {
        return Err(SignError::MalformedDocument("no data".into()));
    }
    Ok(Document::load_mem(bytes)?)
}

fn last_page(doc: &Document) -> Result<ObjectId, SignError> {
    doc.get_pages()
        .values()
        .next_back()
        .copied()
        .ok_or(SignError::EmptyDocument)
}

fn decode_png(bytes: &[u8]) -> Result<image::RgbaImage, SignError> {
    let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?;
    Ok(img.to_rgba8())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Looks up `key` on the page or, failing that, on its ancestors.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Width and height of the page's MediaBox in user-space units.
fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let size = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| {
            let v: Vec<f32> = arr
                .iter()
                .filter_map(|o| resolve(doc, o)?.as_float().ok())
                .collect();
            (v.len() == 4).then(|| ((v[2] - v[0]).abs(), (v[3] - v[1]).abs()))
        });
    size.unwrap_or_else(|| {
        log::warn!("page {page_id:?} has no usable MediaBox, assuming US Letter");
        FALLBACK_PAGE_SIZE
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SignError::Serialize(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| SignError::Serialize(e.to_string()))
}

/// Adds the image as a DeviceRGB XObject with its alpha channel as a soft mask.
fn embed_image(doc: &mut Document, image: &image::RgbaImage) -> Result<ObjectId, SignError> {
    let (width, height) = image.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in image.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&alpha)?,
    ));

    Ok(doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
            "SMask" => smask_id,
        },
        deflate(&rgb)?,
    )))
}

/// Image XObjects reachable from the page's resources.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Some(xobjects) = inherited(doc, page_id, b"Resources")
        .and_then(|r| r.as_dict().ok())
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x))
        .and_then(|x| x.as_dict().ok())
    else {
        return Vec::new();
    };
    xobjects
        .iter()
        .filter_map(|(_, obj)| obj.as_reference().ok())
        .filter(|id| {
            doc.get_object(*id)
                .and_then(Object::as_stream)
                .and_then(|s| s.dict.get(b"Subtype"))
                .and_then(Object::as_name)
                .is_ok_and(|n| n == b"Image")
        })
        .collect()
}

/// Registers `image_id` in the page's own resources under a fresh name.
///
/// Resources shared with other pages (inherited or indirect) are copied onto
/// the page first, so only this page sees the new entry.
fn register_xobject(doc: &mut Document, page_id: ObjectId, image_id: ObjectId) -> Result<String, SignError> {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|r| r.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|x| resolve(doc, x))
        .and_then(|x| x.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    let name = (1..)
        .map(|n| format!("Sig{n}"))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_default();
    xobjects.set(name.as_str(), image_id);
    resources.set("XObject", xobjects);

    page_dict_mut(doc, page_id)?.set("Resources", resources);
    Ok(name)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, SignError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| SignError::MalformedDocument(format!("page {page_id:?}: {e}")))
}

/// Appends a content stream drawing `name` at `placement`.
///
/// Existing content is wrapped in `q`/`Q` so whatever graphics state it
/// leaves behind cannot move or clip the signature.
fn draw_xobject(doc: &mut Document, page_id: ObjectId, name: &str, placement: &Placement) -> Result<(), SignError> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    };

    let mut ops = Vec::new();
    if !existing.is_empty() {
        ops.push(Operation::new("Q", vec![]));
    }
    let [a, _, _, d, e, f] = placement.to_matrix();
    ops.extend([
        Operation::new("q", vec![]),
        Operation::new("cm", vec![a.into(), 0.into(), 0.into(), d.into(), e.into(), f.into()]),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]);
    // Readers concatenate content streams as-is; the previous stream may not
    // end in whitespace.
    let mut content = b"\n".to_vec();
    content.extend(
        Content { operations: ops }
            .encode()
            .map_err(|e| SignError::Serialize(e.to_string()))?,
    );
    let sig_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if !existing.is_empty() {
        let push_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(push_id));
        contents.extend(existing);
    }
    contents.push(Object::Reference(sig_id));

    page_dict_mut(doc, page_id)?.set("Contents", contents);
    Ok(())
}
