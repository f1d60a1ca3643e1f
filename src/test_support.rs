//! Fixtures shared by the unit tests.

use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream,
};

/// Builds a PDF with one page per entry of `sizes`.
///
/// The first size and a font resource live on the page tree root and are
/// inherited; pages of a different size carry their own MediaBox.
pub fn build_pdf(sizes: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let id_pages = doc.new_object_id();
    let id_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for (i, &(w, h)) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 50.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let id_content = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => id_pages,
            "Contents" => id_content,
        };
        if (w, h) != sizes[0] {
            page.set("MediaBox", vec![0.into(), 0.into(), w.into(), h.into()]);
        }
        kids.push(doc.add_object(page).into());
    }

    let (w, h) = sizes.first().copied().unwrap_or((612.0, 792.0));
    doc.objects.insert(
        id_pages,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => id_font },
            },
        }),
    );
    let id_catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => id_pages,
    });
    doc.trailer.set("Root", id_catalog);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// A `width`x`height` transparent PNG with a black diagonal.
pub fn signature_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = image::RgbaImage::new(width, height);
    for x in 0..width {
        let y = x * height / width;
        img.put_pixel(x, y, image::Rgba([0, 0, 0, 255]));
    }
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
