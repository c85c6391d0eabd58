//! Page document builder – wraps a captured certificate raster into a
//! single-page PDF using `printpdf` (v0.8 ops-based API).
//!
//! The page is measured in pixel units: one raster pixel is one PDF point,
//! so the page is exactly as large as the image and the image covers it
//! from the origin without cropping or scaling.

use std::io::Cursor;

use ::image::ImageFormat;
use printpdf::{Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Pt, RawImage, XObjectTransform};

use crate::error::SerializeError;
use crate::template::RenderedImage;

/// Extension of serialized documents.
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// PDF points to millimetres.
const PT_TO_MM: f32 = 0.352778;

/// Page orientation of a built document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Landscape mode: width ≥ height (default).
    #[default]
    Landscape,
    /// Portrait mode: height > width.
    Portrait,
}

/// Builds single-page documents from rendered certificates.
#[derive(Debug, Clone)]
pub struct PageDocumentBuilder {
    /// Document title embedded in the PDF metadata (default: "Certificate").
    pub title: String,
}

impl Default for PageDocumentBuilder {
    fn default() -> Self {
        Self {
            title: "Certificate".to_string(),
        }
    }
}

impl PageDocumentBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Wrap `image` into a page sized to its pixel dimensions.
    pub fn build(&self, image: RenderedImage) -> PageDocument {
        PageDocument {
            title: self.title.clone(),
            image,
        }
    }
}

/// A single-page document embedding one rendered certificate.
#[derive(Debug, Clone)]
pub struct PageDocument {
    title: String,
    image: RenderedImage,
}

impl PageDocument {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn image(&self) -> &RenderedImage {
        &self.image
    }

    /// Page width in pixel units.
    pub fn page_width(&self) -> f32 {
        self.image.width() as f32
    }

    /// Page height in pixel units.
    pub fn page_height(&self) -> f32 {
        self.image.height() as f32
    }

    pub fn orientation(&self) -> PageOrientation {
        if self.image.width() >= self.image.height() {
            PageOrientation::Landscape
        } else {
            PageOrientation::Portrait
        }
    }

    /// Serialize to PDF bytes.
    pub fn to_pdf_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        let png = encode_png(&self.image)?;

        let mut warnings = Vec::new();
        let raw = RawImage::decode_from_bytes(&png, &mut warnings)
            .map_err(|e| SerializeError::Embed(e.to_string()))?;

        let mut doc = PdfDocument::new(&self.title);
        let xobj_id = doc.add_image(&raw);

        // At dpi=72 printpdf renders 1 px = 1 pt; PDF origin is bottom-left
        // and the image fills the page, so no flip is needed.
        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                dpi: Some(72.0),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                rotate: None,
            },
        }];

        let page = PdfPage::new(
            Mm(self.page_width() * PT_TO_MM),
            Mm(self.page_height() * PT_TO_MM),
            ops,
        );
        doc.with_pages(vec![page]);

        let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            log::debug!("printpdf reported {} warning(s) for {:?}", warnings.len(), self.title);
        }
        Ok(bytes)
    }
}

/// Encode the raster losslessly for embedding.
pub fn encode_png(image: &RenderedImage) -> Result<Vec<u8>, SerializeError> {
    let mut bytes = Vec::new();
    image
        .pixels()
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
