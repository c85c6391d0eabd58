//! # certificate-forge – templated certificates from CSV rosters
//!
//! This crate renders a fixed certificate template for one person, or for
//! every row of a delimited roster, and packages the results. The pipeline
//! stages are:
//!
//! 1. **Parse** – delimited text → [`Record`]s ([`records`])
//! 2. **Render** – name + course + decorative variant → magnified raster ([`template`])
//! 3. **Build** – raster → single-page PDF ([`document`])
//! 4. **Archive** – PDFs → `certificates.zip`, with progress ([`batch`])
//!
//! Records are processed one at a time; the first failure aborts a batch.

pub mod batch;
pub mod document;
pub mod error;
pub mod fonts;
pub mod raster;
pub mod records;
pub mod template;

// Re-exports for convenience
pub use batch::{
    Archive, BatchArchiver, BatchRequest, LogProgress, NoProgress, ProgressSink, ARCHIVE_FILE_NAME,
};
pub use document::{PageDocument, PageDocumentBuilder, PageOrientation};
pub use error::{CertificateError, ParseError, RenderError, SerializeError};
pub use fonts::FontStyle;
pub use records::{parse, read_headers, ColumnMapping, RawTable, Record, DEFAULT_COURSE};
pub use template::{
    CertificateFields, RenderedImage, Renderer, TemplateAssets, TemplateLayout, TemplateRenderer,
    Variant,
};
