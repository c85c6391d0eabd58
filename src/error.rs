//! Error taxonomy for the certificate pipeline.
//!
//! Parsing problems surface before any rendering starts. Render and
//! serialization problems abort the whole batch and carry the record that
//! was being processed when they happened.

use thiserror::Error;

use crate::records::Record;

/// Errors raised while turning delimited text into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Column \"{column}\" not found in CSV")]
    MissingColumn { column: String, headers: Vec<String> },
}

/// Errors raised while producing a raster of the certificate template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("failed to load font: {0}")]
    Font(String),

    #[error("failed to decode template image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("rendering surface unavailable: {0}")]
    SurfaceUnavailable(String),
}

/// Errors raised while turning a page document or archive into bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode page image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to embed page image: {0}")]
    Embed(String),

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-level error handed back to the surrounding application, whose
/// message is meant to be shown to the end user verbatim.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error(transparent)]
    MissingColumn(#[from] ParseError),

    #[error("Error generating certificate for \"{}\": {source}", .record.name())]
    RenderFailure {
        record: Record,
        #[source]
        source: RenderError,
    },

    #[error("Error saving certificate for \"{}\": {source}", .record.name())]
    SerializationFailure {
        record: Record,
        #[source]
        source: SerializeError,
    },

    #[error("Error generating certificates: {0}")]
    Archive(#[source] SerializeError),

    #[error("No valid data found in the CSV file")]
    EmptyBatch,
}

impl CertificateError {
    /// The record being processed when the failure happened, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            CertificateError::RenderFailure { record, .. }
            | CertificateError::SerializationFailure { record, .. } => Some(record),
            CertificateError::MissingColumn(_)
            | CertificateError::Archive(_)
            | CertificateError::EmptyBatch => None,
        }
    }
}
