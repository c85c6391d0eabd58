//! Batch archiver – renders one certificate per record, in input order, and
//! bundles the documents into a single ZIP archive.
//!
//! Records are processed strictly one at a time on the caller's task. The
//! first render or serialization failure aborts the batch and no partial
//! archive is returned.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::document::{PageDocument, PageDocumentBuilder};
use crate::error::{CertificateError, SerializeError};
use crate::records::{parse, ColumnMapping, RawTable, Record};
use crate::template::{CertificateFields, Renderer, Variant};

/// File name of the bulk archive.
pub const ARCHIVE_FILE_NAME: &str = "certificates.zip";

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Receives integer percentages while a batch runs.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

/// Logs progress at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, percent: u8) {
        log::info!("Generating certificates: {percent}%");
    }
}

/// `round(100 * done / total)`, rounding halves up.
fn percent_complete(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((200 * done + total) / (2 * total)).min(100) as u8
}

// ---------------------------------------------------------------------------
// Request / output types
// ---------------------------------------------------------------------------

/// Everything one bulk run needs, fixed before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    records: Vec<Record>,
    variant: Variant,
}

impl BatchRequest {
    /// Fails with [`CertificateError::EmptyBatch`] when `records` is empty.
    pub fn new(records: Vec<Record>, variant: Variant) -> Result<Self, CertificateError> {
        if records.is_empty() {
            return Err(CertificateError::EmptyBatch);
        }
        Ok(Self { records, variant })
    }

    /// Parse `table` with `mapping` and build a request from the result.
    pub fn from_table(
        table: &RawTable,
        mapping: &ColumnMapping,
        variant: Variant,
    ) -> Result<Self, CertificateError> {
        Self::new(parse(table, mapping)?, variant)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }
}

/// One document inside the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub file_name: String,
    pub bytes: Vec<u8>,
    record: Record,
}

/// The finished bulk output.
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    entry_names: Vec<String>,
}

impl Archive {
    /// Entry names in archive order.
    pub fn entry_names(&self) -> &[String] {
        &self.entry_names
    }

    pub fn len(&self) -> usize {
        self.entry_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_names.is_empty()
    }
}

/// Entries collected during a run. Inserting a name that is already present
/// replaces the earlier bytes and keeps the original position.
#[derive(Debug, Default)]
struct ArchiveBuilder {
    entries: Vec<ArchiveEntry>,
    /// File name → position in `entries`.
    index: HashMap<String, usize>,
}

impl ArchiveBuilder {
    fn insert(&mut self, entry: ArchiveEntry) {
        match self.index.get(&entry.file_name) {
            Some(&position) => {
                log::warn!("Duplicate archive entry {:?}, replacing earlier document", entry.file_name);
                self.entries[position] = entry;
            }
            None => {
                self.index.insert(entry.file_name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn finish(self) -> Result<Archive, CertificateError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entry_names = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            write_entry(&mut zip, &entry, &options).map_err(|source| {
                CertificateError::SerializationFailure {
                    record: entry.record.clone(),
                    source,
                }
            })?;
            entry_names.push(entry.file_name);
        }

        let bytes = zip
            .finish()
            .map_err(|e| CertificateError::Archive(e.into()))?
            .into_inner();

        Ok(Archive {
            file_name: ARCHIVE_FILE_NAME.to_string(),
            bytes,
            entry_names,
        })
    }
}

fn write_entry(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    entry: &ArchiveEntry,
    options: &SimpleFileOptions,
) -> Result<(), SerializeError> {
    zip.start_file(entry.file_name.as_str(), options.clone())?;
    zip.write_all(&entry.bytes)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Archiver
// ---------------------------------------------------------------------------

/// Drives render → build → serialize for each record and collects the
/// results into an [`Archive`].
pub struct BatchArchiver<R> {
    renderer: R,
    builder: PageDocumentBuilder,
}

impl<R: Renderer> BatchArchiver<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            builder: PageDocumentBuilder::default(),
        }
    }

    pub fn with_builder(mut self, builder: PageDocumentBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Render and build one certificate, without archiving or progress.
    pub async fn run_single(
        &mut self,
        record: &Record,
        variant: Variant,
    ) -> Result<PageDocument, CertificateError> {
        let fields = CertificateFields::from_record(record, variant);
        let image = self
            .renderer
            .render(&fields)
            .await
            .map_err(|source| CertificateError::RenderFailure {
                record: record.clone(),
                source,
            })?;
        Ok(self.builder.build(image))
    }

    /// Produce one document per record and bundle them into one archive.
    ///
    /// `progress` is called once per record, after its document is built,
    /// with `round(100 * (index + 1) / count)`.
    pub async fn run_batch(
        &mut self,
        request: &BatchRequest,
        progress: &mut impl ProgressSink,
    ) -> Result<Archive, CertificateError> {
        let total = request.records().len();
        log::info!("Generating {total} certificate(s) with {}", request.variant());

        let mut archive = ArchiveBuilder::default();
        for (index, record) in request.records().iter().enumerate() {
            let document = self.run_single(record, request.variant()).await?;
            let bytes = document
                .to_pdf_bytes()
                .map_err(|source| CertificateError::SerializationFailure {
                    record: record.clone(),
                    source,
                })?;

            log::debug!("Built {:?} ({} bytes)", record.file_name(), bytes.len());
            archive.insert(ArchiveEntry {
                file_name: record.file_name(),
                bytes,
                record: record.clone(),
            });

            progress.report(percent_complete(index + 1, total));
        }

        let archive = archive.finish()?;
        log::info!(
            "Wrote {} ({} bytes, {} entr{})",
            archive.file_name,
            archive.bytes.len(),
            archive.len(),
            if archive.len() == 1 { "y" } else { "ies" }
        );
        Ok(archive)
    }
}
