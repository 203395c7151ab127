//! Session-scoped extraction: the explicit context every stage runs in.
//!
//! A [`Session`] owns its configuration, the rasteriser and model backend, the
//! in-memory [`RecordStore`], and an optional [`CsvMirror`]. Nothing is global,
//! so independent sessions can run side by side.
//!
//! ## Batch semantics
//!
//! Each document flows through render → llm → normalize on its own. A failure
//! in one document becomes a [`DocumentOutcome::Failed`] and the batch moves
//! on. With the default `concurrency = 1` documents are processed strictly one
//! after another. Higher values let several extractions be in flight, but
//! results are still committed to the store and mirror in upload order by
//! this single writer.

use crate::config::ExtractionConfig;
use crate::error::{DocumentError, ResumeError};
use crate::pipeline::llm::{self, ExtractionBackend, ProviderBackend};
use crate::pipeline::normalize::normalize_response;
use crate::pipeline::render::{self, PdfiumRasteriser, Rasteriser};
use crate::progress::ProgressCallback;
use crate::record::{BatchSummary, Document, DocumentOutcome, ExtractionRecord};
use crate::store::{CsvMirror, RecordStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one batch, in upload order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub summary: BatchSummary,
}

/// The stateless half of a session: turns one document into one record.
pub struct Extractor {
    config: ExtractionConfig,
    rasteriser: Arc<dyn Rasteriser>,
    backend: Arc<dyn ExtractionBackend>,
}

impl Extractor {
    pub fn new(
        config: ExtractionConfig,
        rasteriser: Arc<dyn Rasteriser>,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            config,
            rasteriser,
            backend,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run one document through the pipeline.
    ///
    /// Selected pages beyond the document are skipped silently. When none of
    /// the selected pages exist the document fails with
    /// [`DocumentError::NoPagesInRange`] and the model is not called, rather
    /// than sending a text-only request.
    ///
    /// Page images live only until the model call returns.
    pub async fn extract(&self, document: &Document) -> Result<ExtractionRecord, DocumentError> {
        let start = Instant::now();

        let rasterised = render::rasterise(&self.rasteriser, document, &self.config.pages).await?;
        if rasterised.pages.is_empty() {
            return Err(DocumentError::NoPagesInRange {
                filename: document.filename.clone(),
                page_count: rasterised.page_count,
            });
        }
        let pages: Vec<usize> = rasterised.pages.iter().map(|p| p.page_num).collect();
        debug!("{}: rasterised pages {:?}", document.filename, pages);

        let reply = llm::request_extraction(
            self.backend.as_ref(),
            &document.filename,
            &rasterised.pages,
            &self.config,
        )
        .await
        .map_err(|source| DocumentError::ExternalService {
            filename: document.filename.clone(),
            source,
        })?;
        drop(rasterised);

        let (fields, parse_status) = normalize_response(&reply.content);

        Ok(ExtractionRecord {
            filename: document.filename.clone(),
            fields,
            parse_status,
            pages,
            input_tokens: reply.prompt_tokens,
            output_tokens: reply.completion_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn outcome(&self, document: &Document) -> DocumentOutcome {
        match self.extract(document).await {
            Ok(record) => DocumentOutcome::Extracted(record),
            Err(e) => {
                warn!("Document failed: {}", e);
                DocumentOutcome::Failed(e)
            }
        }
    }
}

/// One user's working context: config, pipeline, records, and mirror.
pub struct Session {
    extractor: Extractor,
    store: RecordStore,
    mirror: Option<CsvMirror>,
    progress: Option<ProgressCallback>,
}

impl Session {
    /// Build a session around explicit pipeline backends.
    pub fn new(
        config: ExtractionConfig,
        rasteriser: Arc<dyn Rasteriser>,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            extractor: Extractor::new(config, rasteriser, backend),
            store: RecordStore::new(),
            mirror: None,
            progress: None,
        }
    }

    /// Build a session using pdfium and the configured OpenAI-compatible endpoint.
    pub fn from_config(config: ExtractionConfig) -> Self {
        let rasteriser: Arc<dyn Rasteriser> =
            Arc::new(PdfiumRasteriser::new(config.max_rendered_pixels));
        let backend: Arc<dyn ExtractionBackend> = Arc::new(ProviderBackend::from_config(&config));
        Self::new(config, rasteriser, backend)
    }

    /// Mirror every stored record to this CSV file.
    pub fn with_mirror(mut self, mirror: CsvMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        self.extractor.config()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        self.store.records()
    }

    /// Stored records whose skills match `query`.
    pub fn filter(&self, query: &str) -> Vec<&ExtractionRecord> {
        self.store.filter(query)
    }

    /// Page count of a document, without rendering or calling the model.
    pub async fn page_count(&self, document: &Document) -> Result<usize, DocumentError> {
        render::page_count(&self.extractor.rasteriser, document).await
    }

    /// Process a single document; see [`Session::process_batch`].
    pub async fn process_document(
        &mut self,
        document: Document,
    ) -> Result<DocumentOutcome, ResumeError> {
        let mut report = self.process_batch(vec![document]).await?;
        report
            .outcomes
            .pop()
            .ok_or_else(|| ResumeError::Internal("batch of one produced no outcome".into()))
    }

    /// Process documents in isolation from one another.
    ///
    /// Per-document failures are reported in the returned outcomes. Only a
    /// mirror write failure stops the batch; records already stored remain.
    pub async fn process_batch(
        &mut self,
        documents: Vec<Document>,
    ) -> Result<BatchReport, ResumeError> {
        let batch_start = Instant::now();
        let total = documents.len();
        let concurrency = self.extractor.config.concurrency.max(1);
        info!(
            "Processing {} document(s), concurrency {}",
            total, concurrency
        );

        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let extractor = &self.extractor;
        let progress = self.progress.clone();
        let results = stream::iter(documents.into_iter().enumerate().map(|(i, doc)| {
            let progress = progress.clone();
            async move {
                if let Some(ref cb) = progress {
                    cb.on_document_start(i + 1, total, &doc.filename);
                }
                extractor.outcome(&doc).await
            }
        }))
        .buffered(concurrency);
        futures::pin_mut!(results);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = results.next().await {
            let index = outcomes.len() + 1;
            match &outcome {
                DocumentOutcome::Extracted(record) => {
                    commit(&mut self.store, self.mirror.as_ref(), record)?;
                    info!(
                        "{}: extracted ({} skills, {} work entries{})",
                        record.filename,
                        record.fields.skills.len(),
                        record.fields.work_experience.len(),
                        if record.is_fallback() { ", fallback" } else { "" }
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_document_complete(index, total, record);
                    }
                }
                DocumentOutcome::Failed(e) => {
                    if let Some(ref cb) = self.progress {
                        cb.on_document_error(index, total, e);
                    }
                }
            }
            outcomes.push(outcome);
        }

        let summary =
            BatchSummary::from_outcomes(&outcomes, batch_start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {}/{} extracted, {} fallback, {} failed, {}ms",
            summary.extracted, summary.total_documents, summary.fallbacks, summary.failed,
            summary.total_duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(&summary);
        }

        Ok(BatchReport { outcomes, summary })
    }
}

/// Store a record in memory, then append it to the mirror.
fn commit(
    store: &mut RecordStore,
    mirror: Option<&CsvMirror>,
    record: &ExtractionRecord,
) -> Result<(), ResumeError> {
    store.push(record.clone());
    if let Some(mirror) = mirror {
        mirror.append(record)?;
    }
    Ok(())
}
