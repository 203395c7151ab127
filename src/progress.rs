//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::session::Session::with_progress`] to receive events as a batch is
//! processed. All methods default to no-ops so implementors override only
//! what they need.
//!
//! # Example
//!
//! ```rust
//! use edgequake_resume::{ExtractionProgressCallback, ExtractionRecord};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for Counter {
//!     fn on_document_complete(&self, _index: usize, _total: usize, record: &ExtractionRecord) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done", record.filename);
//!     }
//! }
//! ```

use crate::error::DocumentError;
use crate::record::{BatchSummary, ExtractionRecord};
use std::sync::Arc;

/// Called by a [`crate::session::Session`] as it processes each document.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1`, start
/// events for different documents may fire from different tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first document is touched.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is rasterised.
    ///
    /// * `index`: 1-indexed position in the batch
    fn on_document_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called after a document's record has been stored and mirrored.
    fn on_document_complete(&self, index: usize, total: usize, record: &ExtractionRecord) {
        let _ = (index, total, record);
    }

    /// Called when a document fails; the batch continues.
    fn on_document_error(&self, index: usize, total: usize, error: &DocumentError) {
        let _ = (index, total, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ExtractedFields, ParseStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_document_start(&self, _index: usize, _total: usize, _filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _index: usize, _total: usize, _record: &ExtractionRecord) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _index: usize, _total: usize, _error: &DocumentError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(2);
        cb.on_document_start(1, 2, "a.pdf");
        cb.on_batch_complete(&BatchSummary::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let record = ExtractionRecord {
            filename: "a.pdf".into(),
            fields: ExtractedFields::default(),
            parse_status: ParseStatus::Parsed,
            pages: vec![1],
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        };
        let err = DocumentError::DocumentFormat {
            filename: "b.pdf".into(),
            detail: "bad xref".into(),
        };

        tracker.on_document_start(1, 2, "a.pdf");
        tracker.on_document_complete(1, 2, &record);
        tracker.on_document_start(2, 2, "b.pdf");
        tracker.on_document_error(2, 2, &err);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
