//! Error types for the edgequake-resume library.
//!
//! Two tiers of failure:
//!
//! * [`ResumeError`]: **Fatal to the call**: the session cannot do the
//!   requested work at all (bad configuration, pdfium not bindable, mirror
//!   file not writable). Returned as `Err(ResumeError)`.
//!
//! * [`DocumentError`]: **Isolated to one document**: the PDF was unreadable
//!   or the model call failed. Stored inside
//!   [`crate::record::DocumentOutcome`] so sibling documents in the same batch
//!   still complete.
//!
//! An unparseable model response is deliberately *not* an error. The
//! normaliser substitutes the empty record and flags it with
//! [`crate::record::ParseStatus::Fallback`].

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the edgequake-resume library.
#[derive(Debug, Error)]
pub enum ResumeError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium, or install libpdfium\n\
into a directory on the system library search path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not append a row to the durable mirror file.
    #[error("Failed to append to mirror file '{path}': {source}")]
    MirrorWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row could not be serialised to CSV.
    #[error("Failed to encode mirror row: {0}")]
    MirrorEncode(#[from] csv::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure that aborts processing of a single document only.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The bytes do not start with the `%PDF` magic.
    #[error("'{filename}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { filename: String, magic: Vec<u8> },

    /// pdfium could not open the document.
    #[error("'{filename}' is not a readable PDF: {detail}")]
    DocumentFormat { filename: String, detail: String },

    /// A page opened but could not be rendered or encoded.
    #[error("'{filename}': rasterisation failed for page {page}: {detail}")]
    RasterisationFailed {
        filename: String,
        page: usize,
        detail: String,
    },

    /// None of the selected page numbers exist in the document.
    #[error("'{filename}': no selected page lies within 1..={page_count}")]
    NoPagesInRange { filename: String, page_count: usize },

    /// The pdfium engine could not be bound or the render task died.
    #[error("'{filename}': PDF engine unavailable: {detail}")]
    EngineUnavailable { filename: String, detail: String },

    /// The scoped working file could not be created or written.
    #[error("'{filename}': temporary file error: {detail}")]
    TempFile { filename: String, detail: String },

    /// The model call failed.
    #[error("'{filename}': {source}")]
    ExternalService {
        filename: String,
        #[source]
        source: ExternalServiceError,
    },
}

impl DocumentError {
    /// Name of the document this error belongs to.
    pub fn filename(&self) -> &str {
        match self {
            DocumentError::NotAPdf { filename, .. }
            | DocumentError::DocumentFormat { filename, .. }
            | DocumentError::RasterisationFailed { filename, .. }
            | DocumentError::NoPagesInRange { filename, .. }
            | DocumentError::EngineUnavailable { filename, .. }
            | DocumentError::TempFile { filename, .. }
            | DocumentError::ExternalService { filename, .. } => filename,
        }
    }

    /// Whether the failure came from the model call rather than the PDF.
    pub fn is_external(&self) -> bool {
        matches!(self, DocumentError::ExternalService { .. })
    }
}

/// Failure of the single model request made for a document.
///
/// No variant is retried: one attempt per document is the whole contract.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExternalServiceError {
    /// The credential was rejected.
    #[error("authentication rejected by model endpoint: {detail}")]
    Auth { detail: String },

    /// The endpoint is throttling requests.
    #[error("rate limit exceeded at model endpoint: {detail}")]
    RateLimited { detail: String },

    /// The endpoint refused the request itself (unknown model, too many tokens).
    #[error("model endpoint rejected the request: {detail}")]
    InvalidRequest { detail: String },

    /// Any other provider-side failure.
    #[error("model endpoint error: {detail}")]
    Api { detail: String },

    /// The request did not complete within the configured timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection or body decoding failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with blank message content.
    #[error("model response contained no text")]
    EmptyResponse,
}
