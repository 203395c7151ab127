//! # edgequake-resume
//!
//! Extract structured resume fields (name, email, phone, skills, work
//! history) from PDF pages using Vision Language Models.
//!
//! Each selected page is rasterised to a PNG, sent together with a fixed
//! instruction in one multimodal request, and the model's JSON reply is
//! normalised into an [`ExtractionRecord`]. Records accumulate in a
//! session-scoped store that can be filtered by skill, and are mirrored to an
//! append-only CSV file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Render     rasterise selected pages via pdfium (scoped temp file)
//!  ├─ 2. Encode     PNG → base64 data URI
//!  ├─ 3. VLM        one chat-completions request per document
//!  ├─ 4. Normalise  strip code fences, parse JSON, default missing fields
//!  └─ 5. Store      append to the session store and the CSV mirror
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_resume::{CsvMirror, Document, ExtractionConfig, PageSelection, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("GITHUB_TOKEN")?)
//!         .pages(PageSelection::Set(vec![1, 2]))
//!         .build()?;
//!
//!     let mut session = Session::from_config(config)
//!         .with_mirror(CsvMirror::new("resumes.csv"));
//!
//!     let doc = Document::from_path("cv.pdf").await?;
//!     let report = session.process_batch(vec![doc]).await?;
//!     eprintln!("{} extracted, {} failed", report.summary.extracted, report.summary.failed);
//!
//!     for record in session.filter("python") {
//!         println!("{}", edgequake_resume::view::render_record(record));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-extract` binary (clap + anyhow + tracing-subscriber) |
//!
//! Model calls go through [`edgequake_llm`]; [`ProviderBackend::new`] accepts
//! any of its providers.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod session;
pub mod store;
pub mod view;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ImageDetail, PageSelection};
pub use error::{DocumentError, ExternalServiceError, ResumeError};
pub use pipeline::llm::{ChatRequest, ExtractionBackend, ModelReply, ProviderBackend};
pub use pipeline::render::{PdfiumRasteriser, RasterisedDocument, Rasteriser};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{
    BatchSummary, Document, DocumentOutcome, ExtractedFields, ExtractionRecord, PageImage,
    ParseStatus, WorkExperience, WorkExperienceEntry,
};
pub use session::{BatchReport, Extractor, Session};
pub use store::{filter_by_skill, CsvMirror, RecordStore};
