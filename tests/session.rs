//! Session-level integration tests.
//!
//! The rasteriser and the model are replaced by in-process fakes so these run
//! without pdfium or network access. The fake rasteriser tags each page image
//! with its document name, which the scripted backend uses to pick a reply.
//!
//! Run with:
//!   cargo test --test session -- --nocapture
//!
//! The pdfium-backed test is ignored by default:
//!   PDFIUM_LIB_PATH=/path/to/lib cargo test --test session -- --ignored

use async_trait::async_trait;
use edgequake_resume::store::MIRROR_HEADER;
use edgequake_resume::{
    BatchSummary, ChatRequest, CsvMirror, Document, DocumentError, DocumentOutcome,
    ExtractionBackend, ExtractionConfig, ExtractionProgressCallback, ExtractionRecord,
    ExternalServiceError, ImageDetail, ModelReply, PageImage, PageSelection, ParseStatus,
    RasterisedDocument, Rasteriser, ResumeError, Session, WorkExperienceEntry,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Rasteriser that knows each document's page count by filename.
struct FakeRasteriser {
    page_counts: HashMap<String, usize>,
}

impl FakeRasteriser {
    fn new(docs: &[(&str, usize)]) -> Arc<Self> {
        Arc::new(Self {
            page_counts: docs.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
        })
    }
}

impl Rasteriser for FakeRasteriser {
    fn page_count(&self, document: &Document) -> Result<usize, DocumentError> {
        self.page_counts
            .get(&document.filename)
            .copied()
            .ok_or_else(|| DocumentError::DocumentFormat {
                filename: document.filename.clone(),
                detail: "not a PDF document".into(),
            })
    }

    fn rasterise(
        &self,
        document: &Document,
        selection: &PageSelection,
    ) -> Result<RasterisedDocument, DocumentError> {
        let page_count = self.page_count(document)?;
        let pages = selection
            .to_indices(page_count)
            .into_iter()
            .map(|idx| PageImage {
                page_num: idx + 1,
                width: 10,
                height: 10,
                data: format!("{}#{}", document.filename, idx + 1),
                mime_type: "image/png",
            })
            .collect();
        Ok(RasterisedDocument { page_count, pages })
    }
}

/// A scripted reply: the raw model text or an error, after an optional delay.
#[derive(Clone)]
struct Script {
    reply: Result<String, ExternalServiceError>,
    delay: Duration,
}

/// Backend that answers according to a per-document script and records
/// every request it receives.
#[derive(Default)]
struct ScriptedBackend {
    scripts: HashMap<String, Script>,
    requests: Mutex<Vec<(String, ChatRequest)>>,
}

impl ScriptedBackend {
    fn reply(mut self, filename: &str, text: &str) -> Self {
        self.scripts.insert(
            filename.to_string(),
            Script {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
            },
        );
        self
    }

    fn fail(mut self, filename: &str, err: ExternalServiceError) -> Self {
        self.scripts.insert(
            filename.to_string(),
            Script {
                reply: Err(err),
                delay: Duration::ZERO,
            },
        );
        self
    }

    fn delayed(mut self, filename: &str, text: &str, delay_ms: u64) -> Self {
        self.scripts.insert(
            filename.to_string(),
            Script {
                reply: Ok(text.to_string()),
                delay: Duration::from_millis(delay_ms),
            },
        );
        self
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_for(&self, filename: &str) -> Option<ChatRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(f, _)| f == filename)
            .map(|(_, r)| r.clone())
    }
}

/// All `data:` URIs attached to the request's messages.
fn image_urls(request: &ChatRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter_map(|m| m.images.as_ref())
        .flatten()
        .map(|img| img.to_data_uri())
        .collect()
}

/// Document name encoded in the first image by [`FakeRasteriser`].
fn tagged_filename(request: &ChatRequest) -> String {
    image_urls(request)
        .first()
        .and_then(|url| url.strip_prefix("data:image/png;base64,"))
        .and_then(|tag| tag.split('#').next())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ModelReply, ExternalServiceError> {
        let filename = tagged_filename(request);
        self.requests
            .lock()
            .unwrap()
            .push((filename.clone(), request.clone()));

        let script = self
            .scripts
            .get(&filename)
            .cloned()
            .unwrap_or_else(|| Script {
                reply: Err(ExternalServiceError::EmptyResponse),
                delay: Duration::ZERO,
            });
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        script.reply.map(|content| ModelReply {
            content,
            prompt_tokens: 100,
            completion_tokens: 20,
        })
    }
}

/// Records the order of completion events.
#[derive(Default)]
struct OrderTracker {
    completed: Mutex<Vec<(usize, String)>>,
    failed: Mutex<Vec<usize>>,
    summary: Mutex<Option<BatchSummary>>,
}

impl ExtractionProgressCallback for OrderTracker {
    fn on_document_complete(&self, index: usize, _total: usize, record: &ExtractionRecord) {
        self.completed
            .lock()
            .unwrap()
            .push((index, record.filename.clone()));
    }

    fn on_document_error(&self, index: usize, _total: usize, _error: &DocumentError) {
        self.failed.lock().unwrap().push(index);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        *self.summary.lock().unwrap() = Some(summary.clone());
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ADA: &str = r#"```json
{
  "name": "Ada Lovelace",
  "email": "ada@example.com",
  "phone": "+44 20 0000 0000",
  "skills": ["Python", "Mathematics"],
  "work_experience": [
    {"company": "Analytical Engines Ltd", "title": "Programmer", "years": "1842-1843"}
  ]
}
```"#;

const GRACE: &str = r#"{
  "name": "Grace Hopper",
  "email": "grace@example.com",
  "phone": "",
  "skills": ["COBOL", "Java"],
  "work_experience": ["Taught mathematics at Vassar"]
}"#;

fn doc(name: &str) -> Document {
    Document::new(name, b"%PDF-1.7\n".to_vec())
}

fn config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key("test-key")
        .build()
        .unwrap()
}

fn session(
    config: ExtractionConfig,
    pages: &[(&str, usize)],
    backend: Arc<ScriptedBackend>,
) -> Session {
    init_tracing();
    Session::new(config, FakeRasteriser::new(pages), backend)
}

fn read_mirror(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_isolates_each_document() {
    let dir = tempfile::tempdir().unwrap();
    let mirror_path = dir.path().join("resumes.csv");

    let backend = Arc::new(
        ScriptedBackend::default()
            .reply("ada.pdf", ADA)
            .fail(
                "limited.pdf",
                ExternalServiceError::RateLimited {
                    detail: "retry in 30s".into(),
                },
            )
            .reply("garbled.pdf", "Sorry, I cannot read this resume."),
    );
    let mut session = session(
        config(),
        &[("ada.pdf", 2), ("limited.pdf", 1), ("garbled.pdf", 1)],
        Arc::clone(&backend),
    )
    .with_mirror(CsvMirror::new(&mirror_path));

    let report = session
        .process_batch(vec![
            doc("ada.pdf"),
            doc("limited.pdf"),
            doc("not-a-pdf.txt"),
            doc("garbled.pdf"),
        ])
        .await
        .unwrap();

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.filename()).collect();
    assert_eq!(
        names,
        vec!["ada.pdf", "limited.pdf", "not-a-pdf.txt", "garbled.pdf"]
    );

    let ada = report.outcomes[0].record().unwrap();
    assert_eq!(ada.parse_status, ParseStatus::Parsed);
    assert_eq!(ada.fields.name, "Ada Lovelace");
    assert_eq!(ada.fields.skills, vec!["Python", "Mathematics"]);
    assert_eq!(ada.pages, vec![1]);
    assert_eq!(ada.input_tokens, 100);

    let limited = report.outcomes[1].error().unwrap();
    assert!(limited.is_external());
    assert!(matches!(
        limited,
        DocumentError::ExternalService {
            source: ExternalServiceError::RateLimited { .. },
            ..
        }
    ));

    assert!(matches!(
        report.outcomes[2],
        DocumentOutcome::Failed(DocumentError::DocumentFormat { .. })
    ));

    let garbled = report.outcomes[3].record().unwrap();
    assert!(garbled.is_fallback());
    assert!(garbled.fields.is_empty());

    assert_eq!(report.summary.total_documents, 4);
    assert_eq!(report.summary.extracted, 2);
    assert_eq!(report.summary.fallbacks, 1);
    assert_eq!(report.summary.failed, 2);

    // The unreadable document never reached the model.
    assert_eq!(backend.calls(), 3);

    let stored: Vec<&str> = session
        .records()
        .iter()
        .map(|r| r.filename.as_str())
        .collect();
    assert_eq!(stored, vec!["ada.pdf", "garbled.pdf"]);

    let rows = read_mirror(&mirror_path);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], MIRROR_HEADER.to_vec());
    assert_eq!(rows[1][0], "ada.pdf");
    assert_eq!(rows[1][4], "Python, Mathematics");
    assert!(rows[1][5].contains("Analytical Engines Ltd"));
    assert_eq!(
        rows[2],
        vec!["garbled.pdf", "", "", "", "", "[]"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn request_carries_sampling_parameters_and_prompt() {
    let backend = Arc::new(ScriptedBackend::default().reply("ada.pdf", ADA));
    let config = ExtractionConfig::builder()
        .api_key("test-key")
        .temperature(0.0)
        .max_tokens(512)
        .top_p(0.9)
        .image_detail(ImageDetail::High)
        .pages(PageSelection::Range(1, 2))
        .system_prompt("Return JSON only.")
        .build()
        .unwrap();
    let mut session = session(config, &[("ada.pdf", 4)], Arc::clone(&backend));

    session.process_document(doc("ada.pdf")).await.unwrap();

    let request = backend.request_for("ada.pdf").unwrap();
    assert_eq!(request.options.temperature, Some(0.0));
    assert_eq!(request.options.max_tokens, Some(512));
    assert_eq!(request.options.top_p, Some(0.9));
    assert_eq!(request.messages[0].content, "Return JSON only.");
    assert_eq!(request.messages[1].content, "Extract fields from this resume.");

    let urls = image_urls(&request);
    assert_eq!(
        urls,
        vec![
            "data:image/png;base64,ada.pdf#1".to_string(),
            "data:image/png;base64,ada.pdf#2".to_string(),
        ]
    );

    let images = request.messages[1].images.as_ref().unwrap();
    assert!(images.iter().all(|img| img.detail.as_deref() == Some("high")));
}

#[tokio::test]
async fn pages_beyond_the_document_are_skipped() {
    let backend = Arc::new(
        ScriptedBackend::default()
            .reply("short.pdf", GRACE)
            .reply("tiny.pdf", GRACE),
    );
    let config = ExtractionConfig::builder()
        .pages(PageSelection::Set(vec![1, 5]))
        .build()
        .unwrap();
    let mut session = session(
        config,
        &[("short.pdf", 3), ("tiny.pdf", 3)],
        Arc::clone(&backend),
    );

    let outcome = session.process_document(doc("short.pdf")).await.unwrap();
    let record = outcome.record().unwrap();
    assert_eq!(record.pages, vec![1]);
    assert_eq!(image_urls(&backend.request_for("short.pdf").unwrap()).len(), 1);

    // Grace's bare-string history entry is kept as a note.
    assert_eq!(
        record.fields.work_experience,
        vec![WorkExperienceEntry::Note("Taught mathematics at Vassar".into())]
    );
}

#[tokio::test]
async fn no_pages_in_range_skips_the_model() {
    let backend = Arc::new(ScriptedBackend::default().reply("tiny.pdf", GRACE));
    let config = ExtractionConfig::builder()
        .pages(PageSelection::Range(4, 6))
        .build()
        .unwrap();
    let mut session = session(config, &[("tiny.pdf", 3)], Arc::clone(&backend));

    let outcome = session.process_document(doc("tiny.pdf")).await.unwrap();
    match outcome {
        DocumentOutcome::Failed(DocumentError::NoPagesInRange { page_count, .. }) => {
            assert_eq!(page_count, 3)
        }
        other => panic!("expected NoPagesInRange, got {other:?}"),
    }
    assert_eq!(backend.calls(), 0);
    assert!(session.records().is_empty());
}

#[tokio::test]
async fn concurrent_extraction_commits_in_upload_order() {
    let dir = tempfile::tempdir().unwrap();
    let mirror_path = dir.path().join("out").join("resumes.csv");

    let backend = Arc::new(
        ScriptedBackend::default()
            .delayed("first.pdf", ADA, 150)
            .delayed("second.pdf", GRACE, 50)
            .delayed("third.pdf", ADA, 0),
    );
    let tracker = Arc::new(OrderTracker::default());
    let config = ExtractionConfig::builder().concurrency(3).build().unwrap();
    let mut session = session(
        config,
        &[("first.pdf", 1), ("second.pdf", 1), ("third.pdf", 1)],
        backend,
    )
    .with_mirror(CsvMirror::new(&mirror_path))
    .with_progress(tracker.clone());

    session
        .process_batch(vec![doc("first.pdf"), doc("second.pdf"), doc("third.pdf")])
        .await
        .unwrap();

    let stored: Vec<&str> = session
        .records()
        .iter()
        .map(|r| r.filename.as_str())
        .collect();
    assert_eq!(stored, vec!["first.pdf", "second.pdf", "third.pdf"]);

    let mirrored: Vec<String> = read_mirror(&mirror_path)
        .into_iter()
        .skip(1)
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(mirrored, vec!["first.pdf", "second.pdf", "third.pdf"]);

    let completed = tracker.completed.lock().unwrap().clone();
    assert_eq!(
        completed,
        vec![
            (1, "first.pdf".to_string()),
            (2, "second.pdf".to_string()),
            (3, "third.pdf".to_string()),
        ]
    );
    assert!(tracker.failed.lock().unwrap().is_empty());
    let summary = tracker.summary.lock().unwrap().clone().unwrap();
    assert_eq!(summary.extracted, 3);
}

#[tokio::test]
async fn mirror_is_shared_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mirror_path = dir.path().join("resumes.csv");

    for (name, reply) in [("ada.pdf", ADA), ("grace.pdf", GRACE)] {
        let backend = Arc::new(ScriptedBackend::default().reply(name, reply));
        let mut session = session(config(), &[(name, 1)], backend)
            .with_mirror(CsvMirror::new(&mirror_path));
        session.process_document(doc(name)).await.unwrap();
        assert_eq!(session.records().len(), 1);
    }

    let rows = read_mirror(&mirror_path);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], MIRROR_HEADER.to_vec());
    assert_eq!(rows[1][1], "Ada Lovelace");
    assert_eq!(rows[2][1], "Grace Hopper");
}

#[tokio::test]
async fn mirror_failure_stops_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        ScriptedBackend::default()
            .reply("ada.pdf", ADA)
            .reply("grace.pdf", GRACE),
    );
    // A directory cannot be opened for appending.
    let mut session = session(
        config(),
        &[("ada.pdf", 1), ("grace.pdf", 1)],
        Arc::clone(&backend),
    )
    .with_mirror(CsvMirror::new(dir.path()));

    let err = session
        .process_batch(vec![doc("ada.pdf"), doc("grace.pdf")])
        .await
        .unwrap_err();
    assert!(matches!(err, ResumeError::MirrorWriteFailed { .. }));
}

#[tokio::test]
async fn filter_matches_skill_substrings() {
    let backend = Arc::new(
        ScriptedBackend::default()
            .reply("ada.pdf", ADA)
            .reply("grace.pdf", GRACE),
    );
    let mut session = session(config(), &[("ada.pdf", 1), ("grace.pdf", 1)], backend);
    session
        .process_batch(vec![doc("ada.pdf"), doc("grace.pdf")])
        .await
        .unwrap();

    let names = |q: &str| -> Vec<String> {
        session
            .filter(q)
            .into_iter()
            .map(|r| r.filename.clone())
            .collect()
    };
    assert_eq!(names("PYTH"), vec!["ada.pdf"]);
    assert_eq!(names("a"), vec!["ada.pdf", "grace.pdf"]);
    assert_eq!(names("   "), vec!["ada.pdf", "grace.pdf"]);
    assert!(names("rust").is_empty());
    assert_eq!(session.records().len(), 2);
}

#[tokio::test]
async fn page_count_does_not_call_the_model() {
    let backend = Arc::new(ScriptedBackend::default());
    let session = session(config(), &[("ada.pdf", 7)], Arc::clone(&backend));

    assert_eq!(session.page_count(&doc("ada.pdf")).await.unwrap(), 7);
    assert!(session.page_count(&doc("missing.pdf")).await.is_err());
    assert_eq!(backend.calls(), 0);
}

// ── pdfium-backed rasteriser ─────────────────────────────────────────────────

/// A one-page, blank A4 PDF with a correct cross-reference table.
fn minimal_pdf() -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Resources << >> >>",
    ];
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

#[test]
#[ignore = "needs libpdfium: set PDFIUM_LIB_PATH and run with --ignored"]
fn pdfium_renders_selected_pages() {
    use edgequake_resume::PdfiumRasteriser;

    let rasteriser = PdfiumRasteriser::new(400);
    rasteriser
        .check_binding()
        .expect("pdfium library must be bindable for this test");

    let document = Document::new("blank.pdf", minimal_pdf());
    assert_eq!(rasteriser.page_count(&document).unwrap(), 1);

    let out = rasteriser
        .rasterise(&document, &PageSelection::Set(vec![1, 5]))
        .unwrap();
    assert_eq!(out.page_count, 1);
    assert_eq!(out.pages.len(), 1);
    assert_eq!(out.pages[0].page_num, 1);
    assert!(out.pages[0].width.max(out.pages[0].height) <= 400);
    assert_eq!(out.pages[0].mime_type, "image/png");
    assert!(!out.pages[0].data.is_empty());

    let err = rasteriser
        .rasterise(&Document::new("cv.docx", b"PK\x03\x04".to_vec()), &PageSelection::All)
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotAPdf { .. }));
}
