//! PDF rasterisation: render selected pages of an in-memory PDF.
//!
//! pdfium wants a file-system path, so the document bytes are written to a
//! [`tempfile::NamedTempFile`] for the duration of one call. The file is
//! removed when the handle drops, on success, error and panic alike.
//!
//! pdfium is not async-safe; [`rasterise`] moves the work onto the blocking
//! pool with `spawn_blocking`.

use crate::config::PageSelection;
use crate::error::{DocumentError, ResumeError};
use crate::pipeline::encode::encode_page;
use crate::record::{Document, PageImage};
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Result of rasterising one document.
#[derive(Debug, Clone)]
pub struct RasterisedDocument {
    /// Total pages in the document.
    pub page_count: usize,
    /// One image per selected page that exists, in page order.
    pub pages: Vec<PageImage>,
}

/// Something that turns PDF bytes into page images.
///
/// Implementations run on the blocking pool and must never return an image
/// for a page number outside `1..=page_count`.
pub trait Rasteriser: Send + Sync {
    /// Count pages without rendering.
    fn page_count(&self, document: &Document) -> Result<usize, DocumentError>;

    /// Render the selected pages that exist; others are skipped.
    fn rasterise(
        &self,
        document: &Document,
        selection: &PageSelection,
    ) -> Result<RasterisedDocument, DocumentError>;
}

/// Run a rasteriser on the blocking pool.
pub async fn rasterise(
    rasteriser: &Arc<dyn Rasteriser>,
    document: &Document,
    selection: &PageSelection,
) -> Result<RasterisedDocument, DocumentError> {
    let rasteriser = Arc::clone(rasteriser);
    let doc = document.clone();
    let selection = selection.clone();

    tokio::task::spawn_blocking(move || rasteriser.rasterise(&doc, &selection))
        .await
        .map_err(|e| DocumentError::EngineUnavailable {
            filename: document.filename.clone(),
            detail: format!("render task panicked: {e}"),
        })?
}

/// Count pages on the blocking pool.
pub async fn page_count(
    rasteriser: &Arc<dyn Rasteriser>,
    document: &Document,
) -> Result<usize, DocumentError> {
    let rasteriser = Arc::clone(rasteriser);
    let doc = document.clone();

    tokio::task::spawn_blocking(move || rasteriser.page_count(&doc))
        .await
        .map_err(|e| DocumentError::EngineUnavailable {
            filename: document.filename.clone(),
            detail: format!("page-count task panicked: {e}"),
        })?
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// [`Rasteriser`] backed by the pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasteriser {
    /// Longest rendered edge in pixels.
    max_pixels: u32,
    /// Explicit library location; falls back to `PDFIUM_LIB_PATH`, then
    /// the working directory, then the system search path.
    library_path: Option<PathBuf>,
}

impl PdfiumRasteriser {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            max_pixels,
            library_path: None,
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Bind once to confirm a pdfium library is reachable.
    pub fn check_binding(&self) -> Result<(), ResumeError> {
        self.bind().map(|_| ()).map_err(ResumeError::PdfiumBindingFailed)
    }

    fn bind(&self) -> Result<Pdfium, String> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(library_file(&path)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| format!("{:?}", e))?;

        Ok(Pdfium::new(bindings))
    }

    /// Bind pdfium and open the document from a scoped temporary file.
    ///
    /// The document is closed before its backing file is removed.
    fn with_document<T>(
        &self,
        document: &Document,
        f: impl FnOnce(&PdfDocument<'_>) -> Result<T, DocumentError>,
    ) -> Result<T, DocumentError> {
        check_magic(document)?;

        let pdfium = self.bind().map_err(|detail| DocumentError::EngineUnavailable {
            filename: document.filename.clone(),
            detail,
        })?;

        let tmp = write_scoped(document)?;
        let pdf = pdfium
            .load_pdf_from_file(tmp.path(), None)
            .map_err(|e| DocumentError::DocumentFormat {
                filename: document.filename.clone(),
                detail: format!("{:?}", e),
            })?;

        let result = f(&pdf);
        drop(pdf);
        drop(tmp);
        result
    }
}

impl Rasteriser for PdfiumRasteriser {
    fn page_count(&self, document: &Document) -> Result<usize, DocumentError> {
        self.with_document(document, |pdf| Ok(pdf.pages().len() as usize))
    }

    fn rasterise(
        &self,
        document: &Document,
        selection: &PageSelection,
    ) -> Result<RasterisedDocument, DocumentError> {
        let max_pixels = self.max_pixels.max(100) as i32;

        self.with_document(document, |pdf| {
            let pages = pdf.pages();
            let total_pages = pages.len() as usize;
            info!("{}: PDF loaded, {} pages", document.filename, total_pages);

            let indices = selection.to_indices(total_pages);
            if let PageSelection::Set(requested) = selection {
                for p in requested.iter().filter(|&&p| p == 0 || p > total_pages) {
                    warn!(
                        "{}: skipping page {} (out of range, total={})",
                        document.filename, p, total_pages
                    );
                }
            }

            let render_config = PdfRenderConfig::new()
                .set_target_width(max_pixels)
                .set_maximum_height(max_pixels);

            let mut images = Vec::with_capacity(indices.len());
            for idx in indices {
                let page_num = idx + 1;
                let failed = |detail: String| DocumentError::RasterisationFailed {
                    filename: document.filename.clone(),
                    page: page_num,
                    detail,
                };

                let page = pages.get(idx as u16).map_err(|e| failed(format!("{:?}", e)))?;
                let bitmap = page
                    .render_with_config(&render_config)
                    .map_err(|e| failed(format!("{:?}", e)))?;
                let image = bitmap.as_image();
                debug!(
                    "{}: rendered page {} → {}x{} px",
                    document.filename,
                    page_num,
                    image.width(),
                    image.height()
                );

                let encoded = encode_page(&image, page_num)
                    .map_err(|e| failed(format!("image encoding failed: {e}")))?;
                images.push(encoded);
            }

            Ok(RasterisedDocument {
                page_count: total_pages,
                pages: images,
            })
        })
    }
}

/// Resolve a directory to the platform library file inside it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        let dir = path.to_string_lossy().into_owned();
        PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(dir.as_str()))
    } else {
        path.to_path_buf()
    }
}

/// Reject byte streams that do not start with `%PDF`.
pub fn check_magic(document: &Document) -> Result<(), DocumentError> {
    if document.bytes.len() < 4 || &document.bytes[..4] != b"%PDF" {
        return Err(DocumentError::NotAPdf {
            filename: document.filename.clone(),
            magic: document.bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Write the document to a temporary file removed on drop.
fn write_scoped(document: &Document) -> Result<NamedTempFile, DocumentError> {
    let temp_err = |e: std::io::Error| DocumentError::TempFile {
        filename: document.filename.clone(),
        detail: e.to_string(),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("resume-")
        .suffix(".pdf")
        .tempfile()
        .map_err(temp_err)?;
    tmp.write_all(&document.bytes).map_err(temp_err)?;
    tmp.flush().map_err(temp_err)?;
    debug!(
        "{}: staged {} bytes at {}",
        document.filename,
        document.bytes.len(),
        tmp.path().display()
    );
    Ok(tmp)
}
