//! Data model: uploaded documents, rasterised pages, and extraction records.

use crate::config::ImageDetail;
use crate::error::DocumentError;
use edgequake_llm::ImageData;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Document {
    /// Display name, also the first mirror column.
    pub filename: String,
    /// Raw PDF bytes.
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a document from disk, naming it after the file's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}

/// One rasterised page, already encoded for transport.
///
/// Created by the rasteriser and dropped once the request using it returns.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number within the owning document.
    pub page_num: usize,
    pub width: u32,
    pub height: u32,
    /// Base64 PNG payload.
    pub data: String,
    pub mime_type: &'static str,
}

impl PageImage {
    /// Provider image part carrying this page and the vision detail hint.
    pub fn to_image_data(&self, detail: ImageDetail) -> ImageData {
        ImageData::new(self.data.clone(), self.mime_type).with_detail(detail.as_str())
    }
}

/// The five fields extracted from a resume.
///
/// Every field is always present; absence is represented by an empty string
/// or empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub skills: Vec<String>,
    pub work_experience: Vec<WorkExperienceEntry>,
}

impl ExtractedFields {
    /// `true` when no field carries any content.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.email.is_empty()
            && self.phone.is_empty()
            && self.skills.is_empty()
            && self.work_experience.is_empty()
    }

    /// Skills joined with `", "`, as stored in the mirror and summary table.
    pub fn skills_joined(&self) -> String {
        self.skills.join(", ")
    }

    /// Whether at least one work entry is a structured role.
    pub fn has_structured_experience(&self) -> bool {
        self.work_experience
            .iter()
            .any(|e| matches!(e, WorkExperienceEntry::Role(_)))
    }
}

/// One job in the work history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkExperience {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub years: String,
}

/// A work-history entry as returned by the model.
///
/// Models usually return objects, but occasionally a bare string such as
/// `"Engineer at Acme (2019-2021)"`. Those are kept verbatim as notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkExperienceEntry {
    Role(WorkExperience),
    Note(String),
}

/// How the fields of a record were obtained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseStatus {
    /// The model response parsed as a JSON object.
    #[default]
    Parsed,
    /// The response was unusable; fields are the empty default.
    Fallback { reason: String },
}

/// Structured result for one processed document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub filename: String,
    pub fields: ExtractedFields,
    /// Distinguishes a genuinely empty resume from a parse fallback.
    pub parse_status: ParseStatus,
    /// Pages sent to the model (1-indexed).
    pub pages: Vec<usize>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
}

impl ExtractionRecord {
    pub fn is_fallback(&self) -> bool {
        matches!(self.parse_status, ParseStatus::Fallback { .. })
    }
}

/// Result of pushing one document through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentOutcome {
    Extracted(ExtractionRecord),
    Failed(DocumentError),
}

impl DocumentOutcome {
    pub fn filename(&self) -> &str {
        match self {
            DocumentOutcome::Extracted(r) => &r.filename,
            DocumentOutcome::Failed(e) => e.filename(),
        }
    }

    pub fn record(&self) -> Option<&ExtractionRecord> {
        match self {
            DocumentOutcome::Extracted(r) => Some(r),
            DocumentOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&DocumentError> {
        match self {
            DocumentOutcome::Extracted(_) => None,
            DocumentOutcome::Failed(e) => Some(e),
        }
    }
}

/// Per-batch totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_documents: usize,
    pub extracted: usize,
    /// Extracted documents whose response fell back to the empty record.
    pub fallbacks: usize,
    pub failed: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[DocumentOutcome], total_duration_ms: u64) -> Self {
        let records: Vec<&ExtractionRecord> =
            outcomes.iter().filter_map(DocumentOutcome::record).collect();
        Self {
            total_documents: outcomes.len(),
            extracted: records.len(),
            fallbacks: records.iter().filter(|r| r.is_fallback()).count(),
            failed: outcomes.len() - records.len(),
            total_input_tokens: records.iter().map(|r| r.input_tokens as u64).sum(),
            total_output_tokens: records.iter().map(|r| r.output_tokens as u64).sum(),
            total_duration_ms,
        }
    }
}
