//! Record storage: the session's in-memory list and its durable CSV mirror.
//!
//! The mirror is append-only. Each record becomes exactly one `write` call on
//! a file opened in append mode, so concurrent writers interleave whole rows
//! and never split one. The header is emitted only when the file is new or
//! empty at the time of the append.

use crate::error::ResumeError;
use crate::record::ExtractionRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mirror columns, in order.
pub const MIRROR_HEADER: [&str; 6] = [
    "filename",
    "name",
    "email",
    "phone",
    "skills",
    "work_experience",
];

/// Ordered records for one session. Insertion order is processing order.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<ExtractionRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExtractionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching a skill filter; see [`filter_by_skill`].
    pub fn filter(&self, query: &str) -> Vec<&ExtractionRecord> {
        filter_by_skill(&self.records, query)
    }
}

/// Records whose skills contain `query` as a case-insensitive infix.
///
/// A blank query matches everything. Order is preserved and nothing is
/// mutated.
pub fn filter_by_skill<'a>(records: &'a [ExtractionRecord], query: &str) -> Vec<&'a ExtractionRecord> {
    if query.trim().is_empty() {
        return records.iter().collect();
    }
    let needle = query.to_lowercase();
    records
        .iter()
        .filter(|r| {
            r.fields
                .skills
                .iter()
                .any(|skill| skill.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Append-only CSV copy of every extracted record.
#[derive(Debug, Clone)]
pub struct CsvMirror {
    path: PathBuf,
}

impl CsvMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as one row, writing the header first if the file
    /// is new or empty.
    pub fn append(&self, record: &ExtractionRecord) -> Result<(), ResumeError> {
        let io_err = |source: std::io::Error| ResumeError::MirrorWriteFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let needs_header = file.metadata().map_err(io_err)?.len() == 0;

        let bytes = encode_row(record, needs_header)?;
        file.write_all(&bytes).map_err(io_err)?;
        debug!(
            "Appended '{}' to {} ({} bytes{})",
            record.filename,
            self.path.display(),
            bytes.len(),
            if needs_header { ", with header" } else { "" }
        );
        Ok(())
    }
}

/// Serialise one record (and optionally the header) into a single buffer.
fn encode_row(record: &ExtractionRecord, with_header: bool) -> Result<Vec<u8>, ResumeError> {
    let work_json = serde_json::to_string(&record.fields.work_experience)
        .map_err(|e| ResumeError::Internal(format!("work_experience encode: {e}")))?;

    let mut wtr = csv::Writer::from_writer(Vec::new());
    if with_header {
        wtr.write_record(MIRROR_HEADER)?;
    }
    wtr.write_record([
        record.filename.as_str(),
        record.fields.name.as_str(),
        record.fields.email.as_str(),
        record.fields.phone.as_str(),
        record.fields.skills_joined().as_str(),
        work_json.as_str(),
    ])?;
    wtr.into_inner()
        .map_err(|e| ResumeError::Internal(format!("csv flush: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ExtractedFields, ParseStatus, WorkExperience, WorkExperienceEntry};

    fn record(filename: &str, skills: &[&str]) -> ExtractionRecord {
        ExtractionRecord {
            filename: filename.into(),
            fields: ExtractedFields {
                name: format!("Owner of {filename}"),
                skills: skills.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            parse_status: ParseStatus::Parsed,
            pages: vec![1],
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn empty_filter_returns_everything_in_order() {
        let records = vec![record("a.pdf", &[]), record("b.pdf", &["Go"]), record("c.pdf", &["SQL"])];
        let names: Vec<&str> = filter_by_skill(&records, "")
            .iter()
            .map(|r| r.filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(filter_by_skill(&records, "   ").len(), 3);
    }

    #[test]
    fn filter_is_case_insensitive_infix() {
        let records = vec![record("py.pdf", &["Python", "SQL"]), record("js.pdf", &["JavaScript"])];
        let hits = |q: &str| -> Vec<String> {
            filter_by_skill(&records, q)
                .iter()
                .map(|r| r.filename.clone())
                .collect()
        };
        assert_eq!(hits("pyth"), vec!["py.pdf"]);
        assert_eq!(hits("SQL"), vec!["py.pdf"]);
        assert_eq!(hits("sql"), vec!["py.pdf"]);
        assert_eq!(hits("java"), vec!["js.pdf"]);
        assert!(hits("rust").is_empty());
    }

    #[test]
    fn store_preserves_insertion_order() {
        let mut store = RecordStore::new();
        assert!(store.is_empty());
        store.push(record("first.pdf", &["Rust"]));
        store.push(record("second.pdf", &["rust"]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].filename, "first.pdf");
        assert_eq!(store.filter("RUST").len(), 2);
    }

    #[test]
    fn mirror_writes_header_once_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = CsvMirror::new(dir.path().join("resumes.csv"));

        let mut first = record("a.pdf", &["Python", "SQL"]);
        first.fields.work_experience = vec![WorkExperienceEntry::Role(WorkExperience {
            company: "Acme, Inc.".into(),
            title: "Analyst".into(),
            years: "2020-2022".into(),
        })];
        mirror.append(&first).unwrap();
        mirror.append(&record("b.pdf", &[])).unwrap();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(mirror.path())
            .unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].iter().collect::<Vec<_>>(), MIRROR_HEADER.to_vec());
        assert_eq!(&rows[1][0], "a.pdf");
        assert_eq!(&rows[1][4], "Python, SQL");
        assert_eq!(
            &rows[1][5],
            r#"[{"company":"Acme, Inc.","title":"Analyst","years":"2020-2022"}]"#
        );
        assert_eq!(&rows[2][0], "b.pdf");
        assert_eq!(&rows[2][4], "");
        assert_eq!(&rows[2][5], "[]");
    }

    #[test]
    fn mirror_never_rewrites_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resumes.csv");
        std::fs::write(&path, "filename,name,email,phone,skills,work_experience\nold.pdf,,,,,[]\n")
            .unwrap();

        CsvMirror::new(&path).append(&record("new.pdf", &["Go"])).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("filename,name,email,phone,skills,work_experience\nold.pdf"));
        assert_eq!(text.matches("filename,name").count(), 1);
        assert!(text.trim_end().ends_with("new.pdf,Owner of new.pdf,,,Go,[]"));
    }

    #[test]
    fn mirror_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = CsvMirror::new(dir.path().join("out/nested/resumes.csv"));
        mirror.append(&record("a.pdf", &[])).unwrap();
        assert!(mirror.path().exists());
    }
}
