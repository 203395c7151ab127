//! Presentation of extraction records as two tables per record.
//!
//! * A four-row `Field | Value` summary (Name, Email, Phone, Skills).
//! * A `Company | Title | Years` table, shown only when at least one work
//!   entry is a structured role. Free-text notes land in the Title column.
//!
//! Tables are rendered as GitHub-flavoured Markdown so they read well both in
//! a terminal and when pasted into an issue or wiki.

use crate::record::{ExtractionRecord, WorkExperienceEntry};

/// Rows of the Field/Value summary, in display order.
pub fn summary_rows(record: &ExtractionRecord) -> [[String; 2]; 4] {
    let f = &record.fields;
    [
        ["Name".to_string(), f.name.clone()],
        ["Email".to_string(), f.email.clone()],
        ["Phone".to_string(), f.phone.clone()],
        ["Skills".to_string(), f.skills_joined()],
    ]
}

/// Rows of the work-experience table, or `None` if nothing is structured.
pub fn experience_rows(record: &ExtractionRecord) -> Option<Vec<[String; 3]>> {
    if !record.fields.has_structured_experience() {
        return None;
    }
    Some(
        record
            .fields
            .work_experience
            .iter()
            .map(|entry| match entry {
                WorkExperienceEntry::Role(job) => {
                    [job.company.clone(), job.title.clone(), job.years.clone()]
                }
                WorkExperienceEntry::Note(text) => [String::new(), text.clone(), String::new()],
            })
            .collect(),
    )
}

/// Render a Markdown table with padded columns.
pub fn markdown_table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) -> String {
    let mut widths: [usize; N] = headers.map(|h| h.chars().count().max(3));
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(escape_cell(cell).chars().count());
        }
    }

    let line = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths.iter())
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    let mut out = line(headers.iter().map(|h| h.to_string()).collect());
    out.push_str(&line(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for row in rows {
        out.push_str(&line(row.iter().map(|c| escape_cell(c)).collect()));
    }
    out
}

/// Render one record: heading, summary table, optional experience table.
pub fn render_record(record: &ExtractionRecord) -> String {
    let mut out = format!("### {}\n\n", record.filename);
    out.push_str(&markdown_table(["Field", "Value"], &summary_rows(record)));

    if let Some(rows) = experience_rows(record) {
        out.push_str("\n**Work Experience**\n\n");
        out.push_str(&markdown_table(["Company", "Title", "Years"], &rows));
    }
    out
}

/// Render every record in order, or a hint when there are none.
pub fn render_records<'a>(records: impl IntoIterator<Item = &'a ExtractionRecord>) -> String {
    let rendered: Vec<String> = records.into_iter().map(render_record).collect();
    if rendered.is_empty() {
        "No resumes match the filter or have been processed yet.\n".to_string()
    } else {
        rendered.join("\n")
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}
