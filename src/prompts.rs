//! Prompts for VLM-based resume field extraction.
//!
//! Callers can override the system instruction via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Fixed system instruction naming the five target fields and the JSON shape.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "Extract the following fields from this resume: \
name, email, phone, skills (as a list), and work experience (as a list of jobs with company, \
title, and years if available). \
Return the result as a JSON object with these keys: name, email, phone, skills, work_experience. \
If a field is missing, use an empty string or empty list.";

/// Text part that precedes the page images in the user turn.
pub const EXTRACTION_USER_TEXT: &str = "Extract fields from this resume.";
