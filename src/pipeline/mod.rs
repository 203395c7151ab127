//! Pipeline stages for resume field extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ encode ──▶ llm ──▶ normalize
//! (pdfium)   (base64)   (VLM)   (fence strip + JSON)
//! ```
//!
//! 1. [`render`]   : rasterise selected pages from a scoped temp file; runs
//!    in `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]   : PNG-encode and base64-wrap each page image
//! 3. [`llm`]      : one multimodal request per document; the only stage
//!    with network I/O
//! 4. [`normalize`]: turn the raw reply into well-typed fields, falling back
//!    to the empty record on malformed output

pub mod encode;
pub mod llm;
pub mod normalize;
pub mod render;
