//! Configuration types for resume field extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The three generation knobs
//! (temperature, max tokens, top-p) are range-checked here and then passed
//! through to the model endpoint untouched.

use crate::error::ResumeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default OpenAI-compatible endpoint (GitHub Models inference).
pub const DEFAULT_ENDPOINT: &str = "https://models.inference.ai.azure.com";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for one extraction session.
///
/// # Example
/// ```rust
/// use edgequake_resume::{ExtractionConfig, PageSelection};
///
/// let config = ExtractionConfig::builder()
///     .api_key("ghp_example")
///     .temperature(0.2)
///     .pages(PageSelection::Set(vec![1, 2]))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 4096);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    pub endpoint: String,

    /// Model identifier sent with every request. Default: `gpt-4o`.
    pub model: String,

    /// Opaque credential forwarded as a bearer token. Never logged.
    pub api_key: Option<String>,

    /// Sampling temperature, 0.0–1.0. Default: 0.5.
    pub temperature: f32,

    /// Maximum output tokens for the model response. Default: 4096.
    pub max_tokens: u32,

    /// Nucleus-sampling threshold, 0.0–1.0. Default: 1.0.
    pub top_p: f32,

    /// Which pages of each document are sent to the model. Default: page 1.
    pub pages: PageSelection,

    /// Longest rendered edge in pixels. Default: 1600.
    pub max_rendered_pixels: u32,

    /// Vision detail hint attached to each image part. Default: `low`.
    pub image_detail: ImageDetail,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Documents extracted at once. Default: 1 (strictly sequential).
    ///
    /// Records are still appended to the store and mirror in upload order.
    pub concurrency: usize,

    /// Custom system instruction. If None, uses the built-in extraction prompt.
    pub system_prompt: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: 0.5,
            max_tokens: 4096,
            top_p: 1.0,
            pages: PageSelection::default(),
            max_rendered_pixels: 1600,
            image_detail: ImageDetail::default(),
            api_timeout_secs: 120,
            concurrency: 1,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("pages", &self.pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("image_detail", &self.image_detail)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn image_detail(mut self, detail: ImageDetail) -> Self {
        self.config.image_detail = detail;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ResumeError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.temperature) {
            return Err(ResumeError::InvalidConfig(format!(
                "temperature must be 0.0–1.0, got {}",
                c.temperature
            )));
        }
        if !(0.0..=1.0).contains(&c.top_p) {
            return Err(ResumeError::InvalidConfig(format!(
                "top_p must be 0.0–1.0, got {}",
                c.top_p
            )));
        }
        if c.max_tokens == 0 {
            return Err(ResumeError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.endpoint.trim().is_empty() {
            return Err(ResumeError::InvalidConfig("endpoint must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Vision detail hint sent alongside each page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    /// Single low-resolution tile per image. Cheapest; enough for resumes.
    #[default]
    Low,
    /// Full tiling for fine print.
    High,
    /// Let the provider decide.
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

/// Specifies which pages of each document to rasterise.
///
/// Page numbers are 1-indexed. Numbers outside `1..=page_count` are dropped
/// silently when the selection is expanded against a real document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page.
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl Default for PageSelection {
    fn default() -> Self {
        PageSelection::Single(1)
    }
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
