//! CLI binary for edgequake-resume.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one session over the given PDFs, and prints the
//! resulting tables.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_resume::config::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use edgequake_resume::{
    view, BatchSummary, CsvMirror, Document, DocumentError, ExtractionConfig,
    ExtractionProgressCallback, ExtractionRecord, ImageDetail, PageSelection, PdfiumRasteriser,
    ProgressCallback, Session,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// document.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} resumes  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
    }

    fn on_document_start(&self, index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, record: &ExtractionRecord) {
        let mark = if record.is_fallback() {
            yellow("⚠")
        } else {
            green("✓")
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            mark,
            index,
            total,
            record.filename,
            dim(&format!("{} skills", record.fields.skills.len())),
            dim(&format!("{:.1}s", self.elapsed_secs(index))),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, error: &DocumentError) {
        let msg = error.to_string();
        let msg = if msg.chars().count() > 100 {
            format!("{}\u{2026}", msg.chars().take(99).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs(index))),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}/{} resumes extracted{}{}",
            if summary.failed == 0 { green("✔") } else { red("✘") },
            bold(&summary.extracted.to_string()),
            summary.total_documents,
            if summary.fallbacks > 0 {
                format!("  ({} unparseable replies)", yellow(&summary.fallbacks.to_string()))
            } else {
                String::new()
            },
            if summary.failed > 0 {
                format!("  ({} failed)", red(&summary.failed.to_string()))
            } else {
                String::new()
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract page 1 of each resume, append to ./resumes.csv
  resume-extract alice.pdf bob.pdf

  # First two pages, show only resumes listing a Python skill
  resume-extract --pages 1-2 --filter python cvs/*.pdf

  # Deterministic sampling, JSON output, no CSV mirror
  resume-extract --temperature 0 --json --no-csv cv.pdf

  # Page counts only (no API key needed)
  resume-extract --inspect-only cv.pdf

ENVIRONMENT VARIABLES:
  RESUME_API_KEY      Credential forwarded as a bearer token
  RESUME_ENDPOINT     OpenAI-compatible base URL
  RESUME_MODEL        Vision model ID
  RESUME_CSV          Mirror file path
  PDFIUM_LIB_PATH     Path to libpdfium (file or containing directory)
"#;

/// Extract name, email, phone, skills and work history from PDF resumes.
#[derive(Parser, Debug)]
#[command(
    name = "resume-extract",
    version,
    about = "Extract structured resume fields from PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to process, in order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Credential for the model endpoint.
    #[arg(long, env = "RESUME_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "RESUME_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Vision model ID.
    #[arg(long, env = "RESUME_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Page selection: all, 2, 1-3, or 1,3,5.
    #[arg(long, env = "RESUME_PAGES", default_value = "1")]
    pages: String,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, env = "RESUME_TEMPERATURE", default_value_t = 0.5)]
    temperature: f32,

    /// Maximum output tokens for the model response.
    #[arg(long, env = "RESUME_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: u32,

    /// Nucleus-sampling threshold (0.0–1.0).
    #[arg(long, env = "RESUME_TOP_P", default_value_t = 1.0)]
    top_p: f32,

    /// Vision detail hint for page images.
    #[arg(long, value_enum, default_value = "low")]
    detail: DetailArg,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "RESUME_MAX_PIXELS", default_value_t = 1600)]
    max_pixels: u32,

    /// Documents extracted at once. Rows are still written in input order.
    #[arg(short, long, env = "RESUME_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, env = "RESUME_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Append records to this CSV file.
    #[arg(long, env = "RESUME_CSV", default_value = "resumes.csv")]
    csv: PathBuf,

    /// Do not write the CSV mirror.
    #[arg(long)]
    no_csv: bool,

    /// Show only records with a skill containing this text (case-insensitive).
    #[arg(long, default_value = "")]
    filter: String,

    /// Print records as JSON instead of tables.
    #[arg(long)]
    json: bool,

    /// Print page counts only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum DetailArg {
    Low,
    High,
    Auto,
}

impl From<DetailArg> for ImageDetail {
    fn from(v: DetailArg) -> Self {
        match v {
            DetailArg::Low => ImageDetail::Low,
            DetailArg::High => ImageDetail::High,
            DetailArg::Auto => ImageDetail::Auto,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    PdfiumRasteriser::new(cli.max_pixels)
        .check_binding()
        .context("PDF engine is not available")?;

    let mut documents = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        documents.push(
            Document::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    let config = build_config(&cli).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let session = Session::from_config(config);
        for doc in &documents {
            match session.page_count(doc).await {
                Ok(n) => println!("{:<40} {} pages", doc.filename, n),
                Err(e) => println!("{:<40} {}", doc.filename, red(&e.to_string())),
            }
        }
        return Ok(());
    }

    if config.api_key.is_none() && !cli.quiet {
        eprintln!(
            "{} no API key given; set --api-key or RESUME_API_KEY",
            yellow("⚠")
        );
    }

    let mut session = Session::from_config(config);
    if !cli.no_csv {
        session = session.with_mirror(CsvMirror::new(&cli.csv));
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        session = session.with_progress(cb);
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let report = session
        .process_batch(documents)
        .await
        .context("Extraction failed")?;

    let matching = session.filter(&cli.filter);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.json {
        let json = serde_json::json!({
            "records": matching,
            "failures": report
                .outcomes
                .iter()
                .filter_map(|o| o.error())
                .map(|e| serde_json::json!({ "filename": e.filename(), "error": e.to_string() }))
                .collect::<Vec<_>>(),
            "summary": report.summary,
        });
        let text = serde_json::to_string_pretty(&json).context("Failed to serialise output")?;
        writeln!(handle, "{text}").context("Failed to write to stdout")?;
    } else {
        write!(handle, "{}", view::render_records(matching.iter().copied()))
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet && !show_progress {
        for e in report.outcomes.iter().filter_map(|o| o.error()) {
            eprintln!("{} {}", red("✗"), e);
        }
        eprintln!(
            "Extracted {}/{} resumes in {}ms",
            report.summary.extracted, report.summary.total_documents, report.summary.total_duration_ms
        );
    }
    if !cli.quiet && !cli.no_csv && report.summary.extracted > 0 {
        eprintln!("   rows appended to {}", bold(&cli.csv.display().to_string()));
    }

    if report.summary.extracted == 0 && report.summary.failed > 0 {
        anyhow::bail!("All {} documents failed", report.summary.failed);
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .endpoint(&cli.endpoint)
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .top_p(cli.top_p)
        .pages(parse_pages(&cli.pages)?)
        .image_detail(cli.detail.clone().into())
        .max_rendered_pixels(cli.max_pixels)
        .api_timeout_secs(cli.api_timeout)
        .concurrency(cli.concurrency);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "1-3"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
