//! CLI binary for edgequake-doc2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2pdf::{
    convert_directory, convert_to_file, shutdown_shared_session, BatchReport, ConversionConfig,
    ConversionOutput, ConversionProgressCallback, PageSize, ProgressCallback, DEFAULT_MERMAID_URL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// file.
struct CliProgressCallback {
    bar: ProgressBar,
    diagrams_ok: AtomicUsize,
    diagrams_failed: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_batch_start` gives it a length.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            diagrams_ok: AtomicUsize::new(0),
            diagrams_failed: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} document(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, pdf_bytes: usize) {
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{:>8} bytes", pdf_bytes)),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        // Keep to the first line of multi-line error messages.
        let first = error.lines().next().unwrap_or(error);
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_diagram(&self, rendered: bool) {
        if rendered {
            self.diagrams_ok.fetch_add(1, Ordering::SeqCst);
        } else {
            self.diagrams_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        let ok = self.diagrams_ok.load(Ordering::SeqCst);
        let bad = self.diagrams_failed.load(Ordering::SeqCst);
        let diagrams = if ok + bad > 0 {
            dim(&format!("  ({ok} diagrams rendered, {bad} failed)"))
        } else {
            String::new()
        };

        if failed == 0 {
            eprintln!(
                "{} {} documents converted successfully{}",
                green("✔"),
                bold(&success_count.to_string()),
                diagrams
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed){}",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
                diagrams
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Batch: every .md/.markdown/.html/.htm/.docx/.txt in ./input → ./output
  doc2pdf

  # Batch with explicit directories
  doc2pdf --input-dir docs --output-dir pdf

  # Single file (writes output/notes.pdf)
  doc2pdf notes.md

  # Single file to a chosen path, Letter paper
  doc2pdf report.docx -o report.pdf --page-size letter

  # Convert from URL
  doc2pdf https://example.com/README.md -o readme.pdf

  # Skip Mermaid rendering (no browser needed)
  doc2pdf --no-diagrams design.md

  # JSON report
  doc2pdf --json > report.json

DIAGRAMS:
  ```mermaid fences in Markdown are rendered with a local Chrome/Chromium
  (found on PATH, or given with --chrome). The browser loads the Mermaid
  script from --mermaid-url, so network access is needed unless it points at
  a local copy. A diagram that cannot be rendered is replaced by
  "*[Mermaid diagram could not be rendered]*" and the document still converts.

ENVIRONMENT VARIABLES:
  DOC2PDF_INPUT_DIR       Batch input directory
  DOC2PDF_OUTPUT_DIR      Batch output directory
  DOC2PDF_CHROME          Chrome/Chromium executable
  DOC2PDF_MERMAID_URL     Mermaid script URL
  RUST_LOG                Override the log filter (e.g. edgequake_doc2pdf=debug)
"#;

/// Convert Markdown, HTML, DOCX and text documents to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "doc2pdf",
    version,
    about = "Convert Markdown, HTML, DOCX and text documents to PDF",
    long_about = "Convert Markdown, HTML, DOCX and plain-text documents (local files or URLs) \
to paginated PDF. Mermaid diagrams in Markdown are rendered through a headless browser.\n\n\
Without INPUT every supported file of --input-dir is converted into --output-dir.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path or HTTP/HTTPS URL. Omit for batch mode.
    input: Option<String>,

    /// Batch input directory (created if missing).
    #[arg(long, env = "DOC2PDF_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// Output directory (created if missing).
    #[arg(long, env = "DOC2PDF_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Write the PDF of a single INPUT to this file.
    #[arg(short, long, env = "DOC2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Document title for a single INPUT (default: file name).
    #[arg(long, env = "DOC2PDF_TITLE")]
    title: Option<String>,

    /// Paper size: a4 or letter.
    #[arg(long, env = "DOC2PDF_PAGE_SIZE", default_value = "a4")]
    page_size: PageSize,

    /// Page margin in points.
    #[arg(long, env = "DOC2PDF_MARGIN", default_value_t = 50.0)]
    margin: f32,

    /// Body font size in points (6–72).
    #[arg(long, env = "DOC2PDF_FONT_SIZE", default_value_t = 12.0)]
    font_size: f32,

    /// Leave Mermaid fences as code instead of rendering them.
    #[arg(long, env = "DOC2PDF_NO_DIAGRAMS")]
    no_diagrams: bool,

    /// Per-diagram render timeout in milliseconds.
    #[arg(long, env = "DOC2PDF_DIAGRAM_TIMEOUT", default_value_t = 10_000)]
    diagram_timeout: u64,

    /// Mermaid script loaded by the diagram page.
    #[arg(long, env = "DOC2PDF_MERMAID_URL", default_value = DEFAULT_MERMAID_URL)]
    mermaid_url: String,

    /// Chrome/Chromium executable (default: auto-detect).
    #[arg(long, env = "DOC2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// Print a JSON report on stdout.
    #[arg(long, env = "DOC2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2PDF_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOC2PDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let batch = cli.input.is_none();
    let show_progress = batch && !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Ctrl-C → cooperative cancellation ────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} Interrupted, finishing current step…", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let result = match build_config(&cli, progress_cb, cancel) {
        Ok(config) => run(&cli, &config).await,
        Err(e) => Err(e),
    };

    // The diagram browser must be closed on every exit path.
    shutdown_shared_session().await;
    result
}

async fn run(cli: &Cli, config: &ConversionConfig) -> Result<()> {
    match cli.input {
        Some(ref input) => run_single(cli, input, config).await,
        None => run_batch(cli, config).await,
    }
}

async fn run_single(cli: &Cli, input: &str, config: &ConversionConfig) -> Result<()> {
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.output_dir.join(format!("{}.pdf", output_stem(input))));

    let output = convert_to_file(input, &output_path, config)
        .await
        .with_context(|| format!("Conversion of '{input}' failed"))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_summary(&output, &output_path);
    }
    Ok(())
}

async fn run_batch(cli: &Cli, config: &ConversionConfig) -> Result<()> {
    tokio::fs::create_dir_all(&cli.input_dir)
        .await
        .with_context(|| format!("Failed to create input directory {:?}", cli.input_dir))?;

    let report: BatchReport = convert_directory(&cli.input_dir, &cli.output_dir, config)
        .await
        .context("Batch conversion failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet && config.progress_callback.is_none() {
        eprintln!(
            "Converted {}/{} documents in {}ms",
            report.succeeded(),
            report.total(),
            report.duration_ms
        );
        for file in report.files.iter().filter(|f| !f.is_success()) {
            eprintln!(
                "  {} {}: {}",
                red("✗"),
                file.input.display(),
                file.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if report.total() == 0 && !cli.quiet {
        eprintln!(
            "{} No documents found in {}",
            cyan("⚠"),
            cli.input_dir.display()
        );
    }
    if report.failed() > 0 {
        anyhow::bail!("{} of {} documents failed", report.failed(), report.total());
    }
    Ok(())
}

fn print_summary(output: &ConversionOutput, path: &Path) {
    let s = &output.stats;
    eprintln!(
        "{}  {} page(s)  {}ms  →  {}",
        if s.diagrams_failed == 0 && s.images_skipped == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        output.metadata.page_count,
        s.total_duration_ms,
        bold(&path.display().to_string()),
    );
    if s.diagrams_found > 0 || s.images_skipped > 0 {
        eprintln!(
            "   {} diagrams rendered  /  {} failed  /  {} images skipped",
            dim(&s.diagrams_rendered.to_string()),
            dim(&s.diagrams_failed.to_string()),
            dim(&s.images_skipped.to_string()),
        );
    }
}

/// File stem for the default output of `input` (path or URL).
fn output_stem(input: &str) -> String {
    let trimmed = input.split(['?', '#']).next().unwrap_or(input);
    let last = trimmed.trim_end_matches('/').rsplit('/').next().unwrap_or(trimmed);
    Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or_else(|| "document".to_string())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .page_size(cli.page_size)
        .margin_pt(cli.margin)
        .font_size(cli.font_size)
        .diagrams_enabled(!cli.no_diagrams)
        .diagram_timeout_ms(cli.diagram_timeout)
        .mermaid_script_url(cli.mermaid_url.clone())
        .download_timeout_secs(cli.download_timeout)
        .cancellation_token(cancel);

    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome.clone());
    }
    if let (Some(ref title), Some(_)) = (&cli.title, &cli.input) {
        builder = builder.title(title.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stem_from_paths_and_urls() {
        assert_eq!(output_stem("docs/notes.md"), "notes");
        assert_eq!(output_stem("https://x.org/a/README.md?raw=1"), "README");
        assert_eq!(output_stem("https://x.org/"), "document");
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["doc2pdf"]);
        assert!(cli.input.is_none());
        assert_eq!(cli.input_dir, PathBuf::from("input"));
        assert_eq!(cli.output_dir, PathBuf::from("output"));
        assert_eq!(cli.page_size, PageSize::A4);
        assert_eq!(cli.mermaid_url, DEFAULT_MERMAID_URL);
    }
}
