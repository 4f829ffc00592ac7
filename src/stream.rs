//! Streaming batch API: emit one [`FileResult`] per file as it completes.
//!
//! ## Why stream?
//!
//! A directory of documents with diagrams takes a while. Yielding results as
//! each file finishes lets callers drive progress bars or stop early, rather
//! than waiting for the whole [`BatchReport`](crate::output::BatchReport).
//!
//! Files are converted sequentially in file-name order. A failed file becomes
//! a `FileResult` carrying the error and the stream moves on; cancellation
//! ends the stream after the file it interrupted.

use crate::config::ConversionConfig;
use crate::convert;
use crate::error::Doc2PdfError;
use crate::output::FileResult;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Instant;
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::Stream;
use tracing::{info, warn};

/// File extensions picked up by batch conversion, lower-case, without dot.
pub const BATCH_EXTENSIONS: &[&str] = &["md", "markdown", "html", "htm", "docx", "txt"];

/// A boxed stream of per-file results.
pub type FileStream = Pin<Box<dyn Stream<Item = FileResult> + Send>>;

/// `true` when `path` has one of the [`BATCH_EXTENSIONS`].
pub fn is_batch_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BATCH_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// List the convertible files directly inside `dir`, sorted by name.
pub async fn list_batch_files(dir: &Path) -> Result<Vec<PathBuf>, Doc2PdfError> {
    let entries = tokio::fs::read_dir(dir).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Doc2PdfError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => Doc2PdfError::FileNotFound {
            path: dir.to_path_buf(),
        },
    })?;

    let mut files = Vec::new();
    let mut entries = ReadDirStream::new(entries);
    while let Some(entry) = entries.next().await {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable directory entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && is_batch_candidate(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

struct BatchState {
    files: Vec<PathBuf>,
    next: usize,
    succeeded: usize,
    output_dir: PathBuf,
    config: ConversionConfig,
    done: bool,
}

/// Convert every supported file in `input_dir` into `output_dir`, yielding
/// results as they are ready.
///
/// # Returns
/// - `Ok(FileStream)`: one item per candidate file
/// - `Err(Doc2PdfError)`: the input directory cannot be listed or the
///   output directory cannot be created
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2pdf::{convert_directory_stream, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::default();
/// let mut results = convert_directory_stream("input", "output", &config).await?;
/// while let Some(file) = results.next().await {
///     match &file.error {
///         None => println!("{} → {:?}", file.input.display(), file.output),
///         Some(e) => eprintln!("{}: {e}", file.input.display()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_directory_stream(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<FileStream, Doc2PdfError> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref().to_path_buf();

    // ── List inputs ──────────────────────────────────────────────────────
    let files = list_batch_files(input_dir).await?;
    info!(
        "Found {} convertible file(s) in {}",
        files.len(),
        input_dir.display()
    );

    // ── Prepare output directory ─────────────────────────────────────────
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|e| Doc2PdfError::OutputWriteFailed {
            path: output_dir.clone(),
            source: e,
        })?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(files.len());
    }

    // ── Build the stream ─────────────────────────────────────────────────
    let state = BatchState {
        files,
        next: 0,
        succeeded: 0,
        output_dir,
        config: config.clone(),
        done: false,
    };

    let s = stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        if st.next >= st.files.len() {
            st.done = true;
            if let Some(ref cb) = st.config.progress_callback {
                cb.on_batch_complete(st.files.len(), st.succeeded);
            }
            return None;
        }

        let index = st.next;
        st.next += 1;
        let (result, cancelled) = convert_one(&st, index).await;
        if result.is_success() {
            st.succeeded += 1;
        }
        if cancelled {
            warn!("Batch cancelled after {}", result.input.display());
            st.done = true;
            if let Some(ref cb) = st.config.progress_callback {
                cb.on_batch_complete(st.files.len(), st.succeeded);
            }
        }
        Some((result, st))
    });

    Ok(Box::pin(s))
}

/// Convert `st.files[index]`; the flag reports a cancellation.
async fn convert_one(st: &BatchState, index: usize) -> (FileResult, bool) {
    let start = Instant::now();
    let input = st.files[index].clone();
    let total = st.files.len();
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let output = st.output_dir.join(format!("{stem}.pdf"));
    let cb = st.config.progress_callback.as_ref();

    if let Some(cb) = cb {
        cb.on_file_start(index + 1, total, &name);
    }

    let outcome = convert::convert_to_file(input.to_string_lossy(), &output, &st.config).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(out) => {
            if let Some(cb) = cb {
                cb.on_file_complete(index + 1, total, out.pdf.len());
            }
            info!("[{}/{}] {} → {}", index + 1, total, name, output.display());
            (
                FileResult {
                    input,
                    output: Some(output),
                    error: None,
                    pdf_bytes: out.pdf.len(),
                    stats: Some(out.stats),
                    duration_ms,
                },
                false,
            )
        }
        Err(e) => {
            let message = e.to_string();
            if let Some(cb) = cb {
                cb.on_file_error(index + 1, total, &message);
            }
            warn!("[{}/{}] {} failed: {}", index + 1, total, name, message);
            (
                FileResult {
                    input,
                    output: None,
                    error: Some(message),
                    pdf_bytes: 0,
                    stats: None,
                    duration_ms,
                },
                matches!(e, Doc2PdfError::Cancelled),
            )
        }
    }
}
