//! CLI binary for edgequake-water.
//!
//! A thin shim over the library crate that maps CLI flags to `ParseConfig`
//! and prints `ParseResult` JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_water::parse::{resolve_model, write_atomic};
use edgequake_water::pipeline::input::{collect_inputs, is_url};
use edgequake_water::progress::ProgressCallback;
use edgequake_water::{
    evaluate, parse_document, parse_file, NormStatus, ParseConfig, ParseProgressCallback,
    ParseResult, TracingLog, WaterAnalysisRecord,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn bar_style(unit: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  ⏱ {{elapsed_precise}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback for one document: a live bar plus one log line
/// per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading images…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ParseProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(bar_style("pages"));
        self.bar.set_prefix("Parsing");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, parameter_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<16}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{parameter_count:>3} parameters")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} page(s) parsed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages parsed  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scanned form (JSON to stdout)
  water2json blank.jpg

  # Every image in a folder, results to a file
  water2json ./blanks/ -o results.json

  # Two photos of the same form, merged into one record
  water2json --merge page1.jpg page2.jpg

  # Local model through Ollama
  water2json --provider ollama --model llama3.2-vision:11b blank.jpg

  # Compare the extracted values with drinking-water norms
  water2json --norms blank.jpg

  # Check that a provider is configured
  water2json --check

SUPPORTED FORMATS:
  jpg, jpeg, png, webp, gif, bmp (local files, directories, or HTTP/HTTPS URLs)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model ID
  RUST_LOG                Override the log filter
"#;

/// Extract structured water-analysis data from scanned lab forms.
#[derive(Parser, Debug)]
#[command(
    name = "water2json",
    version,
    about = "Extract structured water-analysis records from scanned lab forms using Vision LLMs",
    long_about = "Reads photographed or scanned water-analysis forms (local files, directories or \
URLs), asks a Vision Language Model to transcribe them, and recovers a fixed-shape JSON record \
from the reply. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, Ollama and other \
OpenAI-compatible endpoints.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files, a directory of images, or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "check")]
    inputs: Vec<String>,

    /// Treat all inputs as pages of one document and merge them.
    #[arg(long, env = "WATER2JSON_MERGE")]
    merge: bool,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "WATER2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Resolve the LLM provider, report it, and exit.
    #[arg(long)]
    check: bool,

    /// Print a comparison with drinking-water norms to stderr.
    #[arg(long, env = "WATER2JSON_NORMS")]
    norms: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, llama3.2-vision:11b).
    #[arg(
        short,
        long,
        env = "EDGEQUAKE_MODEL",
        long_help = "Vision LLM model to use. Default: gpt-4.1-nano, or llama3.2-vision:11b \
          with --provider ollama."
    )]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set."
    )]
    provider: Option<String>,

    /// Number of pages sent to the model at once.
    #[arg(short, long, env = "WATER2JSON_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "WATER2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "WATER2JSON_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "WATER2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "WATER2JSON_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Disable progress bar.
    #[arg(long, env = "WATER2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs and JSON repair diagnostics.
    #[arg(short, long, env = "WATER2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "WATER2JSON_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "WATER2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "WATER2JSON_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let mut config = build_config(&cli).await?;

    // Build the model once; every document below reuses it.
    let model = resolve_model(&config).context("No usable LLM provider")?;
    let label = model.label();
    config.vision_model = Some(model);

    // ── Check mode ───────────────────────────────────────────────────────
    if cli.check {
        eprintln!("{} Provider ready: {}", green("✔"), bold(&label));
        return Ok(ExitCode::SUCCESS);
    }

    let batch = is_batch(&cli);
    let files = expand_inputs(&cli.inputs)?;
    let results: Vec<ParseResult> = if batch {
        run_batch(&files, &config, &label, show_progress).await
    } else {
        if show_progress {
            let cb: ProgressCallback = CliProgressCallback::new();
            config.progress_callback = Some(cb);
        }
        vec![run_document(&files, &config, &label).await]
    };

    if cli.norms {
        for result in &results {
            if let Some(ref record) = result.data {
                print_norms(&result.meta.source_file, record);
            }
        }
    }

    let json = if batch {
        serde_json::to_string_pretty(&results)
    } else {
        serde_json::to_string_pretty(&results[0])
    }
    .context("Failed to serialise output")?;

    if let Some(ref path) = cli.output {
        write_atomic(path, json.as_bytes())
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!("{} Result written to {}", green("✔"), bold(&path.display().to_string()));
        }
    } else {
        println!("{json}");
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        if batch && !cli.quiet {
            eprintln!("{} {}/{} failed", red("✘"), failed, results.len());
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// A directory, or several inputs without `--merge`, is processed file by file.
fn is_batch(cli: &Cli) -> bool {
    if cli.merge {
        return false;
    }
    cli.inputs.len() > 1 || cli.inputs.iter().any(|i| !is_url(i) && Path::new(i).is_dir())
}

/// Replace each directory by the images it contains, in file-name order.
///
/// With `--merge` the expanded list is one document, so `--merge ./scans/`
/// parses every image in the folder as consecutive pages.
fn expand_inputs(inputs: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for input in inputs {
        if !is_url(input) && Path::new(input).is_dir() {
            let found = collect_inputs(Path::new(input))
                .with_context(|| format!("Failed to list directory {input}"))?;
            if found.is_empty() {
                eprintln!("{} No supported images in {}", yellow("⚠"), input);
            }
            files.extend(found.into_iter().map(|p| p.to_string_lossy().into_owned()));
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Parse all inputs as the pages of one document.
async fn run_document(inputs: &[String], config: &ParseConfig, label: &str) -> ParseResult {
    let start = Instant::now();
    let source = inputs.join(", ");
    let outcome = if inputs.len() == 1 {
        parse_file(&inputs[0], config).await
    } else {
        parse_document(inputs, config).await
    };
    match outcome {
        Ok(output) => output.into_parse_result(source),
        Err(e) => ParseResult::failure(
            e,
            label,
            source,
            start.elapsed().as_millis() as u64,
            inputs.len(),
        ),
    }
}

/// Parse each file as its own document, one after another.
async fn run_batch(
    files: &[String],
    config: &ParseConfig,
    label: &str,
    show_progress: bool,
) -> Vec<ParseResult> {
    let bar = if show_progress {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(bar_style("files"));
        bar.set_prefix("Parsing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let mut results = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        let result = run_document(std::slice::from_ref(file), config, label).await;
        let line = format!(
            "  {} [{}/{}] {}",
            if result.success { green("✓") } else { red("✗") },
            i + 1,
            files.len(),
            file
        );
        match bar {
            Some(ref bar) => {
                bar.println(line);
                bar.inc(1);
            }
            None => eprintln!("{line}"),
        }
        results.push(result);
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    results
}

/// Print the norm comparison of one record to stderr.
fn print_norms(source: &str, record: &WaterAnalysisRecord) {
    eprintln!("{} {}", cyan("◆"), bold(&format!("Norms: {source}")));
    for finding in evaluate(record) {
        let (mark, note) = match (finding.status, finding.norm) {
            (NormStatus::WithinNorm, _) => (green("✓"), String::new()),
            (NormStatus::AboveMax, Some(n)) => (
                red("▲"),
                format!("above {} {}", n.max.unwrap_or_default(), n.unit),
            ),
            (NormStatus::BelowMin, Some(n)) => (
                red("▼"),
                format!("below {} {}", n.min.unwrap_or_default(), n.unit),
            ),
            _ => (dim("·"), dim("no norm")),
        };
        eprintln!(
            "  {} {:<32} {:>10}  {}",
            mark, finding.name, finding.value, note
        );
    }
}

/// Map CLI args to `ParseConfig`.
async fn build_config(cli: &Cli) -> Result<ParseConfig> {
    let mut builder = ParseConfig::builder()
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if cli.verbose {
        builder = builder.recovery_log(Arc::new(TracingLog));
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("water2json").chain(args.iter().copied())).unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn directory_expands_to_sorted_images() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "p2.png");
        touch(dir.path(), "p1.jpg");
        touch(dir.path(), "notes.txt");
        let dir_arg = dir.path().to_string_lossy().into_owned();

        let files = expand_inputs(&[dir_arg, "https://example.com/p3.png".into()]).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("p1.jpg"));
        assert!(files[1].ends_with("p2.png"));
        assert_eq!(files[2], "https://example.com/p3.png");
    }

    #[test]
    fn merge_with_directory_is_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let dir_arg = dir.path().to_string_lossy().into_owned();

        assert!(!is_batch(&cli(&["--merge", dir_arg.as_str()])));
        assert!(is_batch(&cli(&[dir_arg.as_str()])));
        assert!(is_batch(&cli(&["a.png", "b.png"])));
        assert!(!is_batch(&cli(&["a.png"])));
    }
}
