//! Eager (whole-document) parse entry points.
//!
//! These wait for every page, merge the page records and return one
//! [`DocumentOutput`]. Use [`crate::stream::parse_stream`] to receive page
//! results as they finish instead.
//!
//! A document is one or more page images of the same lab form. Each page is
//! sent to the model separately; the records are merged in page order, and
//! parameters the model left without a code get a derived one.

use crate::config::ParseConfig;
use crate::error::WaterParseError;
use crate::output::{DocumentOutput, PageResult, ParseStats};
use crate::pipeline::input::{self, PageImage};
use crate::pipeline::llm::{self, LlmVisionModel, VisionModel};
use crate::pipeline::{encode, merge};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default model for the `ollama` provider.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2-vision:11b";

/// Default model for every other provider.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Parse a single image file or URL.
///
/// # Errors
/// Fatal errors only: missing or unsupported input, provider not configured,
/// or the page produced no record.
pub async fn parse_file(
    input: impl AsRef<str>,
    config: &ParseConfig,
) -> Result<DocumentOutput, WaterParseError> {
    parse_document(&[input.as_ref()], config).await
}

/// Parse several images as consecutive pages of one document.
///
/// `Ok` as long as at least one page produced a record; check
/// `output.stats.failed_pages` and `output.pages` for the rest.
pub async fn parse_document<S: AsRef<str>>(
    inputs: &[S],
    config: &ParseConfig,
) -> Result<DocumentOutput, WaterParseError> {
    if inputs.is_empty() {
        return Err(WaterParseError::NoPages {
            detail: "no input files given".into(),
        });
    }

    let mut pages = Vec::with_capacity(inputs.len());
    for input_str in inputs {
        pages.push(input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?);
    }
    parse_pages(pages, config).await
}

/// Parse an in-memory image.
///
/// # Example
/// ```rust,no_run
/// use edgequake_water::{parse_bytes, ParseConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("form.jpg")?;
/// let output = parse_bytes(bytes, &ParseConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&output.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn parse_bytes(
    bytes: Vec<u8>,
    config: &ParseConfig,
) -> Result<DocumentOutput, WaterParseError> {
    let page = input::from_bytes("<memory>", bytes)?;
    parse_pages(vec![page], config).await
}

/// Parse every supported image in `dir`, each as its own document.
///
/// Files are processed one after another in file-name order. A failing file
/// does not stop the rest; its error is returned in place of its output.
pub async fn parse_directory(
    dir: impl AsRef<Path>,
    config: &ParseConfig,
) -> Result<Vec<(PathBuf, Result<DocumentOutput, WaterParseError>)>, WaterParseError> {
    let dir = dir.as_ref();
    let files = input::collect_inputs(dir)?;
    if files.is_empty() {
        return Err(WaterParseError::NoPages {
            detail: format!("no supported images in '{}'", dir.display()),
        });
    }

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let result = parse_file(file.to_string_lossy(), config).await;
        results.push((file, result));
    }
    Ok(results)
}

/// Parse a document and write the merged record as pretty JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn parse_to_file<S: AsRef<str>>(
    inputs: &[S],
    output_path: impl AsRef<Path>,
    config: &ParseConfig,
) -> Result<ParseStats, WaterParseError> {
    let output = parse_document(inputs, config).await?;
    let path = output_path.as_ref();
    let json = serde_json::to_string_pretty(&output.record)
        .map_err(|e| WaterParseError::Internal(format!("serialise record: {e}")))?;
    write_atomic(path, json.as_bytes()).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`parse_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn parse_sync(
    input: impl AsRef<str>,
    config: &ParseConfig,
) -> Result<DocumentOutput, WaterParseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| WaterParseError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(parse_file(input, config))
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WaterParseError> {
    let write_failed = |source| WaterParseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run resolved pages through the model, merge, and assign fallback codes.
async fn parse_pages(
    pages: Vec<PageImage>,
    config: &ParseConfig,
) -> Result<DocumentOutput, WaterParseError> {
    let total_start = Instant::now();
    let total_pages = pages.len();
    if total_pages == 0 {
        return Err(WaterParseError::NoPages {
            detail: "no page images".into(),
        });
    }

    let model = resolve_model(config)?;
    let label = model.label();
    info!("Parsing {} page(s) with {}", total_pages, label);

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total_pages);
    }

    let llm_start = Instant::now();
    let results: Vec<PageResult> = stream::iter(pages.into_iter().enumerate().map(|(idx, page)| {
        let model = Arc::clone(&model);
        let config = config.clone();
        async move { run_page(model.as_ref(), idx + 1, total_pages, page, &config).await }
    }))
    .buffered(config.concurrency)
    .collect()
    .await;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let records: Vec<_> = results.iter().filter_map(|p| p.record.clone()).collect();
    let processed = records.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(total_pages, processed);
    }

    if processed == 0 {
        let first_error = results
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(WaterParseError::AllPagesFailed {
            total: total_pages,
            first_error,
        });
    }

    let record = merge::assign_fallback_codes(merge::merge(records));

    let stats = ParseStats {
        total_pages,
        processed_pages: processed,
        failed_pages: total_pages - processed,
        total_input_tokens: results.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: results.iter().map(|p| p.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        llm_duration_ms,
    };

    info!(
        "Parse complete: {}/{} pages, {} parameters, {}ms total",
        processed,
        total_pages,
        record.parameters.len(),
        stats.total_duration_ms
    );

    Ok(DocumentOutput {
        record,
        pages: results,
        stats,
        model: label,
    })
}

/// Encode one page, send it to the model, and fire the progress events.
pub(crate) async fn run_page(
    model: &dyn VisionModel,
    page_num: usize,
    total_pages: usize,
    page: PageImage,
    config: &ParseConfig,
) -> PageResult {
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total_pages);
    }

    let source = page.source.clone();
    let result = match encode::encode_page(page_num, page, config.max_image_pixels).await {
        Ok(image) => llm::process_page(model, page_num, &source, image, config).await,
        Err(e) => PageResult::failed(page_num, source, e),
    };

    if let Some(ref cb) = config.progress_callback {
        match &result.error {
            None => {
                let count = result.record.as_ref().map_or(0, |r| r.parameters.len());
                cb.on_page_complete(page_num, total_pages, count)
            }
            Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
        }
    }
    result
}

/// Instantiate a named provider with the given model.
fn create_vision_model(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn VisionModel>, WaterParseError> {
    let provider: Arc<dyn LLMProvider> = ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| WaterParseError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        })?;
    Ok(Arc::new(LlmVisionModel::new(
        provider,
        format!("{provider_name}/{model}"),
    )))
}

/// Default model for a provider that was named without one.
pub fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("ollama") {
        DEFAULT_OLLAMA_MODEL
    } else {
        DEFAULT_MODEL
    }
}

/// Resolve the model, from most-specific to least-specific.
///
/// 1. **Pre-built seam** (`config.vision_model`): used as-is.
/// 2. **Pre-built provider** (`config.provider`): wrapped; labelled with
///    `config.model` when set.
/// 3. **Named provider + model** (`config.provider_name`): built through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **`OPENAI_API_KEY`** present: OpenAI with `config.model` or the default.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_model(config: &ParseConfig) -> Result<Arc<dyn VisionModel>, WaterParseError> {
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    if let Some(ref provider) = config.provider {
        let label = config.model.clone().unwrap_or_else(|| "custom".to_string());
        return Ok(Arc::new(LlmVisionModel::new(Arc::clone(provider), label)));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model_for(name));
        return create_vision_model(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_model(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_model("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| WaterParseError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or use --provider ollama.\n\
                Error: {}",
                e
            ),
        })?;
    debug!("Provider auto-detected from environment");

    Ok(Arc::new(LlmVisionModel::new(llm_provider, "auto")))
}
