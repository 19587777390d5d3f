//! End-to-end integration tests for edgequake-water.
//!
//! These tests use real scanned forms in `./test_cases/` and make live LLM API
//! calls. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_parse_blank -- --nocapture

use edgequake_water::{
    evaluate, parse_directory, parse_file, NoopProgressCallback, ParseConfig,
    ParseProgressCallback, WaterAnalysisRecord, WaterParseError,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no scan at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Assert the record looks like a transcribed form rather than an empty shell.
fn assert_record_quality(record: &WaterAnalysisRecord, context: &str) {
    assert!(
        !record.is_empty(),
        "[{context}] Record carries no data at all"
    );
    assert!(
        !record.parameters.is_empty(),
        "[{context}] Expected at least one measured parameter"
    );
    for p in &record.parameters {
        assert!(p.value.is_finite(), "[{context}] Non-finite value for {}", p.name);
        assert!(!p.code.is_empty(), "[{context}] Parameter {:?} has no code", p.name);
        assert!(
            p.code.is_ascii(),
            "[{context}] Code must be ASCII, got {:?}",
            p.code
        );
    }
    println!(
        "[{context}] ✓  {} parameters, blank {:?}",
        record.parameters.len(),
        record.blank_number
    );
}

// ── Local failure modes (no LLM) ─────────────────────────────────────────────

#[tokio::test]
async fn test_parse_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let result = parse_file("/definitely/not/a/real/blank.jpg", &ParseConfig::default()).await;
    assert!(
        matches!(result, Err(WaterParseError::FileNotFound { .. })),
        "parse_file() should return FileNotFound for a missing file"
    );
}

/// Verify that a Noop callback compiles and does not panic.
#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn ParseProgressCallback> = Arc::new(NoopProgressCallback);
    cb.on_page_error(1, 1, "an error");
}

// ── Extraction quality tests (need LLM API) ──────────────────────────────────

/// Parse one scanned blank with the auto-detected provider.
#[tokio::test]
async fn test_parse_blank() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("blank_1.jpg"));
    let out_path = output_dir().join("blank_1.json");

    let config = ParseConfig::builder()
        .max_retries(2)
        .build()
        .expect("valid config");

    let output = parse_file(path.to_string_lossy(), &config)
        .await
        .expect("parse should succeed");

    assert_eq!(output.stats.processed_pages, 1);
    assert_eq!(output.stats.failed_pages, 0);
    assert!(
        output.stats.total_input_tokens > 0,
        "Should have consumed tokens"
    );
    assert_record_quality(&output.record, "blank_1");

    let findings = evaluate(&output.record);
    assert_eq!(findings.len(), output.record.parameters.len());

    let json = serde_json::to_string_pretty(&output.into_parse_result(path.to_string_lossy()))
        .expect("serialisable");
    std::fs::write(&out_path, &json).ok();
    println!("[blank_1] Saved to {}", out_path.display());
}

/// Parse every scan in `test_cases/` as separate documents.
#[tokio::test]
async fn test_parse_directory() {
    let dir = e2e_skip_unless_ready!(test_cases_dir());

    let config = ParseConfig::builder()
        .max_retries(1)
        .build()
        .expect("valid config");

    let results = match parse_directory(&dir, &config).await {
        Ok(r) => r,
        Err(WaterParseError::NoPages { .. }) => {
            println!("SKIP — no scans in {}", dir.display());
            return;
        }
        Err(e) => panic!("parse_directory failed: {e}"),
    };

    for (path, result) in results {
        let name = path.display().to_string();
        match result {
            Ok(output) => assert_record_quality(&output.record, &name),
            Err(e) => println!("[{name}] ✗  {e}"),
        }
    }
}

// ── Ollama provider e2e tests ────────────────────────────────────────────────

/// Helper: check if Ollama is reachable at the configured host.
async fn ollama_is_available() -> bool {
    let host =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());
    reqwest::Client::new()
        .get(format!("{host}/api/tags"))
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
        .is_ok()
}

/// Gated e2e: parse one blank with a local vision model.
///
/// Requirements:
/// - `E2E_ENABLED=1`
/// - Ollama running at `OLLAMA_HOST` (default: http://localhost:11434)
/// - A vision-capable model pulled: set `OLLAMA_VISION_MODEL`. Defaults to
///   `llama3.2-vision:11b`.
#[tokio::test]
async fn test_ollama_blank() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("blank_1.jpg"));

    if !ollama_is_available().await {
        println!("SKIP — Ollama not reachable (start with: ollama serve)");
        return;
    }

    let model = std::env::var("OLLAMA_VISION_MODEL")
        .unwrap_or_else(|_| "llama3.2-vision:11b".to_string());
    println!("[ollama] Using model: {model}");

    let config = ParseConfig::builder()
        .provider_name("ollama")
        .model(model.clone())
        .max_retries(1)
        .api_timeout_secs(600)
        .build()
        .expect("config must build");

    let output = parse_file(path.to_string_lossy(), &config)
        .await
        .unwrap_or_else(|e| panic!("Ollama parse failed with model '{model}': {e}"));

    assert_eq!(output.stats.processed_pages, 1);
    assert_record_quality(&output.record, "ollama");
}
