//! Document-level tests driven by a scripted in-process model.
//!
//! Real PNG files are written to a temp dir and run through the full
//! input → encode → model → recover → merge path; only the model is fake.

use edgequake_llm::{ChatMessage, CompletionOptions};
use edgequake_water::{
    parse_bytes, parse_directory, parse_document, parse_file, parse_stream, parse_to_file,
    ModelReply, PageError, ParseConfig, ParseProgressCallback, VisionModel, WaterParseError,
};
use futures::future::BoxFuture;
use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays canned answers in call order. `Err` simulates a provider failure.
struct Scripted {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    fn ok(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(*r)).collect())
    }
}

impl VisionModel for Scripted {
    fn chat<'a>(
        &'a self,
        _messages: &'a [ChatMessage],
        _options: &'a CompletionOptions,
    ) -> BoxFuture<'a, Result<ModelReply, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()));
        Box::pin(async move {
            next.map(|content| ModelReply {
                content,
                prompt_tokens: 100,
                completion_tokens: 20,
            })
        })
    }

    fn label(&self) -> String {
        "scripted".into()
    }
}

fn config_with(model: Arc<Scripted>) -> ParseConfig {
    ParseConfig::builder()
        .vision_model(model)
        .max_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

fn write_png(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([200, 200, 200, 255])))
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path.to_string_lossy().into_owned()
}

fn png_bytes() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

const PAGE_1: &str = r#"Here is the form:
```json
{"blankNumber": "118", "customerName": "Иванов И.И.", "intakeType": "скважина",
 "parameters": [
   {"name": "Водородный показатель", "value": 7.1, "unit": "ед. pH", "code": "ph"},
   {"name": "Железо общее", "value": "0.9", "unit": "мг/л", "thresholdLimit": 0.3, "code": "iron"}
 ]}
```"#;

const PAGE_2: &str = r#"{"blank_number": "118", "customer_name": "Петров", "object_address": "д. Сосновка, 5",
 "params": [
   {"name": "Водородный показатель", "value": 7.4, "param_code": "ph"},
   {"name": "Мутность", "value": 1.5, "unit": "ЕМФ"},
 ],
 "model_analysis": "Превышение по железу"}"#;

// ── Multi-page documents ─────────────────────────────────────────────────────

#[tokio::test]
async fn two_pages_merge_in_page_order() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_png(dir.path(), "p1.png"), write_png(dir.path(), "p2.png")];
    let model = Scripted::ok(&[PAGE_1, PAGE_2]);

    let output = parse_document(&inputs, &config_with(model)).await.unwrap();
    let r = &output.record;

    assert_eq!(r.blank_number, "118");
    assert_eq!(r.customer_name, "Иванов И.И.");
    assert_eq!(r.object_address, "д. Сосновка, 5");
    assert_eq!(r.notes, "Превышение по железу");

    let codes: Vec<&str> = r.parameters.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes.len(), 3);
    assert_eq!(&codes[..2], &["ph", "iron"]);
    assert_eq!(r.parameters[0].value, 7.1);
    assert_eq!(r.parameters[1].threshold_limit, Some(0.3));
    assert!(!codes[2].is_empty(), "fallback code assigned to turbidity");

    assert_eq!(output.model, "scripted");
    assert_eq!(output.stats.total_pages, 2);
    assert_eq!(output.stats.processed_pages, 2);
    assert_eq!(output.stats.failed_pages, 0);
    assert_eq!(output.stats.total_input_tokens, 200);
    assert_eq!(output.stats.total_output_tokens, 40);
    assert_eq!(output.pages[0].page_num, 1);
    assert_eq!(output.pages[1].page_num, 2);
    assert_eq!(output.pages[1].raw_response, PAGE_2);
}

#[tokio::test]
async fn prose_page_is_a_page_error_not_a_document_error() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_png(dir.path(), "p1.png"), write_png(dir.path(), "p2.png")];
    let model = Scripted::ok(&["I cannot read this page, sorry.", PAGE_1]);

    let output = parse_document(&inputs, &config_with(model.clone()))
        .await
        .unwrap();

    assert_eq!(output.stats.processed_pages, 1);
    assert_eq!(output.stats.failed_pages, 1);
    assert_eq!(output.pages[0].error, Some(PageError::NoJsonFound { page: 1 }));
    assert!(output.pages[0].record.is_none());
    assert_eq!(output.record.blank_number, "118");
    // Unusable replies are not retried.
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unrepairable_page_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_png(dir.path(), "p1.png"), write_png(dir.path(), "p2.png")];
    let model = Scripted::ok(&[PAGE_1, "{ this is not json"]);

    let output = parse_document(&inputs, &config_with(model)).await.unwrap();
    assert_eq!(
        output.pages[1].error,
        Some(PageError::JsonUnrecoverable { page: 2 })
    );
}

#[tokio::test]
async fn every_page_failing_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_png(dir.path(), "p1.png"), write_png(dir.path(), "p2.png")];
    let model = Scripted::ok(&["no data", "still no data"]);

    let err = parse_document(&inputs, &config_with(model)).await.unwrap_err();
    match err {
        WaterParseError::AllPagesFailed { total, first_error } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("Page 1"), "got: {first_error}");
            assert!(first_error.contains("no JSON"), "got: {first_error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Retries ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn provider_error_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "form.png");
    let model = Scripted::new(vec![Err("503 Service Unavailable"), Ok(PAGE_2)]);

    let output = parse_file(&input, &config_with(model.clone())).await.unwrap();
    assert_eq!(output.pages[0].retries, 1);
    assert_eq!(output.record.customer_name, "Петров");
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_report_llm_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "form.png");
    let model = Scripted::new(vec![Err("boom"), Err("boom again")]);

    let err = parse_file(&input, &config_with(model.clone())).await.unwrap_err();
    assert!(
        matches!(&err, WaterParseError::AllPagesFailed { first_error, .. } if first_error.contains("boom again")),
        "got: {err}"
    );
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

// ── Inputs ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_image_with_image_extension_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    std::fs::write(&path, b"%PDF-1.7 not really a png").unwrap();
    let model = Scripted::ok(&[PAGE_1]);

    let err = parse_file(path.to_string_lossy(), &config_with(model.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, WaterParseError::NotAnImage { .. }), "got: {err}");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn in_memory_bytes() {
    let model = Scripted::ok(&[PAGE_1]);
    let output = parse_bytes(png_bytes(), &config_with(model)).await.unwrap();
    assert_eq!(output.record.blank_number, "118");
    assert_eq!(output.pages[0].source, "<memory>");
}

#[tokio::test]
async fn directory_files_are_separate_documents() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "b.png");
    write_png(dir.path(), "a.png");
    std::fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();
    let model = Scripted::ok(&[PAGE_1, "nothing here"]);

    let results = parse_directory(dir.path(), &config_with(model)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].0.ends_with("a.png"));
    assert_eq!(results[0].1.as_ref().unwrap().record.blank_number, "118");
    assert!(results[1].0.ends_with("b.png"));
    assert!(matches!(
        results[1].1,
        Err(WaterParseError::AllPagesFailed { total: 1, .. })
    ));
}

#[tokio::test]
async fn empty_directory_is_no_pages() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::ok(&[]);
    assert!(matches!(
        parse_directory(dir.path(), &config_with(model)).await,
        Err(WaterParseError::NoPages { .. })
    ));
}

// ── Output ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn parse_to_file_writes_record_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "form.png");
    let out = dir.path().join("out/record.json");
    let model = Scripted::ok(&[PAGE_1]);

    let stats = parse_to_file(&[input], &out, &config_with(model)).await.unwrap();
    assert_eq!(stats.processed_pages, 1);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["blankNumber"], "118");
    assert_eq!(written["parameters"][1]["code"], "iron");
    assert!(!dir.path().join("out/record.json.tmp").exists());
}

#[tokio::test]
async fn parse_result_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "form.png");
    let model = Scripted::ok(&[PAGE_1]);

    let output = parse_file(&input, &config_with(model)).await.unwrap();
    let v = serde_json::to_value(output.into_parse_result("form.png")).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["data"]["blankNumber"], "118");
    assert!(v.get("error").is_none());
    assert_eq!(v["meta"]["model"], "scripted");
    assert_eq!(v["meta"]["sourceFile"], "form.png");
    assert_eq!(v["meta"]["pages"], 1);
}

// ── Progress & streaming ─────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ParseProgressCallback for Recorder {
    fn on_document_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, parameter_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok {page_num} {parameter_count}"));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {page_num}"));
    }
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn progress_events_follow_pages() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_png(dir.path(), "p1.png"), write_png(dir.path(), "p2.png")];
    let recorder = Arc::new(Recorder::default());
    let config = ParseConfig::builder()
        .vision_model(Scripted::ok(&[PAGE_1, "garbage"]))
        .max_retries(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    parse_document(&inputs, &config).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events, vec!["start 2", "ok 1 2", "err 2", "done 1/2"]);
}

#[tokio::test]
async fn stream_yields_unmerged_pages() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_png(dir.path(), "p1.png"), write_png(dir.path(), "p2.png")];
    let config = config_with(Scripted::ok(&[PAGE_1, PAGE_2]));

    let pages: Vec<_> = parse_stream(&inputs, &config).await.unwrap().collect().await;
    assert_eq!(pages.len(), 2);
    let second = pages[1].as_ref().unwrap().record.as_ref().unwrap();
    assert_eq!(second.customer_name, "Петров");
    assert_eq!(second.parameters[1].code, "");
}
