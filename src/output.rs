//! Output types: per-page results, the merged document, and the CLI envelope.
//!
//! [`DocumentOutput`] is what the library returns. [`ParseResult`] is the
//! JSON envelope the CLI prints, with a stable camelCase shape:
//!
//! ```json
//! { "success": true, "data": { ... }, "meta": { "model": "...", "elapsedMs": 812,
//!   "sourceFile": "scan.jpg", "pages": 1 } }
//! ```

use crate::error::PageError;
use crate::record::WaterAnalysisRecord;
use serde::{Deserialize, Serialize};

/// Outcome of one page image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed position in the input list.
    pub page_num: usize,
    /// Path or URL the image came from.
    pub source: String,
    /// Record recovered from this page alone, before merging.
    pub record: Option<WaterAnalysisRecord>,
    /// Unmodified model reply; empty when the call never succeeded.
    pub raw_response: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<PageError>,
}

impl PageResult {
    /// A page that failed before reaching the model.
    pub fn failed(page_num: usize, source: impl Into<String>, error: PageError) -> Self {
        Self {
            page_num,
            source: source.into(),
            record: None,
            raw_response: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.record.is_some()
    }
}

/// Aggregate numbers for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// A parsed document: the merged record plus every page's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutput {
    /// Merged record with fallback codes assigned.
    pub record: WaterAnalysisRecord,
    /// Page results in page order.
    pub pages: Vec<PageResult>,
    pub stats: ParseStats,
    /// Label of the model that produced the record.
    pub model: String,
}

impl DocumentOutput {
    /// Wrap into the CLI envelope.
    pub fn into_parse_result(self, source_file: impl Into<String>) -> ParseResult {
        ParseResult {
            success: true,
            data: Some(self.record),
            error: None,
            meta: ParseMeta {
                model: self.model,
                elapsed_ms: self.stats.total_duration_ms,
                source_file: source_file.into(),
                pages: self.stats.total_pages,
            },
        }
    }
}

/// Envelope printed by the CLI for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<WaterAnalysisRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub meta: ParseMeta,
}

impl ParseResult {
    /// Envelope for a document that produced no record.
    pub fn failure(
        error: impl ToString,
        model: impl Into<String>,
        source_file: impl Into<String>,
        elapsed_ms: u64,
        pages: usize,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            meta: ParseMeta {
                model: model.into(),
                elapsed_ms,
                source_file: source_file.into(),
                pages,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseMeta {
    pub model: String,
    pub elapsed_ms: u64,
    pub source_file: String,
    pub pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_envelope_omits_data() {
        let r = ParseResult::failure("no JSON", "ollama/llava", "a.png", 12, 1);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(
            v,
            json!({
                "success": false,
                "error": "no JSON",
                "meta": {"model": "ollama/llava", "elapsedMs": 12, "sourceFile": "a.png", "pages": 1}
            })
        );
    }

    #[test]
    fn success_envelope_carries_record() {
        let output = DocumentOutput {
            record: WaterAnalysisRecord {
                blank_number: "42".into(),
                ..Default::default()
            },
            pages: Vec::new(),
            stats: ParseStats {
                total_pages: 2,
                total_duration_ms: 900,
                ..Default::default()
            },
            model: "openai/gpt-4.1-nano".into(),
        };
        let v = serde_json::to_value(output.into_parse_result("form.jpg")).unwrap();
        assert_eq!(v["success"], json!(true));
        assert_eq!(v["data"]["blankNumber"], json!("42"));
        assert_eq!(v["meta"]["pages"], json!(2));
        assert_eq!(v["meta"]["elapsedMs"], json!(900));
        assert!(v.get("error").is_none());
    }

    #[test]
    fn failed_page_has_no_record() {
        let p = PageResult::failed(2, "b.png", PageError::NoJsonFound { page: 2 });
        assert!(!p.is_success());
        assert_eq!(p.page_num, 2);
    }
}
