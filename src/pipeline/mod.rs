//! Pipeline stages for image-to-record extraction.
//!
//! Each submodule implements exactly one transformation step. The four
//! recovery stages are synchronous pure functions; only `input` and `llm`
//! touch the network or the filesystem.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ extract ──▶ repair ──▶ normalize ──▶ merge
//! (path/URL) (base64)  (VLM)   (substring)  (Value)    (record)     (document)
//! ```
//!
//! 1. [`input`]: resolve a path or URL to validated image bytes
//! 2. [`encode`]: downscale oversized scans and base64-wrap them for the
//!    multimodal request body
//! 3. [`llm`]: drive the VLM call with retry/backoff
//! 4. [`extract`]: find the JSON-shaped substring of the reply
//! 5. [`repair`]: parse it, applying increasingly aggressive fixes
//! 6. [`normalize`]: map the parsed value onto the canonical record
//! 7. [`merge`]: fold page records into one, then fill missing codes
//!
//! Steps 4–6 are chained by [`recover`].

pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod merge;
pub mod normalize;
pub mod repair;

use crate::logger::RecoveryLog;
use crate::record::WaterAnalysisRecord;
use thiserror::Error;

/// Why a model reply produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// Nothing JSON-shaped in the reply.
    #[error("no JSON found in model response")]
    NoJsonFound,

    /// A JSON-shaped substring existed but every repair strategy failed.
    #[error("JSON in model response could not be repaired")]
    JsonUnrecoverable,
}

/// Turn one raw model reply into a canonical record.
pub fn recover(
    text: &str,
    log: Option<&dyn RecoveryLog>,
) -> Result<WaterAnalysisRecord, RecoveryError> {
    let block = extract::extract_json_block(text).ok_or(RecoveryError::NoJsonFound)?;
    let value = repair::repair(block, log).ok_or(RecoveryError::JsonUnrecoverable)?;
    Ok(normalize::normalize(&value))
}
