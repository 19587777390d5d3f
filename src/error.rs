//! Error types for the edgequake-water library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`WaterParseError`] is **fatal**: the document cannot be processed at all
//!   (missing file, not an image, provider not configured, every page
//!   failed). Returned as `Err(WaterParseError)` from the `parse_*` entry
//!   points.
//!
//! * [`PageError`] is **non-fatal**: a single page failed (timeout, reply
//!   without usable JSON) while other pages are fine. Stored inside
//!   [`crate::output::PageResult`] so a two-page form still yields a record
//!   when one scan is unreadable.

use crate::pipeline::RecoveryError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-water library.
#[derive(Debug, Error)]
pub enum WaterParseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file extension is not one of the supported image formats.
    #[error("Unsupported file type '{path}'\nSupported: jpg, jpeg, png, webp, gif, bmp")]
    UnsupportedFormat { path: PathBuf },

    /// The file was read but its bytes are not a recognisable image.
    #[error("File is not a valid image: '{path}'\nFirst bytes: {magic:?}")]
    NotAnImage { path: PathBuf, magic: [u8; 4] },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// Nothing to process: empty input list or a directory without images.
    #[error("No pages to process: {detail}")]
    NoPages { detail: String },

    /// Every page failed; there is no record to return.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Pages are numbered from 1 in the order they were supplied.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The image could not be read, downloaded or encoded.
    #[error("Page {page}: input failed: {detail}")]
    InputFailed { page: usize, detail: String },

    /// LLM call failed after retries.
    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// LLM call timed out on the final attempt.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The reply contained nothing JSON-shaped.
    #[error("Page {page}: no JSON found in model response")]
    NoJsonFound { page: usize },

    /// The reply contained JSON that no repair strategy could parse.
    #[error("Page {page}: JSON in model response could not be repaired")]
    JsonUnrecoverable { page: usize },
}

impl PageError {
    /// Attach a page number to a recovery failure.
    pub fn from_recovery(page: usize, err: RecoveryError) -> Self {
        match err {
            RecoveryError::NoJsonFound => Self::NoJsonFound { page },
            RecoveryError::JsonUnrecoverable => Self::JsonUnrecoverable { page },
        }
    }

    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            Self::InputFailed { page, .. }
            | Self::LlmFailed { page, .. }
            | Self::Timeout { page, .. }
            | Self::NoJsonFound { page }
            | Self::JsonUnrecoverable { page } => *page,
        }
    }
}
