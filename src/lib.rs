//! # edgequake-water
//!
//! Extract structured water-analysis records from scanned lab forms using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Vision models read a photographed lab form well, but their replies are
//! unreliable as data: the JSON arrives inside markdown fences or prose, with
//! trailing commas or comments, cut off by the token limit, or keyed in
//! snake_case one time and camelCase the next. This crate recovers a
//! fixed-shape [`WaterAnalysisRecord`] from whatever the model returned and
//! merges the pages of a multi-page form into one record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image(s)
//!  │
//!  ├─ 1. Input      local file, directory entry, or URL → validated bytes
//!  ├─ 2. Encode     downscale + base64 ImageData (spawn_blocking)
//!  ├─ 3. VLM        gpt-4.1-nano / llama3.2-vision / claude / … with retry
//!  ├─ 4. Extract    JSON-shaped substring of the reply
//!  ├─ 5. Repair     ordered repair strategies until it parses
//!  ├─ 6. Normalize  alias tables → canonical record
//!  └─ 7. Merge      first-wins across pages, fallback parameter codes
//! ```
//!
//! Steps 4–6 are pure and usable on their own through [`recover`]:
//!
//! ```rust
//! use edgequake_water::recover;
//!
//! let reply = "Sure!\n```json\n{\"blank_number\": \"42\", \"params\": [{\"name\": \"pH\", \"value\": \"7.0\",}]}\n```";
//! let record = recover(reply, None).unwrap();
//! assert_eq!(record.blank_number, "42");
//! assert_eq!(record.parameters[0].value, 7.0);
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_water::{parse_file, ParseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ParseConfig::default();
//!     let output = parse_file("form.jpg", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `water2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod logger;
pub mod norms;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ParseConfig, ParseConfigBuilder};
pub use error::{PageError, WaterParseError};
pub use logger::{NoopLog, RecoveryLog, TracingLog};
pub use norms::{evaluate, exceeds_norm, get_norm, NormFinding, NormReference, NormStatus};
pub use output::{DocumentOutput, PageResult, ParseMeta, ParseResult, ParseStats};
pub use parse::{parse_bytes, parse_directory, parse_document, parse_file, parse_sync, parse_to_file};
pub use pipeline::extract::extract_json_block;
pub use pipeline::llm::{LlmVisionModel, ModelReply, VisionModel};
pub use pipeline::merge::{assign_fallback_codes, merge};
pub use pipeline::normalize::normalize;
pub use pipeline::repair::repair;
pub use pipeline::{recover, RecoveryError};
pub use progress::{NoopProgressCallback, ParseProgressCallback};
pub use record::{WaterAnalysisRecord, WaterParameter};
pub use stream::parse_stream;
