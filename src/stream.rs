//! Streaming parse API: emit page results as they complete.
//!
//! Unlike the eager [`crate::parse::parse_document`], which merges pages
//! before returning, [`parse_stream`] yields each page's own record as soon
//! as it is ready. Items arrive in page order even with `concurrency > 1`.
//! Callers that want the merged record feed the `Ok` records into
//! [`crate::pipeline::merge::merge`] themselves.

use crate::config::ParseConfig;
use crate::error::{PageError, WaterParseError};
use crate::output::PageResult;
use crate::parse::{resolve_model, run_page};
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageResult, PageError>> + Send>>;

/// Parse images as pages of one document, streaming per-page results.
///
/// # Returns
/// - `Ok(PageStream)`: one item per input, in input order
/// - `Err(WaterParseError)`: fatal error (file not found, not an image,
///   provider not configured)
pub async fn parse_stream<S: AsRef<str>>(
    inputs: &[S],
    config: &ParseConfig,
) -> Result<PageStream, WaterParseError> {
    if inputs.is_empty() {
        return Err(WaterParseError::NoPages {
            detail: "no input files given".into(),
        });
    }
    info!("Starting streaming parse of {} page(s)", inputs.len());

    let mut pages = Vec::with_capacity(inputs.len());
    for input_str in inputs {
        pages.push(input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?);
    }

    let model = resolve_model(config)?;
    let total_pages = pages.len();
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(pages.into_iter().enumerate().map(move |(idx, page)| {
        let model = Arc::clone(&model);
        let cfg = config.clone();
        async move {
            let mut result = run_page(model.as_ref(), idx + 1, total_pages, page, &cfg).await;
            match result.error.take() {
                None => Ok(result),
                Some(err) => Err(err),
            }
        }
    }))
    .buffered(concurrency);

    Ok(Box::pin(s))
}
