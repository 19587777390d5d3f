//! Input resolution: turn a user-supplied path or URL into validated image bytes.
//!
//! Page images are small enough (a few MB) to hold in memory, so URLs are
//! downloaded straight into a buffer. The bytes are sniffed with
//! [`image::guess_format`] before anything is sent to the model, so a PDF
//! renamed to `.jpg` fails here with a clear error instead of producing an
//! empty reply from the model.

use crate::error::WaterParseError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions accepted for local inputs and directory scans.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// One page image, read and validated.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Path or URL as supplied by the caller.
    pub source: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl PageImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// `true` when the path has one of [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Resolve a path or URL to image bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PageImage, WaterParseError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Wrap in-memory bytes, validating the image signature.
///
/// `source` is only a label for logs and output metadata.
pub fn from_bytes(source: impl Into<String>, bytes: Vec<u8>) -> Result<PageImage, WaterParseError> {
    let source = source.into();
    let format = sniff_format(&bytes, Path::new(&source))?;
    Ok(PageImage {
        source,
        bytes,
        format,
    })
}

/// Every supported image directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>, WaterParseError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => WaterParseError::FileNotFound {
            path: dir.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => WaterParseError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => WaterParseError::Internal(format!("read_dir {}: {}", dir.display(), e)),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_supported_image(p))
        .collect();
    files.sort();

    debug!("Found {} images in {}", files.len(), dir.display());
    Ok(files)
}

/// Read a local file, validating existence, extension and image signature.
async fn resolve_local(path_str: &str) -> Result<PageImage, WaterParseError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(WaterParseError::FileNotFound { path });
    }
    if !is_supported_image(&path) {
        return Err(WaterParseError::UnsupportedFormat { path });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(WaterParseError::PermissionDenied { path });
        }
        Err(_) => return Err(WaterParseError::FileNotFound { path }),
    };

    let format = sniff_format(&bytes, &path)?;
    debug!("Resolved local image: {} ({:?})", path.display(), format);

    Ok(PageImage {
        source: path_str.to_string(),
        bytes,
        format,
    })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<PageImage, WaterParseError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| WaterParseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            WaterParseError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            WaterParseError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(WaterParseError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            WaterParseError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            WaterParseError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let format = sniff_format(&bytes, Path::new(url))?;
    info!("Downloaded {} bytes ({:?})", bytes.len(), format);

    Ok(PageImage {
        source: url.to_string(),
        bytes: bytes.to_vec(),
        format,
    })
}

/// Identify the image format from its leading bytes.
fn sniff_format(bytes: &[u8], path: &Path) -> Result<ImageFormat, WaterParseError> {
    match image::guess_format(bytes) {
        Ok(
            f @ (ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::WebP
            | ImageFormat::Bmp),
        ) => Ok(f),
        Ok(_) => Err(WaterParseError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
        Err(_) => {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            Err(WaterParseError::NotAnImage {
                path: path.to_path_buf(),
                magic,
            })
        }
    }
}
