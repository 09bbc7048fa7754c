//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! that lives exactly as long as the [`ResolvedInput`]. The `%PDF` magic is
//! checked up front so a mistyped path yields `NotAPdf` instead of an opaque
//! pdfium error deep inside the render stage.

use crate::error::LayoutError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is held to keep the file alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, LayoutError> {
    if input.trim().is_empty() {
        return Err(LayoutError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// `Err(magic)` when the header is readable but is not `%PDF`.
fn check_magic(header: &[u8]) -> Result<(), [u8; 4]> {
    match header.get(..4) {
        Some(head) if head != PDF_MAGIC => {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(head);
            Err(magic)
        }
        _ => Ok(()),
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, LayoutError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(LayoutError::FileNotFound { path });
    }

    let mut header = Vec::with_capacity(4);
    match std::fs::File::open(&path) {
        Ok(f) => {
            f.take(4)
                .read_to_end(&mut header)
                .map_err(|_| LayoutError::PermissionDenied { path: path.clone() })?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(LayoutError::PermissionDenied { path });
        }
        Err(_) => return Err(LayoutError::FileNotFound { path }),
    }
    if let Err(magic) = check_magic(&header) {
        return Err(LayoutError::NotAPdf { path, magic });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, LayoutError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| LayoutError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            LayoutError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let temp_dir = TempDir::new().map_err(|e| LayoutError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    if let Err(magic) = check_magic(&bytes) {
        return Err(LayoutError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| LayoutError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it looks like a file name, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
