//! Artifact export: write a run's outputs into a directory.
//!
//! Layout of the target directory:
//!
//! ```text
//! <dir>/document.md                 OutputKind::Markdown
//! <dir>/document.txt                OutputKind::Text
//! <dir>/layout.json                 OutputKind::LayoutJson
//! <dir>/overlays/page-NNNN.png      ExportOptions::overlays
//! <dir>/intermediate/page-NNNN.json ExportOptions::intermediate
//! ```
//!
//! Every file is written to a sibling `.tmp` file first and renamed into
//! place, so a crash never leaves a half-written artifact behind.

use crate::config::OutputKind;
use crate::error::LayoutError;
use crate::output::{ArtifactManifest, ExportOptions, LayoutOutput};
use crate::pipeline::render::RenderedPage;
use crate::pipeline::{encode, overlay};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name used for an output kind.
pub fn primary_file_name(kind: OutputKind) -> &'static str {
    match kind {
        OutputKind::Markdown => "document.md",
        OutputKind::Text => "document.txt",
        OutputKind::LayoutJson => "layout.json",
    }
}

/// Per-page artifact name, e.g. `page-0007.png`.
pub fn page_file_name(page_number: usize, ext: &str) -> String {
    format!("page-{page_number:04}.{ext}")
}

/// Write `bytes` to `path` via temp file + rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LayoutError> {
    let io_err = |source| LayoutError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn to_json_bytes(value: &impl serde::Serialize) -> Result<Vec<u8>, LayoutError> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| LayoutError::Internal(format!("JSON serialisation failed: {e}")))
}

/// Write the requested artifacts and return the paths written.
///
/// `rendered` supplies the page rasters for overlays; pages rendered without
/// a raster are skipped with a warning.
pub async fn write_artifacts(
    output: &LayoutOutput,
    rendered: &[RenderedPage],
    dir: &Path,
    kinds: &[OutputKind],
    options: ExportOptions,
) -> Result<ArtifactManifest, LayoutError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| LayoutError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut manifest = ArtifactManifest::default();

    for kind in OutputKind::ALL.into_iter().filter(|k| kinds.contains(k)) {
        let path = dir.join(primary_file_name(kind));
        let bytes = match kind {
            OutputKind::Markdown => output.markdown.clone().into_bytes(),
            OutputKind::Text => output.text.clone().into_bytes(),
            OutputKind::LayoutJson => to_json_bytes(&json!({
                "pages": output.pages,
                "metadata": output.metadata,
            }))?,
        };
        write_atomic(&path, &bytes).await?;
        manifest.primary.push(path);
    }

    if options.overlays {
        let jobs: Vec<_> = output
            .pages
            .iter()
            .zip(rendered)
            .filter_map(|(layout, page)| match &page.raster {
                Some(raster) => Some((layout.clone(), raster.clone())),
                None => {
                    warn!("Page {}: no raster kept, skipping overlay", layout.page_number);
                    None
                }
            })
            .collect();

        let encoded = tokio::task::spawn_blocking(move || {
            jobs.into_iter()
                .map(|(layout, raster)| {
                    let img = image::DynamicImage::ImageRgba8(overlay::draw_overlay(&raster, &layout));
                    encode::png_bytes(&img)
                        .map(|png| (layout.page_number, png))
                        .map_err(|e| LayoutError::Internal(format!("Overlay encoding failed: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| LayoutError::Internal(format!("Overlay task panicked: {e}")))??;

        for (page_number, png) in encoded {
            let path = dir.join("overlays").join(page_file_name(page_number, "png"));
            write_atomic(&path, &png).await?;
            manifest.overlays.push(path);
        }
    }

    if options.intermediate {
        for (layout, report) in output.pages.iter().zip(&output.reports) {
            let path = dir
                .join("intermediate")
                .join(page_file_name(layout.page_number, "json"));
            let bytes = to_json_bytes(&json!({ "page": layout, "report": report }))?;
            write_atomic(&path, &bytes).await?;
            manifest.intermediate.push(path);
        }
    }

    info!(
        "Wrote {} artifact(s) to {}",
        manifest.len(),
        dir.display()
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(page_file_name(7, "png"), "page-0007.png");
        assert_eq!(page_file_name(12345, "json"), "page-12345.json");
        assert_eq!(primary_file_name(OutputKind::LayoutJson), "layout.json");
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/document.md");
        write_atomic(&path, b"# hi").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hi");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
