//! PDF rasterisation: render selected pages to images plus their raw text.
//!
//! pdfium is not async-safe, so every call runs inside
//! `tokio::task::spawn_blocking`.
//!
//! `max_rendered_pixels` caps the longest edge of every image regardless of
//! the page's physical size.
//!
//! ## Raw text
//!
//! Alongside each image we pull the page's embedded text layer. It is never
//! sent to the model; the orchestrator uses it to synthesise a fallback block
//! when extraction comes back without any text.

use crate::error::LayoutError;
use crate::model::PageTask;
use crate::output::DocumentInfo;
use crate::pipeline::encode;
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A page ready for extraction.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 0-based page index in the source document.
    pub index0: usize,
    /// Base64 PNG sent to the vision capability.
    pub image: ImageData,
    pub width_px: u32,
    pub height_px: u32,
    /// Embedded text layer, if the page has one.
    pub text: Option<String>,
    /// Decoded bitmap, kept only when overlays will be drawn.
    pub raster: Option<DynamicImage>,
}

impl RenderedPage {
    /// Build a page from an in-memory image. Used for pre-rendered input.
    pub fn from_image(
        index0: usize,
        img: DynamicImage,
        text: Option<String>,
        keep_raster: bool,
    ) -> Result<Self, LayoutError> {
        let image = encode::encode_page(&img).map_err(|e| LayoutError::RasterisationFailed {
            page: index0 + 1,
            detail: format!("Image encoding failed: {e}"),
        })?;
        Ok(Self {
            index0,
            image,
            width_px: img.width(),
            height_px: img.height(),
            text: text.filter(|t| !t.trim().is_empty()),
            raster: keep_raster.then_some(img),
        })
    }

    /// 1-based page number.
    pub fn page_number(&self) -> usize {
        self.index0 + 1
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, LayoutError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(raw) => {
            let path = PathBuf::from(raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| LayoutError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Rasterise the given pages.
///
/// Out-of-range tasks are skipped with a warning. Any other page failure is
/// fatal: a document we cannot render is not a document we can lay out.
pub async fn render_pages(
    pdf_path: &Path,
    tasks: &[PageTask],
    max_pixels: u32,
    password: Option<&str>,
    keep_raster: bool,
) -> Result<Vec<RenderedPage>, LayoutError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    let tasks = tasks.to_vec();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, &tasks, max_pixels, password.as_deref(), keep_raster)
    })
    .await
    .map_err(|e| LayoutError::Internal(format!("Render task panicked: {e}")))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    tasks: &[PageTask],
    max_pixels: u32,
    password: Option<&str>,
    keep_raster: bool,
) -> Result<Vec<RenderedPage>, LayoutError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(tasks.len());

    for task in tasks {
        let idx = task.index0;
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| LayoutError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let render_config = render_config_for(&page, task.dpi, max_pixels);
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            LayoutError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            }
        })?;

        let text = page.text().ok().map(|t| t.all());
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(RenderedPage::from_image(idx, image, text, keep_raster)?);
    }

    Ok(results)
}

/// Target width at the requested DPI, clamped to the pixel cap.
fn render_config_for(page: &PdfPage, dpi: u32, max_pixels: u32) -> PdfRenderConfig {
    // PDF points are 1/72 inch.
    let width_px = (page.width().value * dpi as f32 / 72.0).round() as i32;
    PdfRenderConfig::new()
        .set_target_width(width_px.clamp(1, max_pixels as i32))
        .set_maximum_height(max_pixels as i32)
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, LayoutError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                LayoutError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                LayoutError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            LayoutError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Read document info without rendering pages.
pub async fn extract_info(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, LayoutError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_info_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| LayoutError::Internal(format!("Metadata task panicked: {e}")))?
}

fn extract_info_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, LayoutError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
