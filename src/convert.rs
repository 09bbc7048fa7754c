//! Run entry points: PDF or URL in, [`LayoutOutput`] (and optionally files
//! on disk) out.
//!
//! ```text
//! resolve input ─▶ select pages ─▶ render ─▶ orchestrate ─▶ compose ─▶ [export]
//! ```
//!
//! [`process_rendered`] starts at the orchestrate step, for callers that
//! already hold page images (and for tests, which never need pdfium).

use crate::config::{LayoutConfig, OutputKind};
use crate::error::LayoutError;
use crate::export;
use crate::model::PageTask;
use crate::output::{ArtifactManifest, DocumentInfo, ExportOptions, LayoutOutput, RunStats};
use crate::pipeline::orchestrate::{Orchestrator, PageState};
use crate::pipeline::render::{self, RenderedPage};
use crate::pipeline::vision::{LlmVisionCapability, VisionCapability, VisionInvoker};
use crate::pipeline::{compose, input};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Extract the layout of a PDF file or URL.
///
/// # Returns
/// `Ok(LayoutOutput)` even when the budget guard cut the review short; check
/// `output.stats.budget_exhausted` and `output.stats.is_truncated()`.
///
/// # Errors
/// Returns `Err(LayoutError)` only for fatal errors: unreadable input, render
/// failure, provider auth / exhausted retries, or strict-mode findings.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &LayoutConfig,
) -> Result<LayoutOutput, LayoutError> {
    let (output, _) = run(input_str.as_ref(), config, false).await?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &LayoutConfig,
) -> Result<LayoutOutput, LayoutError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LayoutError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Run an extraction and write the requested artifacts into `dir`.
///
/// Artifacts are written even when the run was truncated by the budget.
pub async fn convert_to_dir(
    input_str: impl AsRef<str>,
    dir: impl AsRef<Path>,
    kinds: &[OutputKind],
    options: ExportOptions,
    config: &LayoutConfig,
) -> Result<(RunStats, ArtifactManifest), LayoutError> {
    let (output, rendered) = run(input_str.as_ref(), config, options.overlays).await?;
    let manifest =
        export::write_artifacts(&output, &rendered, dir.as_ref(), kinds, options).await?;
    Ok((output.stats, manifest))
}

/// Read PDF document info without contacting any provider.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentInfo, LayoutError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    render::extract_info(resolved.path(), None).await
}

/// Orchestrate and compose pages that are already rendered.
///
/// Pages are processed in the order given.
pub async fn process_rendered(
    pages: &[RenderedPage],
    config: &LayoutConfig,
) -> Result<LayoutOutput, LayoutError> {
    let capability = resolve_capability(config)?;
    extract_rendered(pages, capability, config).await
}

async fn extract_rendered(
    pages: &[RenderedPage],
    capability: Arc<dyn VisionCapability>,
    config: &LayoutConfig,
) -> Result<LayoutOutput, LayoutError> {
    let start = Instant::now();
    info!(
        "Extracting {} page(s) with provider '{}'",
        pages.len(),
        capability.name()
    );

    let invoker = VisionInvoker::new(
        capability,
        config.retry,
        config.temperature,
        config.max_tokens,
    );
    let orchestrated = Orchestrator::new(invoker, config).run(pages).await?;

    let markdown = compose::compose_markdown(&orchestrated.pages);
    let text = compose::compose_text(&orchestrated.pages);
    let metadata = compose::summarize(&orchestrated.pages);

    let mut stats = orchestrated.stats;
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(stats.planned_pages, stats.reviewed_pages);
    }

    let output = LayoutOutput {
        markdown,
        text,
        pages: orchestrated.pages,
        reports: orchestrated.reports,
        metadata,
        stats,
    };

    if config.strict_validation {
        check_strict(&output)?;
    }
    Ok(output)
}

/// Fail when any reviewed page still carries findings.
fn check_strict(output: &LayoutOutput) -> Result<(), LayoutError> {
    let mut failing = output
        .reports
        .iter()
        .filter(|r| r.state == PageState::Accepted && !r.findings.is_empty());
    let Some(first) = failing.next() else {
        return Ok(());
    };
    Err(LayoutError::ValidationFailed {
        failed: 1 + failing.count(),
        first_page: first.page_number,
        first_finding: first.findings[0].to_string(),
    })
}

async fn run(
    input_str: &str,
    config: &LayoutConfig,
    keep_raster: bool,
) -> Result<(LayoutOutput, Vec<RenderedPage>), LayoutError> {
    let total_start = Instant::now();
    info!("Starting layout extraction: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // Fail on provider configuration before spending time on rendering.
    let capability = resolve_capability(config)?;

    // ── Step 2: Select pages ─────────────────────────────────────────────
    let info = render::extract_info(&pdf_path, config.password.as_deref()).await?;
    let tasks: Vec<PageTask> = config
        .pages
        .to_indices(info.page_count)
        .into_iter()
        .map(|index0| PageTask {
            index0,
            dpi: config.dpi,
        })
        .collect();
    info!(
        "PDF has {} pages, {} selected",
        info.page_count,
        tasks.len()
    );

    // ── Step 3: Rasterise ────────────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(
        &pdf_path,
        &tasks,
        config.max_rendered_pixels,
        config.password.as_deref(),
        keep_raster,
    )
    .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    debug!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

    // ── Step 4: Orchestrate and compose ──────────────────────────────────
    let mut output = extract_rendered(&rendered, capability, config).await?;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {}/{} pages reviewed, {}ms total",
        output.stats.reviewed_pages, output.stats.planned_pages, output.stats.total_duration_ms
    );
    Ok((output, rendered))
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LayoutError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LayoutError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision capability, from most-specific to least-specific.
///
/// 1. **Capability** (`config.capability`): used as-is.
/// 2. **Pre-built provider** (`config.provider`): wrapped in
///    [`LlmVisionCapability`].
/// 3. **Named provider + model** (`config.provider_name`).
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **OpenAI** when `OPENAI_API_KEY` is set, so users with several keys
///    get a predictable default.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_capability(config: &LayoutConfig) -> Result<Arc<dyn VisionCapability>, LayoutError> {
    if let Some(capability) = &config.capability {
        return Ok(Arc::clone(capability));
    }
    let (provider, name) = resolve_provider(config)?;
    Ok(Arc::new(LlmVisionCapability::new(provider, name)))
}

fn resolve_provider(config: &LayoutConfig) -> Result<(Arc<dyn LLMProvider>, String), LayoutError> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(provider) = &config.provider {
        let name = config.provider_name.clone().unwrap_or_else(|| "custom".into());
        return Ok((Arc::clone(provider), name));
    }

    if let Some(name) = &config.provider_name {
        return Ok((create_vision_provider(name, model)?, name.clone()));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return Ok((create_vision_provider(&prov, &env_model)?, prov));
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return Ok((create_vision_provider("openai", model)?, "openai".into()));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LayoutError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok((llm_provider, "auto".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageReport;
    use crate::pipeline::validate::{Finding, FindingKind};

    fn report(page_number: usize, state: PageState, findings: usize) -> PageReport {
        PageReport {
            page_number,
            state,
            findings: (0..findings)
                .map(|i| Finding {
                    kind: FindingKind::Overlap,
                    message: format!("overlap above threshold between a{i} and b{i}"),
                })
                .collect(),
            reasked: findings > 0,
            reask_accepted: false,
            fallback: false,
        }
    }

    fn output(reports: Vec<PageReport>) -> LayoutOutput {
        LayoutOutput {
            markdown: String::new(),
            text: String::new(),
            pages: vec![],
            reports,
            metadata: Default::default(),
            stats: Default::default(),
        }
    }

    #[test]
    fn strict_passes_clean_reviewed_pages() {
        let out = output(vec![report(1, PageState::Accepted, 0)]);
        assert!(check_strict(&out).is_ok());
    }

    #[test]
    fn strict_ignores_unreviewed_pages() {
        let out = output(vec![
            report(1, PageState::Accepted, 0),
            report(2, PageState::Dispatched, 0),
            report(3, PageState::Validated, 2),
        ]);
        assert!(check_strict(&out).is_ok());
    }

    #[test]
    fn strict_counts_failing_pages() {
        let out = output(vec![
            report(1, PageState::Accepted, 0),
            report(2, PageState::Accepted, 1),
            report(4, PageState::Accepted, 3),
        ]);
        match check_strict(&out) {
            Err(LayoutError::ValidationFailed {
                failed,
                first_page,
                first_finding,
            }) => {
                assert_eq!(failed, 2);
                assert_eq!(first_page, 2);
                assert!(first_finding.contains("overlap"));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }
}
