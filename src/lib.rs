//! # edgequake-layout
//!
//! Turn PDF pages into validated layout blocks using Vision Language Models.
//!
//! Each selected page is rasterised, sent to a vision model with an
//! instruction to describe the page as JSON layout blocks (title, heading,
//! paragraph, table, figure, …) with normalised bounding boxes, and the answer
//! is checked: malformed schema, out-of-range boxes and heavily overlapping
//! blocks trigger a single corrective re-ask. A per-run budget caps how much
//! re-asking is allowed. The reviewed pages are composed into Markdown, plain
//! text and a `layout.json` document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input        resolve local file or download from URL
//!  ├─ 2. Render       rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Extract      concurrent vision calls, results in page order
//!  ├─ 4. Review       schema + geometry findings, one re-ask under budget
//!  ├─ 5. Finalize     text-layer fallback, page sizes
//!  └─ 6. Compose      Markdown, text, metadata, optional files on disk
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_layout::{convert, LayoutConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = LayoutConfig::builder().budget_usd(0.50).build()?;
//!     let output = convert("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     if output.stats.is_truncated() {
//!         eprintln!("budget hit after {} pages", output.stats.reviewed_pages);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Custom vision backends
//!
//! Anything implementing [`VisionCapability`] can stand in for an LLM
//! provider; set it with [`LayoutConfigBuilder::capability`] and feed
//! pre-rendered pages to [`process_rendered`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2layout` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    provider_default_concurrency, select_pages, LayoutConfig, LayoutConfigBuilder, OutputKind,
    PageSelection, PageSpan, RetryPolicy,
};
pub use convert::{
    convert, convert_sync, convert_to_dir, inspect, process_rendered, resolve_capability,
};
pub use error::{CapabilityError, FailureKind, LayoutError, BUDGET_EXCEEDED_EXIT_CODE};
pub use model::{BBox, Block, BlockKind, PageLayout, PageTask, TablePayload};
pub use output::{
    ArtifactManifest, DocumentInfo, DocumentMetadata, ExportOptions, LayoutOutput, PageMetadata,
    PageReport, RunStats,
};
pub use pipeline::orchestrate::PageState;
pub use pipeline::render::RenderedPage;
pub use pipeline::validate::{Finding, FindingKind};
pub use pipeline::vision::{LlmVisionCapability, VisionCapability, VisionRequest, VisionResponse};
pub use progress::{LayoutProgressCallback, NoopProgressCallback, ProgressCallback};
