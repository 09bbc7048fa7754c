//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn LayoutProgressCallback>`] via
//! [`crate::config::LayoutConfigBuilder::progress_callback`] to receive events
//! as the orchestrator works through the document.
//!
//! Callers forward events wherever they like (a channel, a WebSocket, a
//! terminal progress bar); the library only invokes the trait.
//!
//! # Example
//!
//! ```rust
//! use edgequake_layout::{LayoutConfig, LayoutProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Reasks(AtomicUsize);
//!
//! impl LayoutProgressCallback for Reasks {
//!     fn on_page_reask(&self, _page: usize, _findings: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = LayoutConfig::builder()
//!     .progress_callback(Arc::new(Reasks(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// Extraction events (`on_page_extracted`, `on_page_error`) may arrive
/// concurrently and out of page order; review events (`on_page_reask`,
/// `on_budget_exhausted`) come from the sequential review loop. All methods
/// default to no-ops.
pub trait LayoutProgressCallback: Send + Sync {
    /// Called once, after page selection, before any extraction.
    fn on_run_start(&self, planned_pages: usize) {
        let _ = planned_pages;
    }

    /// A page's first extraction finished.
    ///
    /// * `blocks`: number of blocks in the raw response
    fn on_page_extracted(&self, page_num: usize, total_pages: usize, blocks: usize) {
        let _ = (page_num, total_pages, blocks);
    }

    /// A page's extraction failed fatally; the run is about to abort.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// A page failed review and is being extracted again.
    fn on_page_reask(&self, page_num: usize, findings: usize) {
        let _ = (page_num, findings);
    }

    /// The budget guard stopped the review loop.
    fn on_budget_exhausted(&self, spend_usd: f64, cap_usd: f64) {
        let _ = (spend_usd, cap_usd);
    }

    /// Called once after composition.
    fn on_run_complete(&self, planned_pages: usize, reviewed_pages: usize) {
        let _ = (planned_pages, reviewed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl LayoutProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::LayoutConfig`].
pub type ProgressCallback = Arc<dyn LayoutProgressCallback>;
