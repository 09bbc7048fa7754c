//! Page orchestration: concurrent extraction, sequential review, bounded
//! reasking under a budget, and fallback injection.
//!
//! ## Phases
//!
//! ```text
//!  fan-out (bounded, ordered)     review loop (sequential)         finalize
//!  ───────────────────────────   ───────────────────────────────   ─────────────────
//!  Pending ─▶ Dispatched ──────▶ Validated ─┬─▶ Accepted            fallback text,
//!                                           └─▶ Reasking ─▶         backfill sizes,
//!                                               Revalidated ─▶      page numbers
//!                                               Accepted
//! ```
//!
//! Extraction runs concurrently through `buffered(n)`, which yields results
//! in submission order regardless of completion order, so page `i` of the
//! result is always page `i` of the input.
//!
//! The review loop is single-threaded. It owns the [`BudgetState`] and is the
//! only writer of page slots, so no locking is needed. When the budget guard
//! fires the loop stops: pages not yet reviewed keep their first extraction
//! (state `Dispatched`) and still flow into composition. Reasks are never
//! cancelled mid-flight; the guard only prevents new ones. Reaching the cap
//! on the last page's reask is not a stop: nothing is left to skip.
//!
//! Finalize runs on every page, reviewed or not: after the fallback, blocks
//! other than figures, equations and tables with rows must carry text, and
//! any that don't are dropped.

use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::model::{BBox, Block, BlockKind, PageLayout};
use crate::output::{PageReport, RunStats};
use crate::pipeline::budget::BudgetState;
use crate::pipeline::postprocess;
use crate::pipeline::render::RenderedPage;
use crate::pipeline::review::{needs_reask, reconcile, review_page, Reconciled};
use crate::pipeline::validate::Finding;
use crate::pipeline::vision::{Extraction, VisionInvoker};
use crate::progress::{LayoutProgressCallback, ProgressCallback};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Position of a page in the review state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Dispatched,
    Validated,
    Reasking,
    Revalidated,
    Accepted,
}

/// Settled pages, their reports, and the counters of the run.
#[derive(Debug, Clone)]
pub struct Orchestrated {
    pub pages: Vec<PageLayout>,
    pub reports: Vec<PageReport>,
    /// Everything except the render and total durations.
    pub stats: RunStats,
}

struct Slot {
    raw: Value,
    layout: PageLayout,
    findings: Vec<Finding>,
    state: PageState,
    reasked: bool,
    reask_accepted: bool,
}

/// Drives one run over a set of rendered pages.
pub struct Orchestrator {
    invoker: VisionInvoker,
    concurrency: Option<usize>,
    cost_per_page_usd: f64,
    budget_usd: Option<f64>,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(invoker: VisionInvoker, config: &LayoutConfig) -> Self {
        Self {
            invoker,
            concurrency: config.effective_concurrency(),
            cost_per_page_usd: config.cost_per_page_usd,
            budget_usd: config.budget_usd,
            progress: config.progress_callback.clone(),
        }
    }

    fn notify(&self, event: impl FnOnce(&dyn LayoutProgressCallback)) {
        if let Some(cb) = &self.progress {
            event(cb.as_ref());
        }
    }

    /// Extract, review and settle every page.
    ///
    /// # Errors
    /// Fatal provider errors from either the first extraction or a reask.
    /// Validation problems are never errors.
    pub async fn run(&self, rendered: &[RenderedPage]) -> Result<Orchestrated, LayoutError> {
        let start = Instant::now();
        let total = rendered.len();
        let mut stats = RunStats {
            planned_pages: total,
            budget_usd: self.budget_usd,
            ..Default::default()
        };
        self.notify(|cb| cb.on_run_start(total));

        // ── Phase 1: fan-out ─────────────────────────────────────────────
        let extractions = self.extract_all(rendered).await?;
        let mut slots: Vec<Slot> = extractions
            .into_iter()
            .map(|ex| {
                stats.total_input_tokens += ex.input_tokens;
                stats.total_output_tokens += ex.output_tokens;
                Slot {
                    layout: PageLayout::from_value(&ex.value),
                    raw: ex.value,
                    findings: Vec::new(),
                    state: PageState::Dispatched,
                    reasked: false,
                    reask_accepted: false,
                }
            })
            .collect();

        let mut budget = BudgetState::new(self.budget_usd);
        budget.charge(self.cost_per_page_usd * total as f64);

        // ── Phase 2: review and reask ────────────────────────────────────
        for (i, (slot, page)) in slots.iter_mut().zip(rendered).enumerate() {
            let page_number = page.page_number();
            let pages_after = total - i - 1;
            let first = review_page(&slot.raw);
            slot.layout = first.layout;
            slot.findings = first.findings;
            slot.state = PageState::Validated;

            if !needs_reask(&slot.findings) {
                slot.state = PageState::Accepted;
                stats.reviewed_pages += 1;
                continue;
            }

            if budget.exhausted() {
                self.budget_stop(&budget, &mut stats);
                break;
            }

            info!(
                "Page {}: {} finding(s), reasking",
                page_number,
                slot.findings.len()
            );
            for f in &slot.findings {
                debug!("Page {}: {}", page_number, f);
            }
            self.notify(|cb| cb.on_page_reask(page_number, slot.findings.len()));
            slot.state = PageState::Reasking;
            slot.reasked = true;
            stats.reasked_pages += 1;

            let retry = self.invoker.invoke(page, true).await?;
            stats.total_input_tokens += retry.input_tokens;
            stats.total_output_tokens += retry.output_tokens;

            let second = review_page(&retry.value);
            slot.state = PageState::Revalidated;
            match reconcile(slot.findings.len(), second.findings.len()) {
                Reconciled::Retry => {
                    debug!(
                        "Page {}: retry kept ({} → {} findings)",
                        page_number,
                        slot.findings.len(),
                        second.findings.len()
                    );
                    slot.raw = retry.value;
                    slot.layout = second.layout;
                    slot.findings = second.findings;
                    slot.reask_accepted = true;
                    stats.reasks_accepted += 1;
                }
                Reconciled::Original => {
                    debug!(
                        "Page {}: retry discarded ({} > {} findings)",
                        page_number,
                        second.findings.len(),
                        slot.findings.len()
                    );
                }
            }
            budget.charge(self.cost_per_page_usd);
            slot.state = PageState::Accepted;
            stats.reviewed_pages += 1;

            if budget.exhausted() && pages_after > 0 {
                self.budget_stop(&budget, &mut stats);
                break;
            }
        }

        // ── Phase 3: finalize ────────────────────────────────────────────
        let mut pages = Vec::with_capacity(total);
        let mut reports = Vec::with_capacity(total);
        for (slot, page) in slots.into_iter().zip(rendered) {
            let mut layout = slot.layout;
            postprocess::scrub_layout(&mut layout);
            let fallback = inject_fallback(&mut layout, page);
            drop_textless(&mut layout, page.page_number());
            backfill(&mut layout, page);
            if fallback {
                stats.fallback_pages += 1;
            }
            reports.push(PageReport {
                page_number: layout.page_number,
                state: slot.state,
                findings: slot.findings,
                reasked: slot.reasked,
                reask_accepted: slot.reask_accepted,
                fallback,
            });
            pages.push(layout);
        }

        stats.spend_usd = budget.spend_usd;
        stats.vision_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Reviewed {}/{} pages: {} reasked, {} retries kept, {} fallback, spend ${:.4}",
            stats.reviewed_pages,
            stats.planned_pages,
            stats.reasked_pages,
            stats.reasks_accepted,
            stats.fallback_pages,
            stats.spend_usd
        );

        Ok(Orchestrated {
            pages,
            reports,
            stats,
        })
    }

    /// First extraction of every page, bounded and in submission order.
    async fn extract_all(&self, rendered: &[RenderedPage]) -> Result<Vec<Extraction>, LayoutError> {
        let total = rendered.len();
        let limit = self.concurrency.unwrap_or(total).max(1);
        debug!("Dispatching {} pages, concurrency {}", total, limit);

        stream::iter(rendered.iter().map(|page| async move {
            let result = self.invoker.invoke(page, false).await;
            match &result {
                Ok(ex) => {
                    let blocks = ex
                        .value
                        .get("blocks")
                        .and_then(Value::as_array)
                        .map_or(0, Vec::len);
                    self.notify(|cb| cb.on_page_extracted(page.page_number(), total, blocks));
                }
                Err(e) => {
                    self.notify(|cb| cb.on_page_error(page.page_number(), total, &e.to_string()))
                }
            }
            result
        }))
        .buffered(limit)
        .try_collect()
        .await
    }

    fn budget_stop(&self, budget: &BudgetState, stats: &mut RunStats) {
        let cap = budget.cap_usd.unwrap_or_default();
        warn!(
            "Budget exhausted (${:.4} of ${:.4}); skipping further review",
            budget.spend_usd, cap
        );
        stats.budget_exhausted = true;
        self.notify(|cb| cb.on_budget_exhausted(budget.spend_usd, cap));
    }
}

/// Add a full-page paragraph holding the text layer when the page has no
/// text of its own. Returns whether a block was added.
pub fn inject_fallback(layout: &mut PageLayout, page: &RenderedPage) -> bool {
    if layout.has_text() {
        return false;
    }
    let Some(text) = page.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return false;
    };
    debug!("Page {}: injecting text-layer fallback", page.page_number());
    layout.blocks.push(Block {
        id: format!("fallback-{}", page.page_number()),
        kind: BlockKind::Paragraph,
        bbox: BBox::FULL_PAGE,
        text: Some(text.to_string()),
        conf: None,
    });
    true
}

/// Remove blocks that need text but carry none.
fn drop_textless(layout: &mut PageLayout, page_number: usize) {
    let before = layout.blocks.len();
    layout
        .blocks
        .retain(|b| b.has_text() || !b.kind.requires_text());
    let dropped = before - layout.blocks.len();
    if dropped > 0 {
        warn!("Page {}: dropped {} block(s) without text", page_number, dropped);
    }
}

/// The page number always comes from the render; sizes only when missing.
fn backfill(layout: &mut PageLayout, page: &RenderedPage) {
    layout.page_number = page.page_number();
    if layout.width_px == 0 {
        layout.width_px = page.width_px;
    }
    if layout.height_px == 0 {
        layout.height_px = page.height_px;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TablePayload;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn rendered(index0: usize, text: Option<&str>) -> RenderedPage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 40, Rgba([255; 4])));
        RenderedPage::from_image(index0, img, text.map(str::to_string), false).unwrap()
    }

    #[test]
    fn fallback_only_when_page_has_no_text() {
        let page = rendered(1, Some("  raw layer text  "));
        let mut empty = PageLayout::empty();
        assert!(inject_fallback(&mut empty, &page));
        assert_eq!(empty.blocks.len(), 1);
        let b = &empty.blocks[0];
        assert_eq!(b.id, "fallback-2");
        assert_eq!(b.bbox, BBox::FULL_PAGE);
        assert_eq!(b.text.as_deref(), Some("raw layer text"));
        assert_eq!(b.conf, None);

        // Already has text: untouched.
        assert!(!inject_fallback(&mut empty, &page));
        assert_eq!(empty.blocks.len(), 1);
    }

    #[test]
    fn no_text_layer_no_fallback() {
        let page = rendered(0, None);
        let mut empty = PageLayout::empty();
        assert!(!inject_fallback(&mut empty, &page));
        assert!(empty.blocks.is_empty());
    }

    #[test]
    fn textless_blocks_dropped_except_visual_ones() {
        let block = |id: &str, kind: BlockKind, text: Option<&str>| Block {
            id: id.into(),
            kind,
            bbox: BBox::new(0.0, 0.0, 0.1, 0.1),
            text: text.map(str::to_string),
            conf: None,
        };
        let mut layout = PageLayout {
            page_number: 1,
            width_px: 10,
            height_px: 10,
            blocks: vec![
                block("p", BlockKind::Paragraph, Some("   ")),
                block("f", BlockKind::Figure, None),
                block("e", BlockKind::Equation, Some("")),
                block("h", BlockKind::Heading { level: Some(2) }, Some("Intro")),
                block(
                    "t",
                    BlockKind::Table {
                        table: TablePayload {
                            rows: vec![vec!["a".into()]],
                        },
                    },
                    None,
                ),
                block("c", BlockKind::Caption, None),
            ],
        };
        drop_textless(&mut layout, 1);
        let ids: Vec<&str> = layout.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["f", "e", "h", "t"]);
    }

    #[test]
    fn backfill_sizes_and_page_number() {
        let page = rendered(4, None);
        let mut layout = PageLayout {
            page_number: 1,
            width_px: 0,
            height_px: 999,
            blocks: vec![],
        };
        backfill(&mut layout, &page);
        assert_eq!(layout.page_number, 5);
        assert_eq!(layout.width_px, 30);
        assert_eq!(layout.height_px, 999);
    }

    #[test]
    fn page_state_wire_names() {
        assert_eq!(
            serde_json::to_value(PageState::Revalidated).unwrap(),
            "revalidated"
        );
    }
}
