//! Output types returned by the extraction pipeline.

use crate::model::PageLayout;
use crate::pipeline::orchestrate::PageState;
use crate::pipeline::validate::Finding;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete result of a layout extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutOutput {
    /// Composed Markdown for every page, in page order.
    pub markdown: String,
    /// Composed plain text for every page, in page order.
    pub text: String,
    /// Final page layouts after reconciliation and fallback injection.
    pub pages: Vec<PageLayout>,
    /// Per-page review outcome, aligned with `pages`.
    pub reports: Vec<PageReport>,
    pub metadata: DocumentMetadata,
    pub stats: RunStats,
}

/// Where one page ended up in the review state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub page_number: usize,
    pub state: PageState,
    /// Findings of the surviving candidate. Empty for unreviewed pages.
    pub findings: Vec<Finding>,
    /// A second extraction was issued.
    pub reasked: bool,
    /// The second extraction replaced the first.
    pub reask_accepted: bool,
    /// The page text came from the embedded text layer, not the model.
    pub fallback: bool,
}

/// Aggregate summary of the composed pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub page_count: usize,
    pub blocks_total: usize,
    pub table_total: usize,
    pub pages: Vec<PageMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page_number: usize,
    pub block_count: usize,
    pub table_count: usize,
    /// First 200 characters of the first non-empty block, in reading order.
    pub text_preview: String,
}

/// PDF document information, available without a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Statistics about a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages selected for extraction.
    pub planned_pages: usize,
    /// Pages that went through review before the run finished or stopped.
    pub reviewed_pages: usize,
    pub reasked_pages: usize,
    pub reasks_accepted: usize,
    /// Pages whose only text is a synthesised full-page block.
    pub fallback_pages: usize,
    /// Estimated spend in USD.
    pub spend_usd: f64,
    pub budget_usd: Option<f64>,
    /// The budget guard stopped the review loop early.
    pub budget_exhausted: bool,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub vision_duration_ms: u64,
}

impl RunStats {
    /// True when fewer pages were reviewed than planned.
    pub fn is_truncated(&self) -> bool {
        self.reviewed_pages < self.planned_pages
    }
}

/// Extra artifacts to write next to the primary outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// `overlays/page-NNNN.png`: the page image with block outlines.
    pub overlays: bool,
    /// `intermediate/page-NNNN.json`: final page layout plus its report.
    pub intermediate: bool,
}

/// Every file written by an export, grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub primary: Vec<PathBuf>,
    pub overlays: Vec<PathBuf>,
    pub intermediate: Vec<PathBuf>,
}

impl ArtifactManifest {
    pub fn len(&self) -> usize {
        self.primary.len() + self.overlays.len() + self.intermediate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_planned_vs_reviewed() {
        let mut stats = RunStats {
            planned_pages: 5,
            reviewed_pages: 5,
            ..Default::default()
        };
        assert!(!stats.is_truncated());
        stats.reviewed_pages = 3;
        assert!(stats.is_truncated());
    }

    #[test]
    fn manifest_serialises_three_groups() {
        let manifest = ArtifactManifest {
            primary: vec!["out/document.md".into()],
            ..Default::default()
        };
        let v = serde_json::to_value(&manifest).unwrap();
        assert_eq!(v["primary"][0], "out/document.md");
        assert!(v["overlays"].as_array().unwrap().is_empty());
        assert!(v["intermediate"].as_array().unwrap().is_empty());
        assert_eq!(manifest.len(), 1);
    }
}
