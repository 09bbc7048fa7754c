//! Review of extracted pages: run both validators, decide whether a page
//! deserves a second extraction, and pick between the two candidates.
//!
//! ## Reconciliation
//!
//! Each page gets at most one reask. The retry replaces the original when it
//! has *no more* findings than the original (`<=`), otherwise it is thrown
//! away. Ties go to the retry even if it swaps one kind of finding for
//! another; there is no severity weighting.

use crate::model::PageLayout;
use crate::pipeline::validate::{check_geometry, validate_schema, Finding, FindingKind};
use serde_json::Value;

/// A page together with everything the validators said about it.
#[derive(Debug, Clone)]
pub struct ReviewedPage {
    pub layout: PageLayout,
    pub findings: Vec<Finding>,
}

/// Validate a raw page: schema findings first, then geometry findings on the
/// blocks that could be typed.
pub fn review_page(raw: &Value) -> ReviewedPage {
    let mut findings = validate_schema(raw);
    let layout = PageLayout::from_value(raw);
    findings.extend(check_geometry(&layout.blocks));
    ReviewedPage { layout, findings }
}

/// Findings that justify spending another extraction on the page.
pub fn triggers_reask(kind: FindingKind) -> bool {
    matches!(
        kind,
        FindingKind::MissingField
            | FindingKind::MalformedBbox
            | FindingKind::BboxOutOfRange
            | FindingKind::Overlap
    )
}

/// True iff there is at least one finding and one of them triggers a reask.
pub fn needs_reask(findings: &[Finding]) -> bool {
    findings.iter().any(|f| triggers_reask(f.kind))
}

/// Which candidate survives reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Original,
    Retry,
}

/// Keep the retry iff it has no more findings than the original.
pub fn reconcile(original_findings: usize, retry_findings: usize) -> Reconciled {
    if retry_findings <= original_findings {
        Reconciled::Retry
    } else {
        Reconciled::Original
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding(kind: FindingKind) -> Finding {
        Finding {
            kind,
            message: format!("{kind:?}"),
        }
    }

    #[test]
    fn clean_page_needs_no_reask() {
        assert!(!needs_reask(&[]));
    }

    #[test]
    fn wrong_type_alone_does_not_trigger() {
        assert!(!needs_reask(&[
            finding(FindingKind::WrongType),
            finding(FindingKind::UnknownBlockType)
        ]));
    }

    #[test]
    fn structural_and_geometry_findings_trigger() {
        for kind in [
            FindingKind::MissingField,
            FindingKind::MalformedBbox,
            FindingKind::BboxOutOfRange,
            FindingKind::Overlap,
        ] {
            assert!(needs_reask(&[finding(FindingKind::WrongType), finding(kind)]));
        }
    }

    #[test]
    fn reconcile_never_increases_error_count() {
        for original in 0..6usize {
            for retry in 0..6usize {
                let kept = match reconcile(original, retry) {
                    Reconciled::Retry => retry,
                    Reconciled::Original => original,
                };
                assert!(kept <= original);
            }
        }
    }

    #[test]
    fn reconcile_tie_goes_to_retry() {
        assert_eq!(reconcile(2, 2), Reconciled::Retry);
        assert_eq!(reconcile(2, 3), Reconciled::Original);
        assert_eq!(reconcile(2, 0), Reconciled::Retry);
    }

    #[test]
    fn review_combines_schema_and_geometry() {
        let raw = json!({
            "page_number": 1,
            "width_px": 100,
            "blocks": [
                { "id": "a", "type": "paragraph", "bbox": [0, 0, 0.5, 0.5], "text": "x" },
                { "id": "b", "type": "paragraph", "bbox": [0.1, 0.1, 0.5, 0.5], "text": "y" }
            ]
        });
        let reviewed = review_page(&raw);
        let kinds: Vec<FindingKind> = reviewed.findings.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FindingKind::MissingField, FindingKind::Overlap]);
        assert_eq!(reviewed.layout.blocks.len(), 2);
        assert!(needs_reask(&reviewed.findings));
    }
}
