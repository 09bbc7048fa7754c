//! Page validation: structural contract on the raw JSON plus geometry checks
//! on the typed blocks.
//!
//! The structural contract is the JSON Schema in
//! `src/schema/layout_page.schema.json` (draft 2020-12), compiled once.
//! Both checks report *every* violation they find. The findings are typed by
//! [`FindingKind`] so the reask policy never has to inspect message text.

use crate::model::{BBox, Block};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// IoU above which two blocks on the same page are considered overlapping.
pub const OVERLAP_IOU_THRESHOLD: f64 = 0.3;

/// The page contract as shipped with the crate.
pub const LAYOUT_PAGE_SCHEMA: &str = include_str!("../schema/layout_page.schema.json");

static PAGE_VALIDATOR: Lazy<Validator> = Lazy::new(|| {
    let schema: Value =
        serde_json::from_str(LAYOUT_PAGE_SCHEMA).expect("layout page schema is valid JSON");
    jsonschema::validator_for(&schema).expect("layout page schema compiles")
});

/// What kind of problem a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A required page or block field is absent.
    MissingField,
    /// A field is present but has the wrong JSON type or is out of bounds.
    WrongType,
    /// `type` is not one of the ten block kinds.
    UnknownBlockType,
    /// `bbox` is not a 4-element numeric array.
    MalformedBbox,
    /// `bbox` coordinates fall outside the normalised unit square.
    BboxOutOfRange,
    /// Two blocks overlap above [`OVERLAP_IOU_THRESHOLD`].
    Overlap,
}

/// One validation problem on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Check a raw page against the layout page schema.
///
/// Required: `page_number`, `width_px`, `height_px` (integers) and `blocks`
/// (array); each block needs `id` (string), `type` (one of the ten kinds) and
/// `bbox` (four numbers). Optional fields are type-checked when present and
/// may be `null`.
pub fn validate_schema(page: &Value) -> Vec<Finding> {
    PAGE_VALIDATOR
        .iter_errors(page)
        .map(|error| schema_finding(page, &error))
        .collect()
}

/// Type a schema error by its keyword and where it points.
fn schema_finding(page: &Value, error: &ValidationError<'_>) -> Finding {
    let path = error.instance_path.to_string();
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let block_field = match segments.as_slice() {
        ["blocks", _, field, ..] => Some(*field),
        _ => None,
    };

    let kind = match (&error.kind, block_field) {
        (ValidationErrorKind::Required { .. }, _) => FindingKind::MissingField,
        (_, Some("bbox")) => FindingKind::MalformedBbox,
        (ValidationErrorKind::Enum { .. }, Some("type")) => FindingKind::UnknownBlockType,
        _ => FindingKind::WrongType,
    };

    Finding::new(kind, format!("{}{error}", location(page, &segments)))
}

/// `"block <id>: "`, `"blocks[i]: "`, `"'<field>': "` or nothing for the page itself.
fn location(page: &Value, segments: &[&str]) -> String {
    match segments {
        [] => String::new(),
        ["blocks", index, rest @ ..] => {
            let label = index
                .parse::<usize>()
                .ok()
                .and_then(|i| page.get("blocks")?.get(i)?.get("id")?.as_str())
                .map(|id| format!("block {id}"))
                .unwrap_or_else(|| format!("blocks[{index}]"));
            match rest {
                [] => format!("{label}: "),
                _ => format!("{label}: '{}': ", rest.join("/")),
            }
        }
        _ => format!("'{}': ", segments.join("/")),
    }
}

/// Range and pairwise-overlap checks over a page's blocks.
///
/// Overlap is quadratic in the block count; a page holds at most a few
/// hundred blocks.
pub fn check_geometry(blocks: &[Block]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for block in blocks {
        if !block.bbox.is_normalised() {
            findings.push(Finding::new(
                FindingKind::BboxOutOfRange,
                format!("invalid bbox range for block {}", block.id),
            ));
        }
    }

    for (i, a) in blocks.iter().enumerate() {
        for b in &blocks[i + 1..] {
            if overlaps(&a.bbox, &b.bbox) {
                findings.push(Finding::new(
                    FindingKind::Overlap,
                    format!(
                        "overlap above threshold between {} and {}",
                        a.id, b.id
                    ),
                ));
            }
        }
    }

    findings
}

fn overlaps(a: &BBox, b: &BBox) -> bool {
    a.iou(b) > OVERLAP_IOU_THRESHOLD
}
