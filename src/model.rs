//! Layout data model: pages, blocks and their bounding boxes.
//!
//! The serde representation matches the JSON the vision model is asked to
//! produce:
//!
//! ```text
//! { page_number, width_px, height_px,
//!   blocks: [ { id, type, bbox: [x0,y0,x1,y1], text?, level?, table?: {rows}, conf? } ] }
//! ```
//!
//! On the Rust side the type-specific fields live on [`BlockKind`] instead of
//! sitting on every block as optionals: only headings carry a level and only
//! tables carry rows.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// One unit of page work: which page to extract and at what DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTask {
    /// 0-based page index in the source document.
    pub index0: usize,
    pub dpi: u32,
}

impl PageTask {
    /// 1-based page number.
    pub fn page_number(&self) -> usize {
        self.index0 + 1
    }
}

/// Axis-aligned box normalised to the unit page, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub const FULL_PAGE: BBox = BBox {
        x0: 0.0,
        y0: 0.0,
        x1: 1.0,
        y1: 1.0,
    };

    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// `0 ≤ x0 < x1 ≤ 1` and `0 ≤ y0 < y1 ≤ 1`.
    pub fn is_normalised(&self) -> bool {
        0.0 <= self.x0
            && self.x0 < self.x1
            && self.x1 <= 1.0
            && 0.0 <= self.y0
            && self.y0 < self.y1
            && self.y1 <= 1.0
    }

    /// Area, clamped at zero for inverted boxes.
    pub fn area(&self) -> f64 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }

    /// Intersection-over-union. Zero for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BBox) -> f64 {
        let inter_w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let inter_h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        let inter = inter_w * inter_h;
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// Table payload: ordered rows of ordered cells. First row is the header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<Vec<String>>,
}

/// Block type together with its type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Title,
    Heading {
        #[serde(
            default,
            deserialize_with = "lenient_level",
            skip_serializing_if = "Option::is_none"
        )]
        level: Option<i64>,
    },
    Paragraph,
    ListItem,
    Table {
        #[serde(default, deserialize_with = "null_as_default")]
        table: TablePayload,
    },
    Figure,
    Equation,
    Caption,
    Footer,
    Header,
}

impl BlockKind {
    /// The ten wire names, in schema order.
    pub const NAMES: [&'static str; 10] = [
        "title",
        "heading",
        "paragraph",
        "list_item",
        "table",
        "figure",
        "equation",
        "caption",
        "footer",
        "header",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Title => "title",
            BlockKind::Heading { .. } => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::ListItem => "list_item",
            BlockKind::Table { .. } => "table",
            BlockKind::Figure => "figure",
            BlockKind::Equation => "equation",
            BlockKind::Caption => "caption",
            BlockKind::Footer => "footer",
            BlockKind::Header => "header",
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, BlockKind::Table { .. })
    }

    /// Whether a block of this kind is meaningless without text. Figures and
    /// equations may be image-only; a table's content lives in its rows.
    pub fn requires_text(&self) -> bool {
        match self {
            BlockKind::Figure | BlockKind::Equation => false,
            BlockKind::Table { table } => table.rows.is_empty(),
            _ => true,
        }
    }
}

/// `null` reads as the type's default, same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Heading level: integers and integral floats (`2.0`) are kept, anything
/// else becomes `None` so the block itself survives.
fn lenient_level<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| {
        v.as_i64().or_else(|| {
            v.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        })
    }))
}

/// A layout block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unique within the page.
    pub id: String,
    #[serde(flatten)]
    pub kind: BlockKind,
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Model confidence, 0..1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<f64>,
}

impl Block {
    /// Text trimmed of surrounding whitespace; empty when absent.
    pub fn trimmed_text(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn has_text(&self) -> bool {
        !self.trimmed_text().is_empty()
    }
}

/// One page of extracted layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// 1-based page number. `0` until backfilled when the model omitted it.
    pub page_number: usize,
    pub width_px: u32,
    pub height_px: u32,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl PageLayout {
    /// The placeholder used when the model output is not a page at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a page from untrusted JSON, keeping whatever is usable.
    ///
    /// Blocks that cannot be typed (missing `id`/`type`/`bbox`, unknown type,
    /// malformed bbox) are dropped with a warning; the schema validator has
    /// already reported them. Non-integer or missing top-level numbers become
    /// `0` and are backfilled later from the render metadata.
    pub fn from_value(value: &Value) -> Self {
        let number = |key: &str| value.get(key).and_then(Value::as_u64).unwrap_or(0);

        let blocks = value
            .get("blocks")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .filter_map(|(i, raw)| match serde_json::from_value::<Block>(raw.clone()) {
                        Ok(block) => Some(block),
                        Err(e) => {
                            warn!("Dropping block #{i}: {e}");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            page_number: number("page_number") as usize,
            width_px: number("width_px") as u32,
            height_px: number("height_px") as u32,
            blocks,
        }
    }

    pub fn has_text(&self) -> bool {
        self.blocks.iter().any(Block::has_text)
    }

    pub fn table_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.kind.is_table()).count()
    }

    /// Blocks in reading order: `(y0, x0)` ascending, stable for ties.
    pub fn blocks_in_reading_order(&self) -> Vec<&Block> {
        let mut sorted: Vec<&Block> = self.blocks.iter().collect();
        sorted.sort_by(|a, b| {
            a.bbox
                .y0
                .total_cmp(&b.bbox.y0)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn iou_identical_box_is_one() {
        let a = BBox::new(0.1, 0.2, 0.6, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn iou_is_symmetric() {
        let boxes = [
            BBox::new(0.0, 0.0, 0.5, 0.5),
            BBox::new(0.4, 0.4, 0.9, 0.9),
            BBox::new(0.1, 0.1, 0.5, 0.5),
            BBox::new(0.6, 0.0, 1.0, 0.3),
            BBox::new(0.3, 0.3, 0.3, 0.8),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.iou(b), b.iou(a));
            }
        }
    }

    #[test]
    fn iou_reference_values() {
        let a = BBox::new(0.0, 0.0, 0.5, 0.5);
        let b = BBox::new(0.4, 0.4, 0.9, 0.9);
        let c = BBox::new(0.1, 0.1, 0.5, 0.5);
        assert!((a.iou(&b) - 0.01 / 0.49).abs() < 1e-9);
        assert!((a.iou(&c) - 0.64).abs() < 1e-9);
    }

    #[test]
    fn iou_disjoint_and_degenerate_are_zero() {
        let a = BBox::new(0.0, 0.0, 0.2, 0.2);
        let b = BBox::new(0.5, 0.5, 0.9, 0.9);
        let flat = BBox::new(0.1, 0.1, 0.1, 0.5);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&flat), 0.0);
    }

    #[test]
    fn block_wire_format() {
        let raw = json!({
            "id": "b2",
            "type": "heading",
            "bbox": [0.1, 0.1, 0.9, 0.2],
            "text": "Introduction",
            "level": 2,
            "conf": 0.9
        });
        let block: Block = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block.kind, BlockKind::Heading { level: Some(2) });
        assert_eq!(block.bbox, BBox::new(0.1, 0.1, 0.9, 0.2));
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);
    }

    #[test]
    fn table_block_parses_rows() {
        let raw = json!({
            "id": "t1",
            "type": "table",
            "bbox": [0.0, 0.3, 1.0, 0.6],
            "table": { "rows": [["H1", "H2"], ["a", "b"]] }
        });
        let block: Block = serde_json::from_value(raw).unwrap();
        match block.kind {
            BlockKind::Table { table } => assert_eq!(table.rows.len(), 2),
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn from_value_drops_untypeable_blocks() {
        let raw = json!({
            "page_number": 3,
            "width_px": 1000,
            "height_px": 1400,
            "blocks": [
                { "id": "ok", "type": "paragraph", "bbox": [0, 0, 1, 0.1], "text": "hi" },
                { "id": "bad-type", "type": "sidebar", "bbox": [0, 0, 1, 1] },
                { "id": "bad-bbox", "type": "paragraph", "bbox": [0, 0, 1] },
                { "type": "paragraph", "bbox": [0, 0, 1, 1] }
            ]
        });
        let page = PageLayout::from_value(&raw);
        assert_eq!(page.page_number, 3);
        assert_eq!(page.width_px, 1000);
        assert_eq!(page.blocks.len(), 1);
        assert_eq!(page.blocks[0].id, "ok");
    }

    #[test]
    fn explicit_nulls_keep_the_block() {
        let raw = json!({
            "page_number": 1,
            "width_px": 100,
            "height_px": 100,
            "blocks": [
                { "id": "p", "type": "paragraph", "bbox": [0, 0, 1, 0.1],
                  "text": "para", "level": null, "table": null, "conf": null },
                { "id": "t", "type": "table", "bbox": [0, 0.2, 1, 0.3], "text": "tbl", "table": null },
                { "id": "r", "type": "table", "bbox": [0, 0.4, 1, 0.5], "table": { "rows": null } },
                { "id": "h", "type": "heading", "bbox": [0, 0.6, 1, 0.7], "text": "H", "level": 2, "table": null },
                { "id": "h2", "type": "heading", "bbox": [0, 0.8, 1, 0.9], "text": "H2", "level": 2.0 }
            ]
        });
        let page = PageLayout::from_value(&raw);
        let ids: Vec<&str> = page.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["p", "t", "r", "h", "h2"]);
        assert_eq!(
            page.blocks[1].kind,
            BlockKind::Table { table: TablePayload::default() }
        );
        assert_eq!(page.blocks[1].trimmed_text(), "tbl");
        assert_eq!(page.blocks[4].kind, BlockKind::Heading { level: Some(2) });
    }

    #[test]
    fn fractional_level_is_dropped_not_the_block() {
        let raw = json!({ "id": "h", "type": "heading", "bbox": [0, 0, 1, 0.1], "level": 2.5 });
        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.kind, BlockKind::Heading { level: None });
    }

    #[test]
    fn from_value_tolerates_non_object() {
        let page = PageLayout::from_value(&json!("not a page"));
        assert_eq!(page, PageLayout::empty());
    }

    #[test]
    fn reading_order_is_top_to_bottom_then_left_to_right() {
        let mk = |id: &str, x0, y0| Block {
            id: id.into(),
            kind: BlockKind::Paragraph,
            bbox: BBox::new(x0, y0, x0 + 0.1, y0 + 0.05),
            text: Some(id.into()),
            conf: None,
        };
        let page = PageLayout {
            page_number: 1,
            width_px: 100,
            height_px: 100,
            blocks: vec![mk("c", 0.5, 0.5), mk("b", 0.5, 0.1), mk("a", 0.1, 0.1)],
        };
        let ids: Vec<&str> = page
            .blocks_in_reading_order()
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
