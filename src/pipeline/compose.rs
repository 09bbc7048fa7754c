//! Composition: settled page layouts → Markdown, plain text and summary
//! metadata.
//!
//! Every function here is pure. Blocks are visited in reading order
//! ([`PageLayout::blocks_in_reading_order`]) and each page is closed with a
//! `---` rule. Consecutive blank lines collapse to one and trailing blank
//! lines are dropped, so composing the same pages twice is byte-identical.

use crate::model::{Block, BlockKind, PageLayout};
use crate::output::{DocumentMetadata, PageMetadata};

/// Separator emitted after every page.
pub const PAGE_RULE: &str = "---";

/// Maximum characters kept in [`PageMetadata::text_preview`].
pub const PREVIEW_CHARS: usize = 200;

/// Render pages as Markdown.
pub fn compose_markdown(pages: &[PageLayout]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for page in pages {
        for block in page.blocks_in_reading_order() {
            markdown_block(block, &mut lines);
        }
        lines.push(PAGE_RULE.to_string());
    }
    squash_blank(lines).join("\n")
}

fn markdown_block(block: &Block, lines: &mut Vec<String>) {
    let text = block.trimmed_text();
    match &block.kind {
        BlockKind::Title => lines.push(format!("# {text}")),
        BlockKind::Heading { level } => {
            let hashes = "#".repeat(level.unwrap_or(1).clamp(1, 6) as usize);
            lines.push(format!("{hashes} {text}"));
        }
        BlockKind::ListItem => lines.push(format!("- {text}")),
        BlockKind::Table { table } => lines.extend(table_to_markdown(&table.rows)),
        BlockKind::Caption => lines.push(format!("*{text}*")),
        BlockKind::Footer | BlockKind::Header => {
            if !text.is_empty() {
                lines.push(format!("_{text}_"));
            }
        }
        BlockKind::Paragraph | BlockKind::Figure | BlockKind::Equation => {
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
    }
}

/// GFM pipe table. The first row is the header and fixes the column count;
/// body rows are padded or truncated to it. A blank line closes the table.
fn table_to_markdown(rows: &[Vec<String>]) -> Vec<String> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let cols = header.len();
    let normalise = |row: &[String]| -> String {
        let cells: Vec<&str> = (0..cols)
            .map(|i| row.get(i).map(|c| c.trim()).unwrap_or(""))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(normalise(header));
    out.push(format!("| {} |", vec!["---"; cols].join(" | ")));
    out.extend(body.iter().map(|row| normalise(row)));
    out.push(String::new());
    out
}

/// Render pages as plain text: trimmed block text, tables as pipe-joined
/// cells one row per line.
pub fn compose_text(pages: &[PageLayout]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for page in pages {
        for block in page.blocks_in_reading_order() {
            match &block.kind {
                BlockKind::Table { table } => lines.extend(table.rows.iter().map(|row| {
                    row.iter().map(|c| c.trim()).collect::<Vec<_>>().join(" | ")
                })),
                _ if block.has_text() => lines.push(block.trimmed_text().to_string()),
                _ => {}
            }
        }
        lines.push(PAGE_RULE.to_string());
    }
    squash_blank(lines).join("\n")
}

/// Collapse runs of blank lines to one and drop trailing blanks.
fn squash_blank(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        let prev_blank = out.last().is_some_and(|l| l.is_empty());
        if line.is_empty() && prev_blank {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}

/// Per-page and document-wide counts plus a short preview of each page.
pub fn summarize(pages: &[PageLayout]) -> DocumentMetadata {
    let pages: Vec<PageMetadata> = pages
        .iter()
        .map(|page| PageMetadata {
            page_number: page.page_number,
            block_count: page.blocks.len(),
            table_count: page.table_count(),
            text_preview: page
                .blocks_in_reading_order()
                .into_iter()
                .find(|b| b.has_text())
                .map(|b| b.trimmed_text().chars().take(PREVIEW_CHARS).collect())
                .unwrap_or_default(),
        })
        .collect();

    DocumentMetadata {
        page_count: pages.len(),
        blocks_total: pages.iter().map(|p| p.block_count).sum(),
        table_total: pages.iter().map(|p| p.table_count).sum(),
        pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, TablePayload};

    fn block(id: &str, kind: BlockKind, bbox: [f64; 4], text: Option<&str>) -> Block {
        Block {
            id: id.into(),
            kind,
            bbox: bbox.into(),
            text: text.map(str::to_string),
            conf: None,
        }
    }

    fn page(n: usize, blocks: Vec<Block>) -> PageLayout {
        PageLayout {
            page_number: n,
            width_px: 100,
            height_px: 100,
            blocks,
        }
    }

    fn table(rows: &[&[&str]]) -> BlockKind {
        BlockKind::Table {
            table: TablePayload {
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            },
        }
    }

    #[test]
    fn lower_y0_comes_first() {
        let pages = [page(
            1,
            vec![
                block("a", BlockKind::Paragraph, [0.0, 0.5, 1.0, 0.6], Some("second")),
                block("b", BlockKind::Paragraph, [0.0, 0.1, 1.0, 0.2], Some("first")),
            ],
        )];
        assert_eq!(compose_markdown(&pages), "first\nsecond\n---");
        assert_eq!(compose_text(&pages), "first\nsecond\n---");
    }

    #[test]
    fn two_column_table_is_exact() {
        let pages = [page(
            1,
            vec![block("t", table(&[&["H1", "H2"], &["a", "b"]]), [0.0, 0.0, 1.0, 0.5], None)],
        )];
        assert_eq!(
            compose_markdown(&pages),
            "| H1 | H2 |\n| --- | --- |\n| a | b |\n\n---"
        );
        assert_eq!(compose_text(&pages), "H1 | H2\na | b\n---");
    }

    #[test]
    fn ragged_rows_are_padded_and_truncated() {
        let pages = [page(
            1,
            vec![block(
                "t",
                table(&[&["A", "B", "C"], &[" x "], &["1", "2", "3", "4"]]),
                [0.0, 0.0, 1.0, 0.5],
                None,
            )],
        )];
        let md = compose_markdown(&pages);
        assert!(md.contains("| x |  |  |"), "{md}");
        assert!(md.contains("| 1 | 2 | 3 |"), "{md}");
        assert!(!md.contains('4'));
    }

    #[test]
    fn block_type_rendering() {
        let pages = [page(
            1,
            vec![
                block("t", BlockKind::Title, [0.0, 0.00, 1.0, 0.05], Some(" Report ")),
                block("h", BlockKind::Heading { level: Some(9) }, [0.0, 0.10, 1.0, 0.15], Some("Deep")),
                block("h2", BlockKind::Heading { level: None }, [0.0, 0.20, 1.0, 0.25], Some("Top")),
                block("l", BlockKind::ListItem, [0.0, 0.30, 1.0, 0.35], Some("item")),
                block("c", BlockKind::Caption, [0.0, 0.40, 1.0, 0.45], Some("Fig. 1")),
                block("f", BlockKind::Footer, [0.0, 0.90, 1.0, 0.95], Some("p. 1")),
                block("hd", BlockKind::Header, [0.0, 0.50, 1.0, 0.55], Some("   ")),
                block("p", BlockKind::Paragraph, [0.0, 0.60, 1.0, 0.65], None),
                block("fig", BlockKind::Figure, [0.0, 0.70, 1.0, 0.85], None),
            ],
        )];
        assert_eq!(
            compose_markdown(&pages),
            "# Report\n###### Deep\n# Top\n- item\n*Fig. 1*\n_p. 1_\n---"
        );
    }

    #[test]
    fn pages_are_separated_and_blanks_squashed() {
        let pages = [
            page(
                1,
                vec![
                    block("t1", table(&[&["A"]]), [0.0, 0.0, 1.0, 0.1], None),
                    block("t2", table(&[&["B"]]), [0.0, 0.2, 1.0, 0.3], None),
                ],
            ),
            page(2, vec![]),
        ];
        assert_eq!(
            compose_markdown(&pages),
            "| A |\n| --- |\n\n| B |\n| --- |\n\n---\n---"
        );
    }

    #[test]
    fn composing_twice_is_identical() {
        let pages = [page(
            1,
            vec![
                block("a", BlockKind::Paragraph, [0.2, 0.1, 0.4, 0.2], Some("right")),
                block("b", BlockKind::Paragraph, [0.0, 0.1, 0.2, 0.2], Some("left")),
                block("t", table(&[&["H"], &["v"]]), [0.0, 0.5, 1.0, 0.6], None),
            ],
        )];
        assert_eq!(compose_markdown(&pages), compose_markdown(&pages));
        assert_eq!(compose_text(&pages), compose_text(&pages));
        assert!(compose_text(&pages).starts_with("left\nright"));
    }

    #[test]
    fn empty_document() {
        assert_eq!(compose_markdown(&[]), "");
        assert_eq!(summarize(&[]), DocumentMetadata::default());
    }

    #[test]
    fn summary_counts_and_preview() {
        let long = "x".repeat(300);
        let pages = [
            page(
                1,
                vec![
                    block("low", BlockKind::Paragraph, [0.0, 0.8, 1.0, 0.9], Some("later")),
                    block("fig", BlockKind::Figure, [0.0, 0.0, 1.0, 0.3], None),
                    block("top", BlockKind::Paragraph, [0.0, 0.4, 1.0, 0.5], Some(&long)),
                    block("t", table(&[&["H"]]), [0.0, 0.6, 1.0, 0.7], None),
                ],
            ),
            page(2, vec![block("p", BlockKind::Paragraph, BBox::FULL_PAGE.into(), Some("  hi  "))]),
        ];
        let meta = summarize(&pages);
        assert_eq!(meta.page_count, 2);
        assert_eq!(meta.blocks_total, 5);
        assert_eq!(meta.table_total, 1);
        assert_eq!(meta.pages[0].table_count, 1);
        assert_eq!(meta.pages[0].text_preview.chars().count(), 200);
        assert_eq!(meta.pages[1].text_preview, "hi");
        assert_eq!(meta.pages[1].page_number, 2);
    }
}
