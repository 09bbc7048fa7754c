//! Prompts for vision-based layout extraction.
//!
//! The JSON contract described to the model here is the one enforced by
//! [`crate::pipeline::validate`]; keep the two in step.

/// Build the extraction instruction for a page of the given pixel size.
///
/// The size is echoed back into the example so models that copy the example
/// verbatim still report the right dimensions.
pub fn layout_instruction(width_px: u32, height_px: u32) -> String {
    format!(
        r#"You are a precise document layout and text extraction assistant.

Analyze the provided page image and extract ALL visible text with its structure.

Return a JSON object with this exact schema:

{{
  "page_number": 1,
  "width_px": {width_px},
  "height_px": {height_px},
  "blocks": [
    {{
      "id": "b1",
      "type": "<one of: title, heading, paragraph, list_item, table, figure, equation, caption, footer, header>",
      "bbox": [x0, y0, x1, y1],
      "text": "extracted text here",
      "level": 1,
      "table": {{"rows": [["H1","H2"],["v1","v2"]]}},
      "conf": 0.95
    }}
  ]
}}

Follow these rules precisely:

1. Extract ALL visible text from the image; do not skip any text region
2. bbox coordinates MUST be normalized [x0, y0, x1, y1] with 0 ≤ x0 < x1 ≤ 1 and 0 ≤ y0 < y1 ≤ 1, origin top-left
3. Headings carry "level" (1-6) based on font size and weight
4. Tables carry "table" with a "rows" array of string arrays; the first row is the header
5. Bulleted and numbered items use type "list_item"
6. List blocks in reading order (top-to-bottom, left-to-right)
7. Every block MUST have id (unique on the page), type, bbox and text; text is optional only for figure and equation
8. Use "title" for the document title, "heading" for section headers, "paragraph" for body text
9. Do not invent text; only include what you can see
10. Return ONLY valid JSON: no markdown fences, no prose, no explanations

Return the complete JSON now."#
    )
}

/// Appended to the instruction when a page is re-extracted after failing
/// validation.
pub const REASK_HINT: &str = r#"
VALIDATION FAILED. Please fix:
- Ensure all bbox values are normalized (0-1 range) with x0 < x1 and y0 < y1
- Reduce block overlaps (IoU should be ≤ 0.3 except caption+figure pairs)
- Cover ALL visible text regions; do not miss any text
- Ensure each block has the required fields: id, type, bbox
- For headings: include the "level" field
- For tables: include the "table" field with valid "rows"

Return the corrected JSON."#;

/// The instruction actually sent for one extraction attempt.
pub fn page_instruction(width_px: u32, height_px: u32, reask: bool) -> String {
    let mut instruction = layout_instruction(width_px, height_px);
    if reask {
        instruction.push('\n');
        instruction.push_str(REASK_HINT);
    }
    instruction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockKind;

    #[test]
    fn instruction_embeds_page_size() {
        let p = layout_instruction(1240, 1754);
        assert!(p.contains("\"width_px\": 1240"));
        assert!(p.contains("\"height_px\": 1754"));
    }

    #[test]
    fn instruction_lists_every_block_type() {
        let p = layout_instruction(1, 1);
        for name in BlockKind::NAMES {
            assert!(p.contains(name), "missing {name}");
        }
    }

    #[test]
    fn reask_appends_hint_once() {
        let first = page_instruction(10, 10, false);
        let again = page_instruction(10, 10, true);
        assert!(!first.contains("VALIDATION FAILED"));
        assert!(again.starts_with(&first));
        assert_eq!(again.matches("VALIDATION FAILED").count(), 1);
    }
}
