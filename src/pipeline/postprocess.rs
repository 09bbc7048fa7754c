//! Post-processing: deterministic cleanup of raw VLM responses before they
//! are parsed as page JSON.
//!
//! Vision models wrap the object in ` ```json ` fences, add a sentence
//! before or after it, and emit `\r\n`, a BOM or zero-width characters.
//! These rules strip all of that without changing the payload.
//!
//! ## Rule Order
//!
//! Line endings and invisible characters are normalised first so that the
//! fence regex sees clean input; object extraction runs last and only when
//! the text still does not look like a bare JSON object.

use crate::model::{BlockKind, PageLayout};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Apply every cleanup rule to a raw response.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (BOM, zero-width spaces, soft hyphens, …)
/// 3. Strip outer code fences (```json / ``` / ```JSON)
/// 4. Cut surrounding prose down to the outermost `{ … }`
pub fn clean_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = strip_code_fences(s.trim());
    extract_object(s.trim()).to_string()
}

/// Parse a raw response into a JSON object.
///
/// Returns `None` when, after cleanup, the text is not a JSON object.
pub fn parse_page_json(raw: &str) -> Option<Value> {
    let cleaned = clean_response(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// Scrub invisible characters out of every block text and table cell.
pub fn scrub_layout(page: &mut PageLayout) {
    for block in &mut page.blocks {
        if let Some(text) = block.text.as_mut() {
            *text = remove_invisible_chars(text);
        }
        if let BlockKind::Table { table } = &mut block.kind {
            for cell in table.rows.iter_mut().flatten() {
                *cell = remove_invisible_chars(cell);
            }
        }
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode ──────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[\u{FEFF}\u{200B}\u{200C}\u{200D}\u{2060}\u{00AD}]").unwrap()
});

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```$").unwrap());

fn strip_code_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => input,
    }
}

// ── Rule 4: Extract the outermost object ─────────────────────────────────────

fn extract_object(input: &str) -> &str {
    if input.starts_with('{') && input.ends_with('}') {
        return input;
    }
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}
