//! Pipeline stages for layout extraction.
//!
//! Each submodule implements one step. The pure ones (`validate`, `review`,
//! `budget`, `compose`) never touch I/O and are tested without a runtime;
//! only `vision` talks to a provider and only `render` touches pdfium.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ render ─▶ encode ─▶ orchestrate ─────────────────────────▶ compose
//!                              │  vision ─▶ postprocess              │
//!                              │  validate ─▶ review ─▶ budget       └▶ overlay
//! ```
//!
//! 1. [`input`]: canonicalise the path or URL to a local PDF
//! 2. [`render`]: rasterise selected pages and read their text layer
//! 3. [`encode`]: PNG-encode and base64-wrap each page image
//! 4. [`orchestrate`]: fan out, review, reask under budget, inject fallbacks
//! 5. [`vision`]: one capability call with retry/backoff
//! 6. [`postprocess`]: strip fences and prose around the JSON
//! 7. [`validate`] / [`review`] / [`budget`]: findings, reask policy, spend cap
//! 8. [`compose`]: Markdown, plain text, summary metadata
//! 9. [`overlay`]: bbox outlines for visual debugging

pub mod budget;
pub mod compose;
pub mod encode;
pub mod input;
pub mod orchestrate;
pub mod overlay;
pub mod postprocess;
pub mod render;
pub mod review;
pub mod validate;
pub mod vision;
