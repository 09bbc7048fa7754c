//! Configuration types for layout extraction runs.
//!
//! All run behaviour is controlled through [`LayoutConfig`], built via its
//! [`LayoutConfigBuilder`].

use crate::error::LayoutError;
use crate::pipeline::vision::VisionCapability;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a layout extraction run.
///
/// # Example
/// ```rust
/// use edgequake_layout::LayoutConfig;
///
/// let config = LayoutConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .budget_usd(0.50)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct LayoutConfig {
    /// Rendering DPI. Range: 72–400. Default: 180.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps memory for oversized pages regardless of DPI.
    pub max_rendered_pixels: u32,

    /// Maximum concurrent vision calls. `None` dispatches every page at once.
    pub concurrency: Option<usize>,

    /// Provider-specific override of [`Self::concurrency`].
    pub provider_concurrency: Option<usize>,

    /// Model identifier, e.g. "gpt-4.1-mini", "claude-sonnet-4-20250514".
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed vision capability. Takes precedence over every
    /// provider setting; this is how tests and custom backends plug in.
    pub capability: Option<Arc<dyn VisionCapability>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retry/backoff for rate-limited and transient provider failures.
    pub retry: RetryPolicy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Estimated cost of one page extraction in USD. Default: 0.02.
    pub cost_per_page_usd: f64,

    /// Spend cap in USD. `None` disables the budget guard.
    pub budget_usd: Option<f64>,

    /// Fail the run when reviewed pages still have findings. Default: false.
    pub strict_validation: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dpi: 180,
            max_rendered_pixels: 2000,
            concurrency: None,
            provider_concurrency: None,
            model: None,
            provider_name: None,
            provider: None,
            capability: None,
            temperature: 0.0,
            max_tokens: 4096,
            retry: RetryPolicy::default(),
            password: None,
            pages: PageSelection::default(),
            cost_per_page_usd: 0.02,
            budget_usd: None,
            strict_validation: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LayoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("provider_concurrency", &self.provider_concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("capability", &self.capability.as_ref().map(|c| c.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("pages", &self.pages)
            .field("cost_per_page_usd", &self.cost_per_page_usd)
            .field("budget_usd", &self.budget_usd)
            .field("strict_validation", &self.strict_validation)
            .finish()
    }
}

impl LayoutConfig {
    /// Create a new builder for `LayoutConfig`.
    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder {
            config: Self::default(),
        }
    }

    /// The concurrency gate actually applied: the provider override wins.
    pub fn effective_concurrency(&self) -> Option<usize> {
        self.provider_concurrency.or(self.concurrency)
    }
}

/// Builder for [`LayoutConfig`].
#[derive(Debug)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl LayoutConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = Some(n);
        self
    }

    pub fn unbounded_concurrency(mut self) -> Self {
        self.config.concurrency = None;
        self
    }

    pub fn provider_concurrency(mut self, n: usize) -> Self {
        self.config.provider_concurrency = Some(n);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn capability(mut self, capability: Arc<dyn VisionCapability>) -> Self {
        self.config.capability = Some(capability);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn cost_per_page_usd(mut self, usd: f64) -> Self {
        self.config.cost_per_page_usd = usd;
        self
    }

    pub fn budget_usd(mut self, usd: f64) -> Self {
        self.config.budget_usd = Some(usd);
        self
    }

    pub fn strict_validation(mut self, v: bool) -> Self {
        self.config.strict_validation = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LayoutConfig, LayoutError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(LayoutError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == Some(0) || c.provider_concurrency == Some(0) {
            return Err(LayoutError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !c.cost_per_page_usd.is_finite() || c.cost_per_page_usd < 0.0 {
            return Err(LayoutError::InvalidConfig(format!(
                "Cost per page must be a non-negative number, got {}",
                c.cost_per_page_usd
            )));
        }
        if let Some(cap) = c.budget_usd {
            if !cap.is_finite() || cap < 0.0 {
                return Err(LayoutError::InvalidConfig(format!(
                    "Budget must be a non-negative number, got {cap}"
                )));
            }
        }
        if c.retry.max_attempts == 0 {
            return Err(LayoutError::InvalidConfig(
                "Retry policy needs at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Exponential backoff with jitter for retryable provider failures.
///
/// The wait before attempt `n + 1` is
/// `min(initial × multiplier^(n-1) + U(0, jitter), max_backoff)`.
/// With the defaults: ~1 s, ~2 s, ~4 s, ~8 s, all capped at 10 s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 5.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
            max_backoff: Duration::from_secs(10),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without waiting. Meant for tests and fakes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            multiplier: 2,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self
            .multiplier
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let base = self.initial_backoff.saturating_mul(exp);
        let jitter = self.jitter.mul_f64(fastrand::f64());
        base.saturating_add(jitter).min(self.max_backoff)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// An inclusive, 1-based page span. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub start: usize,
    pub end: usize,
}

impl PageSpan {
    /// Build a span, swapping reversed bounds.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }
}

/// Specifies which pages of the document to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// Single pages and inclusive ranges, as written by the user.
    Spans(Vec<PageSpan>),
}

impl PageSelection {
    /// Sorted, de-duplicated 1-based page numbers within `1..=total_pages`.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Spans(spans) => spans
                .iter()
                .flat_map(|s| s.start.max(1)..=s.end.min(total_pages))
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Same as [`Self::to_page_numbers`] but 0-based.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        self.to_page_numbers(total_pages)
            .into_iter()
            .map(|p| p - 1)
            .collect()
    }
}

impl FromStr for PageSelection {
    type Err = LayoutError;

    /// Parse `all` or a comma list such as `1-3,7,12-10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }

        let number = |t: &str| -> Result<usize, LayoutError> {
            t.trim().parse::<usize>().map_err(|_| {
                LayoutError::InvalidConfig(format!("Invalid page number '{}' in '{}'", t.trim(), s))
            })
        };

        let mut spans = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let span = match part.split_once('-') {
                Some((a, b)) => PageSpan::new(number(a)?, number(b)?),
                None => {
                    let p = number(part)?;
                    PageSpan::new(p, p)
                }
            };
            spans.push(span);
        }
        Ok(PageSelection::Spans(spans))
    }
}

/// Parse a page spec against a document length: 1-based, sorted, unique.
pub fn select_pages(spec: &str, total_pages: usize) -> Result<Vec<usize>, LayoutError> {
    Ok(spec.parse::<PageSelection>()?.to_page_numbers(total_pages))
}

// ── Outputs ──────────────────────────────────────────────────────────────

/// Artifact kinds a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Markdown,
    Text,
    LayoutJson,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [OutputKind::Markdown, OutputKind::Text, OutputKind::LayoutJson];

    /// Parse a comma list of kinds (with aliases) into a de-duplicated list.
    pub fn parse_list(s: &str) -> Result<Vec<OutputKind>, LayoutError> {
        let mut kinds = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let expanded: &[OutputKind] = match token.to_lowercase().as_str() {
                "all" => &Self::ALL,
                "markdown" | "md" => &[OutputKind::Markdown],
                "text" | "plain" | "txt" => &[OutputKind::Text],
                "layout_json" | "json" | "layout" => &[OutputKind::LayoutJson],
                other => {
                    return Err(LayoutError::InvalidConfig(format!(
                        "Unknown output '{other}'. Choose from all|markdown|text|layout_json."
                    )))
                }
            };
            for kind in expanded {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
        }
        Ok(kinds)
    }
}

// ── Provider defaults ────────────────────────────────────────────────────

/// Default concurrency cap for a provider, by name or `provider/model` id.
///
/// Anthropic and Gemini throttle image-heavy requests sooner than OpenAI.
pub fn provider_default_concurrency(provider_or_model: &str) -> usize {
    let p = provider_or_model.to_lowercase();
    if p.starts_with("anthropic") || p.starts_with("claude") {
        3
    } else if p.starts_with("gemini") || p.starts_with("google") || p.starts_with("vertex") {
        3
    } else {
        6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let c = LayoutConfig::builder().build().unwrap();
        assert_eq!(c.dpi, 180);
        assert_eq!(c.concurrency, None);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.retry.max_attempts, 5);
        assert_eq!(c.budget_usd, None);
    }

    #[test]
    fn builder_rejects_bad_dpi_and_concurrency() {
        assert!(LayoutConfig::builder().dpi(50).build().is_err());
        assert!(LayoutConfig::builder().concurrency(0).build().is_err());
        assert!(LayoutConfig::builder().budget_usd(-1.0).build().is_err());
    }

    #[test]
    fn provider_concurrency_overrides() {
        let c = LayoutConfig::builder()
            .concurrency(8)
            .provider_concurrency(2)
            .build()
            .unwrap();
        assert_eq!(c.effective_concurrency(), Some(2));
    }

    #[test]
    fn select_ranges_and_singles() {
        assert_eq!(select_pages("1-3,7", 10).unwrap(), vec![1, 2, 3, 7]);
    }

    #[test]
    fn select_reversed_range() {
        assert_eq!(select_pages("5-2", 10).unwrap(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn select_drops_out_of_range() {
        assert_eq!(select_pages("20", 10).unwrap(), Vec::<usize>::new());
        assert_eq!(select_pages("0,9-12", 10).unwrap(), vec![9, 10]);
    }

    #[test]
    fn select_dedups_and_sorts() {
        assert_eq!(select_pages("7, 1-2 ,2,,1", 10).unwrap(), vec![1, 2, 7]);
    }

    #[test]
    fn select_all() {
        assert_eq!(select_pages("all", 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(PageSelection::All.to_indices(2), vec![0, 1]);
    }

    #[test]
    fn select_rejects_garbage() {
        assert!(select_pages("one-two", 10).is_err());
    }

    #[test]
    fn backoff_is_capped_and_grows() {
        let p = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(4), Duration::from_secs(8));
        assert_eq!(p.backoff(5), Duration::from_secs(10));
        assert_eq!(p.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn backoff_jitter_stays_under_cap() {
        let p = RetryPolicy::default();
        for retry in 1..=6 {
            let d = p.backoff(retry);
            assert!(d <= Duration::from_secs(10));
            assert!(d >= Duration::from_secs(1));
        }
    }

    #[test]
    fn output_kinds_parse_aliases() {
        assert_eq!(
            OutputKind::parse_list("md,json,markdown").unwrap(),
            vec![OutputKind::Markdown, OutputKind::LayoutJson]
        );
        assert_eq!(OutputKind::parse_list("all").unwrap().len(), 3);
        assert!(OutputKind::parse_list("pdf").is_err());
    }

    #[test]
    fn provider_defaults() {
        assert_eq!(provider_default_concurrency("openai"), 6);
        assert_eq!(provider_default_concurrency("anthropic/claude-sonnet-4"), 3);
        assert_eq!(provider_default_concurrency("gemini"), 3);
    }
}
