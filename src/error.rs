//! Error types for the edgequake-layout library.
//!
//! Three kinds of failure flow through the pipeline, and only one of them is
//! an `Err` at the top level:
//!
//! * [`LayoutError`] is **fatal**: the run cannot continue (input missing,
//!   PDF cannot be rendered, provider rejects our credentials, rate-limit
//!   retries exhausted). Returned as `Err(LayoutError)` from the `convert*`
//!   functions and mapped to a process exit code by the CLI.
//!
//! * [`CapabilityError`]: a single vision call failed. Carries a
//!   [`FailureKind`] so the invoker can decide whether to back off and retry
//!   or give up; it only becomes a [`LayoutError`] once retries are exhausted
//!   or the failure is non-retryable.
//!
//! * Validation findings ([`crate::pipeline::validate::Finding`]) are never
//!   errors: they drive the reask loop and end up in the per-page report.
//!
//! Budget exhaustion is not an error either. A truncated run still returns
//! `Ok` with `stats.budget_exhausted = true`.

use edgequake_llm::LlmError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-layout library.
#[derive(Debug, Error)]
pub enum LayoutError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory), place the library\n\
in the working directory, or install it on the system library path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider rejected our credentials (401/403). Never retried.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The provider kept answering 429 until the retry budget ran out.
    #[error("Rate limit exceeded for provider '{provider}' on page {page} after {attempts} attempts")]
    RateLimitExceeded {
        provider: String,
        page: usize,
        attempts: u32,
    },

    /// Transient provider failures (5xx, timeouts) persisted across all retries.
    #[error("Provider '{provider}' unavailable on page {page} after {attempts} attempts: {detail}")]
    ProviderUnavailable {
        provider: String,
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The provider returned an error we do not know how to recover from.
    #[error("Provider '{provider}' failed on page {page}: {detail}")]
    ProviderError {
        provider: String,
        page: usize,
        detail: String,
    },

    // ── Validation errors ─────────────────────────────────────────────────
    /// Strict mode: some reviewed pages still fail validation after reasking.
    #[error("{failed} page(s) still fail layout validation (first: page {first_page}: {first_finding})")]
    ValidationFailed {
        failed: usize,
        first_page: usize,
        first_finding: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation or argument parsing failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LayoutError {
    /// Process exit code for this error.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 2 | validation failed (strict mode) |
    /// | 3 | provider auth / rate limit / provider unavailable |
    /// | 5 | input could not be read or rendered |
    /// | 1 | anything else |
    ///
    /// Code 4 (budget exceeded) is not an error; the CLI derives it from
    /// [`crate::output::RunStats::budget_exhausted`].
    pub fn exit_code(&self) -> u8 {
        match self {
            LayoutError::ValidationFailed { .. } => 2,
            LayoutError::ProviderNotConfigured { .. }
            | LayoutError::AuthError { .. }
            | LayoutError::RateLimitExceeded { .. }
            | LayoutError::ProviderUnavailable { .. } => 3,
            LayoutError::FileNotFound { .. }
            | LayoutError::PermissionDenied { .. }
            | LayoutError::InvalidInput { .. }
            | LayoutError::DownloadFailed { .. }
            | LayoutError::DownloadTimeout { .. }
            | LayoutError::NotAPdf { .. }
            | LayoutError::CorruptPdf { .. }
            | LayoutError::PasswordRequired { .. }
            | LayoutError::WrongPassword { .. }
            | LayoutError::RasterisationFailed { .. }
            | LayoutError::PdfiumBindingFailed(_) => 5,
            LayoutError::ProviderError { .. }
            | LayoutError::OutputWriteFailed { .. }
            | LayoutError::InvalidConfig(_)
            | LayoutError::Internal(_) => 1,
        }
    }
}

/// Exit code the CLI uses when the budget guard truncated the run.
pub const BUDGET_EXCEEDED_EXIT_CODE: u8 = 4;

/// How a failed capability call should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// 429 / quota throttling. Retried with backoff.
    RateLimited,
    /// 401 / 403 / missing or invalid key. Never retried.
    Auth,
    /// 5xx, timeouts, dropped connections. Retried with backoff.
    Transient,
    /// Anything else. Not retried.
    Other,
}

impl FailureKind {
    /// Classify a provider failure from its message.
    ///
    /// Only used for free-form provider API errors, where the HTTP status is
    /// carried in the text. Rate limiting wins over auth when both appear.
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

        if any(&["429", "rate limit", "rate_limit", "ratelimit", "too many requests"]) {
            FailureKind::RateLimited
        } else if any(&[
            "401",
            "403",
            "auth",
            "unauthorized",
            "forbidden",
            "permission denied",
            "invalid api key",
            "api key",
        ]) {
            FailureKind::Auth
        } else if any(&[
            "500",
            "502",
            "503",
            "504",
            "timeout",
            "timed out",
            "connection",
            "overloaded",
            "unavailable",
        ]) {
            FailureKind::Transient
        } else {
            FailureKind::Other
        }
    }

    /// Should the invoker back off and try again?
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Transient)
    }
}

/// A single failed call to a [`crate::pipeline::vision::VisionCapability`].
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct CapabilityError {
    pub kind: FailureKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose kind is inferred from the message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify(&message),
            message,
        }
    }
}

impl From<LlmError> for CapabilityError {
    fn from(err: LlmError) -> Self {
        let kind = match &err {
            LlmError::RateLimited(_) => FailureKind::RateLimited,
            LlmError::AuthError(_) => FailureKind::Auth,
            LlmError::NetworkError(_) | LlmError::Timeout => FailureKind::Transient,
            LlmError::ApiError(detail) => FailureKind::classify(detail),
            _ => FailureKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}
