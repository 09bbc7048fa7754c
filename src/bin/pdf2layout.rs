//! CLI binary for edgequake-layout.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `LayoutConfig`, writes artifacts and turns the outcome into an exit code.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_layout::{
    convert, convert_to_dir, inspect, provider_default_concurrency, ExportOptions, LayoutConfig,
    LayoutError, LayoutProgressCallback, OutputKind, PageSelection, ProgressCallback, RunStats,
    BUDGET_EXCEEDED_EXIT_CODE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. Extraction events may arrive out of page
/// order; the bar only counts them.
struct CliProgressCallback {
    bar: ProgressBar,
    reasks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            reasks: AtomicUsize::new(0),
        })
    }
}

impl LayoutProgressCallback for CliProgressCallback {
    fn on_run_start(&self, planned_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(planned_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.set_message("");
        self.bar.reset_eta();
    }

    fn on_page_extracted(&self, page_num: usize, total: usize, blocks: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{blocks:>3} blocks")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(Some('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
    }

    fn on_page_reask(&self, page_num: usize, findings: usize) {
        let n = self.reasks.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_prefix("Reviewing");
        self.bar.set_message(format!("{n} re-ask(s)"));
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            yellow("↻"),
            page_num,
            dim(&format!("{findings} finding(s), re-asking")),
        ));
    }

    fn on_budget_exhausted(&self, spend_usd: f64, cap_usd: f64) {
        self.bar.println(format!(
            "  {} Budget exhausted: ${spend_usd:.4} of ${cap_usd:.4}",
            yellow("⚠"),
        ));
    }

    fn on_run_complete(&self, planned_pages: usize, reviewed_pages: usize) {
        self.bar.finish_and_clear();
        let mark = if reviewed_pages == planned_pages {
            green("✔")
        } else {
            yellow("⚠")
        };
        eprintln!(
            "{} {}/{} pages reviewed",
            mark,
            bold(&reviewed_pages.to_string()),
            planned_pages
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown on stdout
  pdf2layout report.pdf

  # All artifacts into a directory, with bbox overlays
  pdf2layout report.pdf --outputs all --output-dir out/ --save-overlays

  # First five pages and page 9, capped at 50 cents
  pdf2layout --pages 1-5,9 --budget-usd 0.50 report.pdf -d out/

  # Fail if any reviewed page still has findings
  pdf2layout --strict --outputs layout_json report.pdf -d out/

  # Inspect PDF metadata (no API key needed)
  pdf2layout --inspect-only report.pdf

EXIT CODES:
  0  success
  1  unclassified error
  2  validation failed (--strict)
  3  provider auth / rate limit / unavailable
  4  budget exhausted (artifacts are still written)
  5  input or rendering failure

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not set
  EDGEQUAKE_MODEL         Model used together with EDGEQUAKE_LLM_PROVIDER
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDF2LAYOUT_*            Fallback for every flag, e.g. PDF2LAYOUT_DPI=200
"#;

/// Extract validated layout blocks from PDF pages using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2layout",
    version,
    about = "Extract validated layout blocks from PDF pages using Vision LLMs",
    long_about = "Render each PDF page, ask a vision model for its layout as JSON blocks, \
validate schema and geometry, re-ask once on failure within a cost budget, and compose the \
result into Markdown, plain text and layout JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write artifacts into this directory instead of printing to stdout.
    #[arg(short = 'd', long, env = "PDF2LAYOUT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Output kinds: markdown, text, layout_json, or all (comma-separated).
    #[arg(long, alias = "format", env = "PDF2LAYOUT_OUTPUTS", default_value = "markdown")]
    outputs: String,

    /// Vision model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "PDF2LAYOUT_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDF2LAYOUT_PROVIDER")]
    provider: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,7-9.
    #[arg(long, env = "PDF2LAYOUT_PAGES", default_value = "all")]
    pages: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2LAYOUT_DPI", default_value_t = 180,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent vision calls. Defaults to a per-provider value.
    #[arg(short, long, env = "PDF2LAYOUT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Concurrency override that wins over --concurrency.
    #[arg(long, env = "PDF2LAYOUT_PROVIDER_CONCURRENCY")]
    provider_concurrency: Option<usize>,

    /// Estimated cost of one vision call, in USD.
    #[arg(long, env = "PDF2LAYOUT_COST_PER_PAGE_USD", default_value_t = 0.02)]
    cost_per_page_usd: f64,

    /// Stop re-asking once estimated spend reaches this cap, in USD.
    #[arg(long, env = "PDF2LAYOUT_BUDGET_USD")]
    budget_usd: Option<f64>,

    /// Write overlays/page-NNNN.png with block outlines.
    #[arg(long, env = "PDF2LAYOUT_SAVE_OVERLAYS", requires = "output_dir")]
    save_overlays: bool,

    /// Write intermediate/page-NNNN.json with each page and its report.
    #[arg(long, env = "PDF2LAYOUT_SAVE_INTERMEDIATE", requires = "output_dir")]
    save_intermediate: bool,

    /// Fail (exit 2) when a reviewed page still has findings.
    #[arg(long, env = "PDF2LAYOUT_STRICT")]
    strict: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2LAYOUT_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2LAYOUT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2LAYOUT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2LAYOUT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the full run output as JSON instead of Markdown (stdout mode).
    #[arg(long, env = "PDF2LAYOUT_JSON", conflicts_with = "output_dir")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2LAYOUT_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2LAYOUT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2LAYOUT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(stats) if stats.as_ref().is_some_and(|s| s.budget_exhausted) => {
            ExitCode::from(BUDGET_EXCEEDED_EXIT_CODE)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", red("error:"), err);
            let code = err
                .downcast_ref::<LayoutError>()
                .map_or(1, LayoutError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Execute the command; returns the run stats when an extraction happened.
async fn run(cli: &Cli, show_progress: bool) -> Result<Option<RunStats>> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = info.title {
                println!("Title:        {t}");
            }
            if let Some(ref a) = info.author {
                println!("Author:       {a}");
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            if let Some(ref p) = info.producer {
                println!("Producer:     {p}");
            }
        }
        return Ok(None);
    }

    let kinds = OutputKind::parse_list(&cli.outputs)?;
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(cli, progress)?;

    // ── Directory mode ───────────────────────────────────────────────────
    if let Some(ref dir) = cli.output_dir {
        let options = ExportOptions {
            overlays: cli.save_overlays,
            intermediate: cli.save_intermediate,
        };
        let (stats, manifest) = convert_to_dir(&cli.input, dir, &kinds, options, &config)
            .await
            .context("Extraction failed")?;

        if !cli.quiet {
            print_summary(&stats);
            for path in manifest
                .primary
                .iter()
                .chain(&manifest.overlays)
                .chain(&manifest.intermediate)
            {
                eprintln!("   → {}", dim(&path.display().to_string()));
            }
        }
        return Ok(Some(stats));
    }

    // ── Stdout mode ──────────────────────────────────────────────────────
    let output = convert(&cli.input, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for kind in OutputKind::ALL.into_iter().filter(|k| kinds.contains(k)) {
            let body = match kind {
                OutputKind::Markdown => output.markdown.clone(),
                OutputKind::Text => output.text.clone(),
                OutputKind::LayoutJson => serde_json::to_string_pretty(&serde_json::json!({
                    "pages": output.pages,
                    "metadata": output.metadata,
                }))
                .context("Failed to serialise layout")?,
            };
            handle
                .write_all(body.as_bytes())
                .context("Failed to write to stdout")?;
            if !body.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet && !cli.json {
        print_summary(&output.stats);
    }
    Ok(Some(output.stats))
}

fn print_summary(stats: &RunStats) {
    let mark = if stats.is_truncated() {
        yellow("⚠")
    } else {
        green("✔")
    };
    eprintln!(
        "{}  {}/{} pages reviewed  {} re-asked ({} kept)  {} fallback  {}ms",
        mark,
        stats.reviewed_pages,
        stats.planned_pages,
        stats.reasked_pages,
        stats.reasks_accepted,
        stats.fallback_pages,
        stats.total_duration_ms,
    );
    let cap = stats
        .budget_usd
        .map_or_else(|| "no cap".to_string(), |c| format!("cap ${c:.2}"));
    eprintln!(
        "   {} tokens in  /  {} tokens out  ·  est. ${:.4} ({})",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        stats.spend_usd,
        cap,
    );
    if stats.budget_exhausted {
        eprintln!(
            "   {}",
            yellow("budget exhausted: remaining pages kept their first extraction")
        );
    }
}

/// Map CLI args to `LayoutConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<LayoutConfig> {
    let pages: PageSelection = cli.pages.parse()?;

    let concurrency = cli.concurrency.unwrap_or_else(|| {
        let key = cli
            .provider
            .as_deref()
            .or(cli.model.as_deref())
            .unwrap_or("openai");
        provider_default_concurrency(key)
    });

    let mut builder = LayoutConfig::builder()
        .dpi(cli.dpi)
        .concurrency(concurrency)
        .pages(pages)
        .cost_per_page_usd(cli.cost_per_page_usd)
        .strict_validation(cli.strict)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout);

    if let Some(n) = cli.provider_concurrency {
        builder = builder.provider_concurrency(n);
    }
    if let Some(usd) = cli.budget_usd {
        builder = builder.budget_usd(usd);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_surface_flags() {
        let cli = Cli::try_parse_from([
            "pdf2layout",
            "doc.pdf",
            "--outputs",
            "md,json",
            "--pages",
            "1-3,7",
            "--budget-usd",
            "0.5",
            "-d",
            "out",
            "--save-overlays",
        ])
        .unwrap();
        assert_eq!(cli.dpi, 180);
        assert_eq!(cli.budget_usd, Some(0.5));
        assert!(cli.save_overlays);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.pages.to_page_numbers(10), vec![1, 2, 3, 7]);
        assert_eq!(config.effective_concurrency(), Some(6));
    }

    #[test]
    fn overlays_require_output_dir() {
        assert!(Cli::try_parse_from(["pdf2layout", "doc.pdf", "--save-overlays"]).is_err());
    }

    #[test]
    fn provider_concurrency_wins() {
        let cli = Cli::try_parse_from([
            "pdf2layout",
            "doc.pdf",
            "--provider",
            "anthropic",
            "--provider-concurrency",
            "2",
        ])
        .unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.concurrency, Some(3));
        assert_eq!(config.effective_concurrency(), Some(2));
    }
}
