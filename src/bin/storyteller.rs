//! CLI binary for dragonscale-storyteller.
//!
//! A thin shim over the library crate: `serve` runs the HTTP API, `create`
//! runs the pipeline once on a local PDF, `extract` prints the text pdfium
//! sees.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dragonscale_storyteller::{
    server, Language, Mood, PdfTextExtractor, PdfiumExtractor, PipelineStep, ServiceConfig,
    StoryConfig, StoryProgressCallback, StoryService,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per finished phase.
struct CliProgressCallback {
    bar: ProgressBar,
    missing_images: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            missing_images: AtomicUsize::new(0),
        })
    }
}

impl StoryProgressCallback for CliProgressCallback {
    fn on_step(&self, step: PipelineStep) {
        self.bar.set_prefix(step.label());
        self.bar.set_message("");
    }

    fn on_phase_complete(&self, order: usize, total: usize, has_image: bool) {
        let mark = if has_image { green("✓") } else { red("✗") };
        self.bar.println(format!(
            "  {} Phase {}/{}  {}",
            mark,
            order + 1,
            total,
            dim(if has_image { "illustrated" } else { "no image" })
        ));
    }

    fn on_image_failed(&self, _order: usize, error: &str) {
        self.missing_images.fetch_add(1, Ordering::SeqCst);
        let msg: String = error.chars().take(80).collect();
        self.bar.set_message(red(&msg));
    }

    fn on_story_complete(&self, story_id: &str, elapsed_ms: u64) {
        self.bar.finish_and_clear();
        let missing = self.missing_images.load(Ordering::SeqCst);
        eprintln!(
            "{} Story {} ready in {:.1}s{}",
            green("✔"),
            bold(story_id),
            elapsed_ms as f64 / 1000.0,
            if missing > 0 {
                format!("  ({} phases without image)", missing)
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API on port 8080
  storyteller serve --bind 0.0.0.0:8080

  # One-off story in English, horror mood
  storyteller create manual.pdf --language en --mood horror --keywords "lantern,fog"

  # Write the story JSON somewhere else
  storyteller create manual.pdf -o out/

  # Show the text the pipeline will see (no API key needed)
  storyteller extract manual.pdf

MOODS:
  neutral adventure epic happy sad horror dramatic romantic mysterious
  inspirational dark

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI key (chat and images)
  ANTHROPIC_API_KEY       Anthropic key (chat)
  EDGEQUAKE_LLM_PROVIDER  Override chat provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override chat model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Turn PDF documents into illustrated four-phase stories.
#[derive(Parser, Debug)]
#[command(
    name = "storyteller",
    version,
    about = "Turn PDF documents into illustrated four-phase stories",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    service: ServiceArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STORYTELLER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "STORYTELLER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "STORYTELLER_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },
    /// Generate one story from a local PDF.
    Create {
        /// PDF file to turn into a story.
        pdf: PathBuf,

        /// Story language: de or en.
        #[arg(long, default_value = "de")]
        language: String,

        /// Story mood; unknown values fall back to neutral.
        #[arg(long, default_value = "neutral")]
        mood: String,

        /// Comma-separated keywords to weave into the story.
        #[arg(long)]
        keywords: Option<String>,

        /// Directory for `story-<id>.json`.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Print the story JSON to stdout instead of writing a file.
        #[arg(long)]
        json: bool,

        /// Disable the progress spinner.
        #[arg(long, env = "STORYTELLER_NO_PROGRESS")]
        no_progress: bool,
    },
    /// Print the text extracted from a PDF.
    Extract {
        pdf: PathBuf,
    },
}

/// Flags shared by every subcommand that builds a `StoryService`.
#[derive(Args, Debug)]
struct ServiceArgs {
    /// Chat model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Chat provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Chat temperature (0.0–2.0).
    #[arg(long, global = true, env = "STORYTELLER_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Retries per chat call on transient failure.
    #[arg(long, global = true, env = "STORYTELLER_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-chat-call timeout in seconds.
    #[arg(long, global = true, env = "STORYTELLER_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Base URL of the OpenAI-compatible image API.
    #[arg(long, global = true, env = "STORYTELLER_IMAGE_BASE_URL", default_value = "https://api.openai.com/v1")]
    image_base_url: String,

    /// Image model ID.
    #[arg(long, global = true, env = "STORYTELLER_IMAGE_MODEL", default_value = "dall-e-3")]
    image_model: String,

    /// Image size, e.g. 1024x1024.
    #[arg(long, global = true, env = "STORYTELLER_IMAGE_SIZE", default_value = "1024x1024")]
    image_size: String,

    /// API key for the image endpoint (falls back to OPENAI_API_KEY).
    #[arg(long, global = true, env = "STORYTELLER_IMAGE_API_KEY", hide_env_values = true)]
    image_api_key: Option<String>,

    /// Phases illustrated concurrently.
    #[arg(long, global = true, env = "STORYTELLER_PHASE_CONCURRENCY", default_value_t = 1)]
    phase_concurrency: usize,

    /// Root directory for generated-stories/.
    #[arg(long, global = true, env = "STORYTELLER_STORAGE_DIR", default_value = "wwwroot")]
    storage_dir: PathBuf,

    /// Cache lifetime of a story, in hours.
    #[arg(long, global = true, env = "STORYTELLER_CACHE_TTL_HOURS", default_value_t = 24)]
    cache_ttl_hours: u64,

    /// Largest accepted upload, in MiB.
    #[arg(long, global = true, env = "STORYTELLER_MAX_UPLOAD_MB", default_value_t = 10)]
    max_upload_mb: usize,

    /// Path to libpdfium (file or directory).
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback for `create`; keep library logs quiet
    // unless asked for.
    let show_progress = matches!(
        cli.command,
        Command::Create { json: false, no_progress: false, .. }
    ) && !cli.quiet;
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

    match cli.command {
        Command::Serve { bind } => {
            let config = build_config(&cli.service)?;
            let service = StoryService::from_config(config)
                .await
                .context("Failed to start story service")?;
            server::serve(Arc::new(service), bind)
                .await
                .context("Server failed")?;
        }

        Command::Create {
            ref pdf,
            ref language,
            ref mood,
            ref keywords,
            ref output,
            json,
            ..
        } => {
            let bytes = tokio::fs::read(pdf)
                .await
                .with_context(|| format!("Failed to read {}", pdf.display()))?;
            let file_name = pdf
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload.pdf")
                .to_string();
            let options = StoryConfig {
                language: language.parse::<Language>().context("Invalid --language")?,
                mood: Mood::parse_lenient(mood),
                keywords: keywords
                    .as_deref()
                    .map(dragonscale_storyteller::config::parse_keywords)
                    .unwrap_or_default(),
            };

            let config = build_config(&cli.service)?;
            let mut service = StoryService::from_config(config)
                .await
                .context("Failed to start story service")?;
            if show_progress {
                service = service.with_progress(CliProgressCallback::new());
            }

            let story = service
                .create_story_from_pdf(&bytes, &file_name, Some(options))
                .await
                .context("Story generation failed")?;
            let story_json = story.to_pretty_json().context("Failed to serialise story")?;

            if json {
                println!("{story_json}");
            } else {
                tokio::fs::create_dir_all(output)
                    .await
                    .with_context(|| format!("Failed to create {}", output.display()))?;
                let path = output.join(format!("story-{}.json", story.id));
                tokio::fs::write(&path, story_json)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    eprintln!("{}  {}", bold(&story.title), dim(&path.display().to_string()));
                    if let Some(ref pdf_path) = story.pdf_file_path {
                        eprintln!(
                            "   PDF: {}",
                            cli.service.storage_dir.join(pdf_path).display()
                        );
                    }
                }
            }
        }

        Command::Extract { ref pdf } => {
            let bytes = tokio::fs::read(pdf)
                .await
                .with_context(|| format!("Failed to read {}", pdf.display()))?;
            let extractor = PdfiumExtractor::new(cli.service.pdfium_lib.clone());
            let text = tokio::task::spawn_blocking(move || extractor.extract_text(&bytes))
                .await
                .context("Extraction task panicked")?
                .context("Text extraction failed")?;
            println!("{text}");
        }
    }

    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn build_config(args: &ServiceArgs) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .image_base_url(args.image_base_url.clone())
        .image_model(args.image_model.clone())
        .image_size(args.image_size.clone())
        .phase_concurrency(args.phase_concurrency)
        .storage_dir(args.storage_dir.clone())
        .cache_ttl(Duration::from_secs(args.cache_ttl_hours * 3600))
        .max_upload_bytes(args.max_upload_mb * 1024 * 1024);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref key) = args.image_api_key {
        builder = builder.image_api_key(key.clone());
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }

    builder.build().context("Invalid configuration")
}
