//! CLI binary for edgequake-pdftrans.
//!
//! A thin shim over the library crate: loads the input, uploads it through
//! the `DashboardFacade`, submits one translation job and follows it to
//! completion.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdftrans::input::default_output_path;
use edgequake_pdftrans::{
    load_input, ArtifactStore, DashboardFacade, DocumentKind, EchoEngine, FsStore, HttpEngine, HttpEngineConfig,
    JobEvent, JobEventKind, JobId, JobManager, JobManagerConfig, JobState, MemoryStore,
    TranslationEngine,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Dry run with the echo engine (output is the input, after a short delay)
  pdftrans report.pdf --to fr

  # Translate through a remote service
  pdftrans report.pdf --to de --engine http --endpoint https://translate.example/v1/documents

  # Explicit source language, custom output path
  pdftrans https://example.org/paper.pdf --from en --to pt-BR -o paper.pt.pdf

  # Keep artifacts on disk between runs
  pdftrans report.pdf --to es --store ~/.cache/pdftrans

  # Machine-readable job status on stdout
  pdftrans report.pdf --to fr --json > status.json

RETRY POLICY:
  Transient engine failures (timeouts, HTTP 408/425/429/5xx) are retried up
  to --max-retries times. The delay before retry n is
  retry-backoff-ms × 2^(n-1), capped at 30s, with ±20% jitter.
  Permanent failures (unsupported language, corrupt input, other 4xx) fail
  the job immediately.

ENVIRONMENT VARIABLES:
  PDFTRANS_ENGINE         echo | http
  PDFTRANS_ENDPOINT       Translation service URL (http engine)
  PDFTRANS_API_KEY        Bearer token for the translation service
  PDFTRANS_STORE          Artifact directory (default: in memory)
  RUST_LOG                Overrides --verbose/--quiet log filtering
"#;

/// Translate PDF documents with retry, progress and atomic output.
#[derive(Parser, Debug)]
#[command(
    name = "pdftrans",
    version,
    about = "Translate PDF files and URLs through a document translation engine",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Target language tag (fr, de, pt-BR, …).
    #[arg(short = 't', long = "to", env = "PDFTRANS_TO")]
    to: String,

    /// Source language tag. Detected by the engine when omitted.
    #[arg(long = "from", env = "PDFTRANS_FROM")]
    from: Option<String>,

    /// Output file. Default: <input-stem>.<lang>.pdf next to the input.
    #[arg(short, long, env = "PDFTRANS_OUTPUT")]
    output: Option<PathBuf>,

    /// Translation engine.
    #[arg(long, env = "PDFTRANS_ENGINE", value_enum, default_value = "echo")]
    engine: EngineArg,

    /// Translation service URL (required with --engine http).
    #[arg(long, env = "PDFTRANS_ENDPOINT")]
    endpoint: Option<String>,

    /// API key sent as a bearer token to the translation service.
    #[arg(long, env = "PDFTRANS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Simulated translation time for the echo engine, in milliseconds.
    #[arg(long, env = "PDFTRANS_ECHO_DELAY_MS", default_value_t = 2000)]
    echo_delay_ms: u64,

    /// Retries after the first attempt on transient engine failures.
    #[arg(long, env = "PDFTRANS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base retry delay in milliseconds (doubles per retry).
    #[arg(long, env = "PDFTRANS_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-attempt engine timeout in seconds.
    #[arg(long, env = "PDFTRANS_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Give up waiting for the job after this many seconds.
    #[arg(long, env = "PDFTRANS_WAIT_TIMEOUT", default_value_t = 3600)]
    wait_timeout: u64,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "PDFTRANS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Store artifacts in this directory instead of memory.
    #[arg(long, env = "PDFTRANS_STORE")]
    store: Option<PathBuf>,

    /// Print the final job status as JSON on stdout.
    #[arg(long, env = "PDFTRANS_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDFTRANS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTRANS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTRANS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum EngineArg {
    Echo,
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the per-attempt feedback, so library INFO logs
    // are suppressed while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Wire up the pipeline ─────────────────────────────────────────────
    let config = JobManagerConfig::builder()
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .attempt_timeout_secs(cli.timeout)
        .max_concurrent_jobs(1)
        .build()
        .context("Invalid configuration")?;

    let store: Arc<dyn ArtifactStore> = match cli.store {
        Some(ref dir) => Arc::new(
            FsStore::open(dir)
                .await
                .with_context(|| format!("Failed to open artifact store at {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let engine = build_engine(&cli)?;

    let manager = JobManager::new(config.clone(), store, engine);
    let dashboard = DashboardFacade::new(manager.clone());

    // ── Upload and submit ────────────────────────────────────────────────
    let input = load_input(&cli.input, cli.download_timeout)
        .await
        .context("Failed to load input")?;
    // Extension-less inputs already passed the magic check in the loader.
    let declared = DocumentKind::from_file_name(&input.name)
        .map(|k| k.mime_type())
        .unwrap_or("application/pdf");
    let doc = dashboard
        .upload(&input.name, declared, input.bytes)
        .await
        .context("Upload rejected")?;

    let events = manager.subscribe();
    let job = dashboard
        .translate_from(&doc, cli.from.as_deref(), &cli.to)
        .await
        .context("Failed to start translation")?;

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {} → {}  {}",
            cyan("◆"),
            bold(&input.name),
            bold(&cli.to),
            dim(&format!("job {job}"))
        );
    }

    let progress =
        show_progress.then(|| spawn_progress(events, dashboard.clone(), job, config.max_attempts()));

    // ── Wait, honouring Ctrl-C ───────────────────────────────────────────
    let wait = dashboard.wait(job, Duration::from_secs(cli.wait_timeout));
    let status = tokio::select! {
        res = wait => res.context("Translation did not finish")?,
        _ = tokio::signal::ctrl_c() => {
            dashboard.cancel(job).context("Failed to cancel job")?
        }
    };
    if let Some(mut handle) = progress {
        // The terminal event may already have been dropped by a lagging
        // receiver; the channel stays open while the manager is alive.
        if tokio::time::timeout(Duration::from_secs(1), &mut handle).await.is_err() {
            handle.abort();
        }
    }
    manager.shutdown();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialise job status")?
        );
    }

    match status.state {
        JobState::Succeeded => {
            let output_path = cli
                .output
                .clone()
                .unwrap_or_else(|| default_output_path(&cli.input, &status.target_language));
            let written = dashboard
                .save_result(job, &output_path)
                .await
                .context("Failed to write translated document")?;
            if !cli.quiet && !cli.json {
                eprintln!(
                    "{}  {} attempt(s)  {} bytes  →  {}",
                    green("✔"),
                    status.attempt_count,
                    written,
                    bold(&output_path.display().to_string()),
                );
            }
            Ok(())
        }
        JobState::Cancelled => anyhow::bail!("Translation cancelled"),
        _ => anyhow::bail!(
            "Translation failed after {} attempt(s): {}",
            status.attempt_count,
            status.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Map CLI args to a translation engine.
fn build_engine(cli: &Cli) -> Result<Arc<dyn TranslationEngine>> {
    let engine: Arc<dyn TranslationEngine> = match cli.engine {
        EngineArg::Echo => Arc::new(EchoEngine::new(Duration::from_millis(cli.echo_delay_ms))),
        EngineArg::Http => {
            let endpoint = cli
                .endpoint
                .as_deref()
                .context("--endpoint (or PDFTRANS_ENDPOINT) is required with --engine http")?;
            let mut config = HttpEngineConfig::new(endpoint)?.request_timeout_secs(cli.timeout);
            if let Some(ref key) = cli.api_key {
                config = config.api_key(key.clone());
            }
            Arc::new(HttpEngine::new(config)?)
        }
    };
    Ok(engine)
}

/// Render job events on a spinner until the job is terminal.
fn spawn_progress(
    mut events: broadcast::Receiver<JobEvent>,
    dashboard: DashboardFacade,
    job: JobId,
    max_attempts: u32,
) -> JoinHandle<()> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Queued");
    bar.enable_steady_tick(Duration::from_millis(80));

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(e) if e.job_id == job => e,
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => {
                    if dashboard.status(job).map_or(true, |s| s.is_terminal()) {
                        bar.finish_and_clear();
                        break;
                    }
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event.kind {
                JobEventKind::Submitted => {}
                JobEventKind::AttemptStarted { attempt } => {
                    bar.set_prefix("Translating");
                    bar.set_message(format!("attempt {attempt}/{max_attempts}"));
                }
                JobEventKind::RetryScheduled {
                    attempt,
                    delay_ms,
                    error,
                } => {
                    let msg = if error.chars().count() > 80 {
                        format!("{}\u{2026}", error.chars().take(79).collect::<String>())
                    } else {
                        error
                    };
                    bar.println(format!(
                        "  {} attempt {}/{}  {}  {}",
                        red("✗"),
                        attempt,
                        max_attempts,
                        red(&msg),
                        dim(&format!("retry in {:.1}s", delay_ms as f64 / 1000.0)),
                    ));
                    bar.set_prefix("Waiting");
                }
                JobEventKind::Succeeded { .. } => {
                    bar.finish_and_clear();
                    break;
                }
                JobEventKind::Failed { ref error } => {
                    bar.finish_and_clear();
                    eprintln!("{} {}", red("✘"), red(error));
                    break;
                }
                JobEventKind::Cancelled => {
                    bar.finish_and_clear();
                    eprintln!("{} cancelled", cyan("⚠"));
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_stops_when_terminal_event_was_missed() {
        let config = JobManagerConfig::builder().event_capacity(1).build().unwrap();
        let manager = JobManager::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(EchoEngine::new(Duration::ZERO)),
        );
        let dashboard = DashboardFacade::new(manager.clone());
        let first = dashboard.upload("a.pdf", "pdf", b"%PDF-1.7 a".to_vec()).await.unwrap();
        let second = dashboard.upload("b.pdf", "pdf", b"%PDF-1.7 b".to_vec()).await.unwrap();

        let events = manager.subscribe();
        let job = dashboard.translate(&first, "fr").await.unwrap();
        dashboard.wait(job, Duration::from_secs(5)).await.unwrap();
        // Push the finished job's events out of the one-slot buffer.
        let other = dashboard.translate(&second, "fr").await.unwrap();
        dashboard.wait(other, Duration::from_secs(5)).await.unwrap();

        let handle = spawn_progress(events, dashboard, job, 1);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("progress task returned")
            .unwrap();
        manager.shutdown();
    }
}
