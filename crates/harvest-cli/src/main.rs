use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use harvest_client::{Fetcher, HttpStatusReporter, ListingAdapter, ReqwestFetcher, SearchPageSource};
use harvest_core::models::{SessionOutcome, SessionStatus};
use harvest_core::session::DEFAULT_QUERY;
use harvest_core::{PacingConfig, PacingPolicy, SessionConfig, SessionController, TracingReporter};
use harvest_store::{OutputConfig, OutputLayout};

/// How long to wait for job-status updates still in flight at exit.
const STATUS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "harvest", version, about = "Resumable paginated product harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest search results for a query, resuming an interrupted session
    Run(RunArgs),

    /// Rebuild the JSON snapshot from the CSV row store
    Export {
        /// Search query whose files to export
        #[arg(default_value = DEFAULT_QUERY)]
        query: String,
    },

    /// Show stored record count and any pending checkpoint for a query
    Status {
        /// Search query to inspect
        #[arg(default_value = DEFAULT_QUERY)]
        query: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Search query (blank uses the default query)
    #[arg(default_value = "")]
    query: String,

    /// Maximum number of items to capture this session
    #[arg(short = 'n', long, default_value_t = 5)]
    max_items: u32,

    /// Maximum number of result pages to visit
    #[arg(short = 'p', long, default_value_t = 1)]
    max_pages: u32,

    /// Render pages in headless Chromium instead of plain HTTP
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Site to harvest
    #[arg(long, env = "HARVEST_BASE_URL", default_value = "https://www.amazon.in")]
    base_url: String,

    /// Job id to report progress for
    #[arg(long)]
    job_id: Option<String>,

    /// Job-tracking API base URL (used with --job-id)
    #[arg(long, env = "HARVEST_STATUS_API", default_value = "http://localhost:5000/api")]
    status_api: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("harvest=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = OutputConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Run(args) => cmd_run(args, &output).await,
        Commands::Export { query } => cmd_export(&query, &output).await,
        Commands::Status { query } => cmd_status(&query, &output).await,
    }
}

async fn cmd_run(args: RunArgs, output: &OutputConfig) -> Result<()> {
    let config = SessionConfig::default();
    let query = config.resolve_query(&args.query);

    let layout = OutputLayout::for_query(output, &query);
    layout
        .ensure_dirs()
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to prepare output directories")?;

    let pacing = PacingConfig::from_env()
        .and_then(PacingPolicy::new)
        .map_err(|e| anyhow::anyhow!(e))?;

    let status = match &args.job_id {
        Some(job_id) => Some(
            HttpStatusReporter::new(&args.status_api, job_id).map_err(|e| anyhow::anyhow!(e))?,
        ),
        None => None,
    };

    let interrupt = CancellationToken::new();
    tokio::spawn(stop_on_ctrl_c(interrupt.clone()));

    let updates = status.clone();
    let outcome = if args.headless {
        let fetcher = browser_fetcher().await?;
        harvest(fetcher, &args, &query, &layout, pacing, status, config, interrupt).await?
    } else {
        let fetcher = ReqwestFetcher::new().context("Failed to create HTTP client")?;
        harvest(fetcher, &args, &query, &layout, pacing, status, config, interrupt).await?
    };
    if let Some(updates) = &updates {
        updates.flush(STATUS_FLUSH_TIMEOUT).await;
    }

    print_summary(&query, &outcome, &layout);

    match outcome.status {
        SessionStatus::Failed => Err(anyhow::anyhow!(
            "session failed: {}",
            outcome.cause.as_deref().unwrap_or("unknown cause")
        )),
        SessionStatus::Completed | SessionStatus::Interrupted => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn harvest<F: Fetcher>(
    fetcher: F,
    args: &RunArgs,
    query: &str,
    layout: &OutputLayout,
    pacing: PacingPolicy,
    status: Option<HttpStatusReporter>,
    config: SessionConfig,
    interrupt: CancellationToken,
) -> Result<SessionOutcome> {
    let source = SearchPageSource::new(fetcher, &args.base_url).map_err(|e| anyhow::anyhow!(e))?;
    let adapter = ListingAdapter::new(&args.base_url).map_err(|e| anyhow::anyhow!(e))?;

    let mut controller = SessionController::new(
        source,
        adapter,
        layout.record_sink(),
        layout.progress_store(),
        pacing,
        (TracingReporter, status),
        config,
    )
    .with_interrupt(interrupt);

    Ok(controller.run(query, args.max_items, args.max_pages).await)
}

#[cfg(feature = "browser")]
async fn browser_fetcher() -> Result<harvest_client::BrowserFetcher> {
    harvest_client::BrowserFetcher::launch(harvest_client::BrowserOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to launch browser")
}

#[cfg(not(feature = "browser"))]
async fn browser_fetcher() -> Result<ReqwestFetcher> {
    anyhow::bail!("--headless needs a build with the `browser` feature")
}

async fn stop_on_ctrl_c(interrupt: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Stop requested; finishing the current item");
            interrupt.cancel();
        }
        Err(e) => tracing::warn!(error = %e, "Failed to install CTRL+C handler"),
    }
}

fn print_summary(query: &str, outcome: &SessionOutcome, layout: &OutputLayout) {
    let absolute = |p: &std::path::Path| {
        std::path::absolute(p)
            .unwrap_or_else(|_| p.to_path_buf())
            .display()
            .to_string()
    };

    println!("{}", "=".repeat(60));
    println!("  Query:            {query}");
    println!("  Status:           {}", outcome.status);
    println!("  Items captured:   {}", outcome.items_captured);
    println!("  Pages processed:  {}", outcome.pages_processed);
    println!(
        "  Skipped:          {} already stored, {} without identity",
        outcome.tally.already_exists, outcome.tally.not_found
    );
    println!(
        "  Errors:           {} extraction, {} sink",
        outcome.tally.extract_errors, outcome.tally.sink_errors
    );
    if let Some(cause) = &outcome.cause {
        println!("  Cause:            {cause}");
    }
    println!("  CSV file:         {}", absolute(layout.rows_path()));
    println!("  JSON file:        {}", absolute(layout.snapshot_path()));
    println!("{}", "=".repeat(60));
}

async fn cmd_export(query: &str, output: &OutputConfig) -> Result<()> {
    let layout = OutputLayout::for_query(output, query);
    if !layout.rows_path().exists() {
        anyhow::bail!("No row store for '{query}' at {}", layout.rows_path().display());
    }

    let count = layout
        .record_sink()
        .snapshot()
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to rebuild snapshot")?;

    tracing::info!(records = count, "Snapshot rebuilt");
    println!(
        "Exported {count} records to {}",
        layout.snapshot_path().display()
    );
    Ok(())
}

async fn cmd_status(query: &str, output: &OutputConfig) -> Result<()> {
    let layout = OutputLayout::for_query(output, query);

    let stored = layout
        .record_sink()
        .identities()
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .len();
    let snapshot = layout
        .record_sink()
        .read_snapshot()
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .len();
    let checkpoint = layout
        .progress_store()
        .load()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Query '{query}' ({})", layout.slug());
    println!("  Records in CSV:   {stored}");
    println!("  Records in JSON:  {snapshot}");
    match checkpoint {
        Some(c) => println!(
            "  Checkpoint:       page {}, next item {}, {} captured (saved {})",
            c.page_number,
            c.resume_index() + 1,
            c.captured,
            c.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("  Checkpoint:       none"),
    }
    Ok(())
}
