//! # Smartblock Scout
//!
//! Keyword research for Naver blog marketing: reads a JSON workbook of
//! keywords, inspects each keyword's mobile search result page and records
//! what it finds back into the workbook.
//!
//! ## Features
//!
//! - Parses the result page into sections and classifies popular-article
//!   and popular-topic smartblocks
//! - Looks up monthly search volumes through the SearchAd keyword tool,
//!   with a per-keyword fallback for rejected batches
//! - Ranks tracked blogs inside every section of the page
//! - Collects top posts per smartblock and asks Gemini what they share
//! - Produces titled, planned, drafted, reviewed and rewritten posts for
//!   each popular topic
//!
//! ## Usage
//!
//! ```sh
//! smartblock_scout --workbook ./workbook.json collect
//! ```
//!
//! ## Architecture
//!
//! Every subcommand except `serp` is a batch job:
//! 1. **Select**: rows whose queue flag for the job is set
//! 2. **Process**: one row at a time, within the job's runtime budget
//! 3. **Record**: outcome written to the row, queue flag cleared
//! 4. **Persist**: workbook saved after every row; reports and artifacts
//!    written as JSON and Markdown under `output_dir/<date>/`

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod analysis;
mod blog;
mod cli;
mod config;
mod error;
mod gemini;
mod http;
mod jobs;
mod models;
mod outputs;
mod production;
mod rank;
mod retry;
mod searchad;
mod serp;
mod store;
mod utils;

use cli::{Cli, Command};
use config::ScoutConfig;
use error::{ScoutError, ScoutResult};
use gemini::{GeminiClient, RunContext};
use http::{HttpClient, ReqwestClient};
use jobs::JobSummary;
use searchad::{SearchAdClient, SearchAdCredentials};
use store::Workbook;
use utils::ensure_writable_dir;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch, parse and classify one query and print the summary as JSON.
async fn print_serp_summary<C: HttpClient>(http: &C, config: &ScoutConfig, query: &str) -> ScoutResult<()> {
    let sections = serp::fetch_sections(http, config, query).await?;
    let summary = serp::summarize(&sections);
    info!(sections = sections.len(), flag = summary.flag(), "classified result page");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_job<C: HttpClient>(
    http: &C,
    args: &Cli,
    config: &ScoutConfig,
    workbook: &mut Workbook,
) -> ScoutResult<JobSummary> {
    let path = args.workbook.as_path();
    let run = RunContext::new();
    match &args.command {
        Command::Collect => {
            let credentials = SearchAdCredentials::new(
                args.searchad_api_key.as_deref(),
                args.searchad_secret_key.as_deref(),
                args.searchad_customer_id.as_deref(),
            )?;
            let volumes = SearchAdClient::new(http, config, credentials);
            jobs::keywords::run_keyword_collect(http, &volumes, config, workbook, path).await
        }
        Command::Rank => jobs::rank::run_rank_collect(http, config, workbook, path).await,
        Command::Posts => jobs::posts::run_post_collect(http, config, workbook, path).await,
        Command::Analyze => {
            let gemini = GeminiClient::new(http, config, args.gemini_api_key.as_deref())?;
            jobs::posts::run_exposure_analysis(http, &gemini, &run, config, workbook, path).await
        }
        Command::Produce => {
            let gemini = GeminiClient::new(http, config, args.gemini_api_key.as_deref())?;
            jobs::produce::run_content_production(http, &gemini, &run, config, workbook, path).await
        }
        Command::Serp { .. } => Err(ScoutError::validation("serp does not run as a workbook job")),
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("smartblock_scout starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(workbook = %args.workbook.display(), command = ?args.command, "Parsed CLI arguments");

    let mut config = ScoutConfig::load(args.config.as_deref()).await?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    let http = ReqwestClient::new(HTTP_TIMEOUT)?;

    if let Command::Serp { query } = &args.command {
        print_serp_summary(&http, &config, query).await?;
        return Ok(());
    }

    // Early check: reports and artifacts need a writable output dir
    if matches!(args.command, Command::Posts | Command::Analyze | Command::Produce) {
        if let Err(e) = ensure_writable_dir(&config.output_dir).await {
            error!(
                path = %config.output_dir,
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let mut workbook = Workbook::load(Path::new(&args.workbook)).await?;
    let summary = match run_job(&http, &args, &config, &mut workbook).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Job failed");
            return Err(e.into());
        }
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let elapsed = start_time.elapsed();
    info!(
        %summary,
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
