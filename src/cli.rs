//! Command-line interface definitions for Smartblock Scout.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Secrets can be provided via flags or environment variables.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for Smartblock Scout.
///
/// Every job reads and updates the JSON workbook given by `--workbook`.
///
/// # Examples
///
/// ```sh
/// # Keyword volumes + smartblock summary for rows queued under `keyword`
/// smartblock_scout --workbook ./workbook.json collect
///
/// # Exposure analysis with a custom config and output directory
/// smartblock_scout --workbook ./workbook.json -c config.yaml -o ./out analyze
///
/// # Inspect a single query without touching the workbook's rows
/// smartblock_scout --workbook ./workbook.json serp --query "캠핑 의자"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the JSON workbook
    #[arg(short, long)]
    pub workbook: PathBuf,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for reports and production artifacts (overrides config)
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// SearchAd API key
    #[arg(long, env = "NAVER_SEARCHAD_API_KEY", hide_env_values = true)]
    pub searchad_api_key: Option<String>,

    /// SearchAd secret key
    #[arg(long, env = "NAVER_SEARCHAD_SECRET_KEY", hide_env_values = true)]
    pub searchad_secret_key: Option<String>,

    /// SearchAd customer ID
    #[arg(long, env = "NAVER_SEARCHAD_CUSTOMER_ID")]
    pub searchad_customer_id: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect search volumes and the smartblock summary (queue `keyword`)
    Collect,
    /// Collect tracked blog ranks (queue `rank`)
    Rank,
    /// Collect top posts without analysis (queue `posts`)
    Posts,
    /// Collect top posts and run the exposure analysis (queue `analysis`)
    Analyze,
    /// Run the content production pipeline (queue `produce`)
    Produce,
    /// Fetch and classify one query, printing the summary as JSON
    Serp {
        #[arg(short, long)]
        query: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "smartblock_scout",
            "--workbook",
            "./workbook.json",
            "--output-dir",
            "./out",
            "collect",
        ]);

        assert_eq!(cli.workbook, PathBuf::from("./workbook.json"));
        assert_eq!(cli.output_dir.as_deref(), Some("./out"));
        assert_eq!(cli.command, Command::Collect);
    }

    #[test]
    fn test_cli_short_flags_and_serp_query() {
        let cli = Cli::parse_from([
            "smartblock_scout",
            "-w",
            "/tmp/wb.json",
            "-c",
            "/tmp/config.yaml",
            "serp",
            "--query",
            "캠핑 의자",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.yaml")));
        assert_eq!(
            cli.command,
            Command::Serp {
                query: "캠핑 의자".into()
            }
        );
    }

    #[test]
    fn test_workbook_is_required() {
        assert!(Cli::try_parse_from(["smartblock_scout", "rank"]).is_err());
    }

    #[test]
    fn test_explicit_key_flags() {
        let cli = Cli::parse_from([
            "smartblock_scout",
            "-w",
            "wb.json",
            "--gemini-api-key",
            "g-key",
            "--searchad-customer-id",
            "123",
            "produce",
        ]);
        assert_eq!(cli.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(cli.searchad_customer_id.as_deref(), Some("123"));
        assert_eq!(cli.command, Command::Produce);
    }
}
