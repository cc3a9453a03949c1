//! `busyfeed` CLI: turn an iCalendar feed into opaque busy intervals.
//!
//! ## Usage
//!
//! ```sh
//! # Busy intervals for a window, feed read from a file
//! busyfeed expand -i calendar.ics --start 2024-01-01T00:00:00Z --end 2024-01-22T00:00:00Z
//!
//! # Feed from stdin, window of 14 days starting now
//! cat calendar.ics | busyfeed expand --days 14
//!
//! # Feed from a URL, one entry per occurrence (no merging)
//! busyfeed expand --url https://example.com/cal.ics --days 7 --raw
//!
//! # Check that a feed URL is reachable and parseable
//! busyfeed validate --url https://example.com/cal.ics
//! ```

mod fetch;

use std::io::{self, Read};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use busy_engine::{
    collect_busy_intervals, expand_busy_intervals_with, validate_feed, validate_text, ExpandOptions,
    FeedSource, QueryWindow,
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::fetch::HttpFeedSource;

const DEFAULT_USER_AGENT: &str = concat!("busyfeed/", env!("CARGO_PKG_VERSION"));

#[derive(Parser)]
#[command(
    name = "busyfeed",
    version,
    about = "Privacy-preserving free/busy intervals from iCalendar feeds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// HTTP timeout in seconds when fetching --url feeds
    #[arg(long, env = "BUSYFEED_TIMEOUT_SECS", default_value_t = 5, global = true)]
    timeout_secs: u64,

    /// User-Agent header sent when fetching --url feeds
    #[arg(long, env = "BUSYFEED_USER_AGENT", default_value = DEFAULT_USER_AGENT, global = true)]
    user_agent: String,
}

#[derive(Args)]
struct FeedInput {
    /// Input .ics file (reads from stdin if neither --input nor --url is given)
    #[arg(short, long, conflicts_with = "url")]
    input: Option<String>,
    /// Fetch the feed from this URL
    #[arg(long)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the busy intervals of a feed within a window as JSON
    Expand {
        #[command(flatten)]
        feed: FeedInput,
        /// Window start, RFC 3339 (defaults to now)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Window end, RFC 3339 (defaults to start + --days)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        /// Window length in days when --end is omitted
        #[arg(long, default_value_t = 60)]
        days: i64,
        /// Print one interval per occurrence instead of merging
        #[arg(long)]
        raw: bool,
    },
    /// Check that a feed can be loaded and report its event count
    Validate {
        #[command(flatten)]
        feed: FeedInput,
        /// Start of the validation window, RFC 3339 (defaults to now)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = HttpFeedSource::new(Duration::from_secs(cli.timeout_secs), &cli.user_agent)?;

    match cli.command {
        Commands::Expand {
            feed,
            start,
            end,
            days,
            raw,
        } => {
            let start = start.unwrap_or_else(Utc::now);
            let end = match end {
                Some(end) => end,
                None => start
                    .checked_add_signed(chrono::Duration::days(days))
                    .context("Window end is out of range")?,
            };
            let window = QueryWindow::new(start, end)?;

            let text = read_feed(&feed, &source)?;
            let options = ExpandOptions::default();
            let intervals = if raw {
                collect_busy_intervals(&text, &window, &options)
            } else {
                expand_busy_intervals_with(&text, &window, &options)
            }
            .context("Failed to expand calendar feed")?;

            info!(intervals = intervals.len(), "expanded feed");
            println!("{}", serde_json::to_string_pretty(&intervals)?);
        }
        Commands::Validate { feed, from } => {
            let now = from.unwrap_or_else(Utc::now);
            let report = match &feed.url {
                Some(url) => validate_feed(&source, url, now),
                None => validate_text(&read_feed(&feed, &source)?, now),
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid {
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_feed(feed: &FeedInput, source: &HttpFeedSource) -> Result<String> {
    if let Some(url) = &feed.url {
        return source
            .fetch(url)
            .with_context(|| format!("Failed to fetch feed: {}", url));
    }
    match &feed.input {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
