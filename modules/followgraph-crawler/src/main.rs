use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use followgraph_common::{Config, Identifier};
use followgraph_crawler::{parse_seeds, CrawlLoop, CrawlStats, FrontierSelector, RecordStore};
use followgraph_graph::{migrate::migrate, GraphClient, UserStore};
use twitter_client::TwitterClient;

#[derive(Parser)]
#[command(name = "followgraph", about = "Incremental follower-graph crawler")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Stop once the API window has this many calls or fewer left
    #[arg(long, global = true)]
    safety_threshold: Option<u64>,

    /// Stop a run after this many expansion attempts
    #[arg(long, global = true)]
    max_expansions: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create constraints and indexes
    Migrate,
    /// Expand the given identities (numeric IDs or @screen_names)
    Seed { seeds: Vec<String> },
    /// Expand frontier stubs until the frontier or the quota runs out
    Run,
    /// Seed, then run
    Crawl { seeds: Vec<String> },
    /// List the stubs that would be expanded next
    Frontier {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one stored record
    Show { ident: String },
}

/// Default levels for the workspace crates, applied on top of `RUST_LOG`.
const LOG_DIRECTIVES: [&str; 2] = ["followgraph=info", "twitter_client=info"];

fn with_crate_directives(mut filter: EnvFilter) -> Result<EnvFilter> {
    for directive in LOG_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = with_crate_directives(EnvFilter::from_default_env())?;
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    // Bad seeds fail before any connection is opened.
    let seeds = match &cli.command {
        Command::Seed { seeds } | Command::Crawl { seeds } => {
            parse_seeds(seeds).context("Invalid seed identifier")?
        }
        _ => Vec::new(),
    };
    let runs_frontier = matches!(cli.command, Command::Run | Command::Crawl { .. });

    let config = Config::from_env().context("Failed to load configuration")?;
    config.log_redacted();

    let client = GraphClient::from_config(&config)
        .await
        .context("Failed to connect to Neo4j")?;
    migrate(&client).await.context("Migration failed")?;
    let store = Arc::new(UserStore::new(client));

    match cli.command {
        Command::Migrate => {
            info!("Migrations complete");
        }
        Command::Frontier { limit } => {
            let frontier = FrontierSelector::new(store.clone());
            for ranked in frontier.peek(limit).await? {
                println!("{}\tdegree={}", ranked.record.id, ranked.degree);
            }
        }
        Command::Show { ident } => {
            let ident: Identifier = ident.parse().context("Invalid identifier")?;
            let Some(record) = RecordStore::resolve(store.as_ref(), &ident).await? else {
                anyhow::bail!("No stored user matches {ident}");
            };
            let degree = RecordStore::degree_of(store.as_ref(), record.id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            println!("degree: {degree}");
        }
        Command::Seed { .. } | Command::Run | Command::Crawl { .. } => {
            let token = config.require_twitter_token()?.to_string();
            let api = TwitterClient::new(
                token,
                &config.twitter_api_base,
                Duration::from_secs(config.http_timeout_secs),
            )
            .context("Failed to build HTTP client")?;

            let threshold = cli.safety_threshold.unwrap_or(config.safety_threshold);
            let mut crawl = CrawlLoop::new(
                Arc::new(api),
                store.clone(),
                threshold,
                info_span!("crawl"),
            );
            let cap = cli
                .max_expansions
                .or_else(|| config.max_expansions.map(|n| u32::try_from(n).unwrap_or(u32::MAX)));
            if let Some(cap) = cap {
                crawl = crawl.with_max_expansions(cap);
            }

            let cancelled = Arc::new(AtomicBool::new(false));
            crawl = crawl.with_cancel_flag(cancelled.clone());
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl-C received, finishing current expansion");
                    cancelled.store(true, Ordering::Relaxed);
                }
            });

            if !seeds.is_empty() {
                let stats = crawl.seed(&seeds).await?;
                report("Seed", &stats);
            }
            if runs_frontier {
                let stats = crawl.run().await?;
                report("Run", &stats);
            }

            let (basic, full) = store.count_by_detail().await?;
            info!(basic, full, "Graph totals");
        }
    }

    Ok(())
}

fn report(phase: &str, stats: &CrawlStats) {
    info!("{phase} complete. {stats}");
}
