use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tunecrawl_client::{ReqwestFetcher, StructuredDataParser};
use tunecrawl_core::{
    CrawlJob, CrawlRequest, CrawlType, Crawler, CrawlerConfig, JobStatus, MemoryCatalog,
    SongStore,
};
use tunecrawl_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "tunecrawl", version, about = "Rate-limited song catalog crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one crawl job to completion
    Crawl {
        /// Listing to crawl: recommended, popular or latest
        #[arg(short = 't', long = "type")]
        crawl_type: CrawlType,

        /// Number of songs to collect
        #[arg(short, long)]
        limit: usize,

        /// Persist songs to the catalog database (requires DATABASE_URL)
        #[arg(long, default_value_t = false)]
        save: bool,

        /// Skip text clean-up of crawled records
        #[arg(long, default_value_t = false)]
        no_optimize: bool,

        /// Disable duplicate detection against the batch and the catalog
        #[arg(long, default_value_t = false)]
        no_dedup: bool,

        /// Title similarity at which same-artist songs count as duplicates
        #[arg(long, default_value_t = 1.0)]
        threshold: f64,

        /// Seconds between progress lines
        #[arg(long, default_value_t = 2)]
        progress_interval: u64,
    },

    /// Probe the configured base URL once
    Test,

    /// Print the effective crawler configuration (credentials redacted)
    Config,

    /// Show the most recently stored songs
    Recent {
        /// Number of songs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tunecrawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CrawlerConfig::from_env().context("Invalid crawler configuration")?;

    match cli.command {
        Commands::Crawl {
            crawl_type,
            limit,
            save,
            no_optimize,
            no_dedup,
            threshold,
            progress_interval,
        } => {
            let request = CrawlRequest::new(crawl_type, limit)
                .with_data_optimization(!no_optimize)
                .with_duplicate_detection(!no_dedup)
                .with_duplicate_threshold(threshold);
            let interval = Duration::from_secs(progress_interval.max(1));

            if save {
                let db = connect_db().await?;
                let job = cmd_crawl(config, request, db.song_repo(), interval).await?;
                print_summary(&job)?;
            } else {
                let catalog = MemoryCatalog::new();
                let job = cmd_crawl(config, request, catalog.clone(), interval).await?;
                print_summary(&job)?;
                println!("{}", serde_json::to_string_pretty(&catalog.songs())?);
            }
        }
        Commands::Test => cmd_test(config).await?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.public_view())?);
        }
        Commands::Recent { limit } => {
            let db = connect_db().await?;
            cmd_recent(&db, limit).await?;
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply pending migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

async fn cmd_crawl<S: SongStore>(
    config: CrawlerConfig,
    request: CrawlRequest,
    store: S,
    interval: Duration,
) -> Result<CrawlJob> {
    let fetcher = ReqwestFetcher::from_config(&config)?;
    let crawler = Crawler::new(config, fetcher, StructuredDataParser::new(), store);
    crawler.spawn_maintenance();

    let job = crawler.start_job(request)?;
    tracing::info!(job_id = %job.id, "{}", job.message);

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    let finished = loop {
        tokio::select! {
            finished = crawler.wait() => break finished,
            _ = ticker.tick() => {
                let snapshot = crawler.progress();
                eprintln!(
                    "[{:>3}%] {}/{} {}",
                    snapshot.progress, snapshot.current, snapshot.total, snapshot.message
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, stopping crawl");
                crawler.stop_job();
            }
        }
    };

    crawler.shutdown();
    finished.context("Crawl job vanished before completing")
}

fn print_summary(job: &CrawlJob) -> Result<()> {
    eprintln!(
        "Job {} {}: {} saved, {} duplicates, {} errors, {} pages ({})",
        job.id,
        job.status,
        job.success_count,
        job.duplicate_count,
        job.error_count,
        job.pages_fetched,
        job.message
    );
    if job.status != JobStatus::Completed {
        anyhow::bail!("Crawl ended with status {}: {}", job.status, job.message);
    }
    Ok(())
}

async fn cmd_test(config: CrawlerConfig) -> Result<()> {
    let fetcher = ReqwestFetcher::from_config(&config)?;
    let crawler = Crawler::new(
        config,
        fetcher,
        StructuredDataParser::new(),
        MemoryCatalog::new(),
    );

    let report = crawler.probe().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.reachable {
        anyhow::bail!("{} is not reachable: {}", report.url, report.message);
    }
    Ok(())
}

async fn cmd_recent(db: &Database, limit: usize) -> Result<()> {
    let repo = db.song_repo();
    let songs = repo.recent(limit).await?;
    let total = repo.count().await?;

    if songs.is_empty() {
        println!("The catalog is empty");
        return Ok(());
    }

    println!("Most recent songs ({} of {} in catalog):\n", songs.len(), total);
    for song in &songs {
        let album = song.album.as_deref().unwrap_or("-");
        println!(
            "  {} | {} | {} | {} ({})",
            song.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            song.artist,
            song.title,
            album,
            song.id,
        );
    }

    Ok(())
}
