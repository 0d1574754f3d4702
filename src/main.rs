use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unsplash_cache::{CacheRecord, CacheStatus, Config, RefillOutcome, UnsplashImageCache};

#[derive(Parser)]
#[command(name = "unsplash-cache")]
#[command(version)]
#[command(about = "Keep a local cache of Unsplash images topped up and hand them out unseen-first")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level (defaults to debug when debug_logging is set, info otherwise)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and download new images unless enough unseen ones are cached
    Refill {
        /// Number of candidates to request
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Select the next unseen image
    Next {
        /// Write the image here
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Center-crop to WIDTHxHEIGHT, written as PNG
        #[arg(long, value_name = "WxH", value_parser = parse_dimensions)]
        crop: Option<(u32, u32)>,
    },
    /// Print every ledger record
    List,
    /// Print record counts
    Stats,
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width
        .trim()
        .parse()
        .map_err(|e| format!("invalid width '{width}': {e}"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|e| format!("invalid height '{height}': {e}"))?;
    Ok((width, height))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    let default_level = if config.debug_logging { "debug" } else { "info" };
    let level = cli.log_level.unwrap_or_else(|| default_level.to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("unsplash_cache={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Configuration loaded from: {}", cli.config);
    info!("Using database: {}", config.database.url);

    let cache = UnsplashImageCache::new(config).await?;

    match cli.command {
        Command::Refill { count } => refill(&cache, count).await,
        Command::Next { output, crop } => next(&cache, output, crop).await,
        Command::List => list(&cache).await,
        Command::Stats => {
            let stats = cache.stats().await?;
            println!("records:           {}", stats.records);
            println!("downloaded:        {}", stats.downloaded);
            println!("downloaded unseen: {}", stats.downloaded_unseen);
            Ok(())
        }
    }
}

async fn refill(cache: &UnsplashImageCache, count: Option<usize>) -> Result<()> {
    let mut events = cache.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let CacheStatus::Requesting { path } = &event {
                info!("Requesting {}", path);
            }
            if event.is_terminal() {
                println!("{event}");
                break;
            }
        }
    });

    let outcome = cache.spawn_pre_cache(count).await?;
    printer.await?;

    if matches!(outcome, RefillOutcome::Failed) {
        bail!("refill failed, see log for details");
    }
    Ok(())
}

async fn next(
    cache: &UnsplashImageCache,
    output: Option<PathBuf>,
    crop: Option<(u32, u32)>,
) -> Result<()> {
    let (bytes, record) = match crop {
        Some((width, height)) => {
            let Some((image, record)) = cache.next_unseen_cropped(width, height).await else {
                warn!("No image available at {}x{}", width, height);
                return Ok(());
            };
            let mut buffer = Cursor::new(Vec::new());
            image
                .write_to(&mut buffer, ImageFormat::Png)
                .context("Failed to encode cropped image")?;
            (buffer.into_inner().into(), record)
        }
        None => match cache.next_unseen().await {
            Some(selection) => selection,
            None => {
                println!("No cached image available, run `refill` first");
                return Ok(());
            }
        },
    };

    if let Some(path) = output {
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {} bytes to {}", bytes.len(), path.display());
    }
    print_attribution(&record);
    Ok(())
}

fn print_attribution(record: &CacheRecord) {
    println!("id:        {}", record.id);
    if let Some(title) = &record.title {
        println!("title:     {title}");
    }
    if let Some(name) = record.publisher_display_name() {
        println!("by:        {name}");
    }
    if let Some(url) = record.image_human_url() {
        println!("photo:     {url}");
    }
    if let Some(url) = record.publisher_human_url() {
        println!("publisher: {url}");
    }
}

async fn list(cache: &UnsplashImageCache) -> Result<()> {
    let records = cache.list_records().await?;
    println!("{} record(s)", records.len());
    for record in records {
        println!(
            "id: {}, downloaded: {}, seen: {}, url: {}, username: {}, name: {}, title: {}",
            record.id,
            record.downloaded,
            record.last_seen,
            record.full_image_url,
            record.publisher_username.as_deref().unwrap_or("-"),
            record.publisher_display_name().as_deref().unwrap_or("-"),
            record.title.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
