//! HRRR imagery browser CLI.
//!
//! Drives the browser from a terminal:
//! - `url`: print the tile-service URL for a selection
//! - `availability`: check which hours of a day have data
//! - `fetch`: write one frame to disk
//! - `browse`: line-driven session with the same event wiring as the map UI
//! - `layers`: list layers and their legends

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use hrrr_common::time::{format_local_date, format_local_hour, parse_local_date};
use hrrr_common::{BoundingBox, LayerRegistry, LegendConfig, DEFAULT_LAYER, HRRR_CONUS_BBOX};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use hrrr_browser::config::DEFAULT_TILE_SERVICE_URL;
use hrrr_browser::{
    AvailabilityCache, BrowserApp, BrowserConfig, CacheScope, DisplayOutcome, FileOverlay,
    HttpImageSource, ImageSource, NavigationHistory, Selection, Status,
    UiEvent,
};

#[derive(Parser, Debug)]
#[command(name = "hrrr-browser")]
#[command(about = "Browse NOAA HRRR reflectivity and smoke imagery")]
struct Args {
    /// Tile-rendering service base URL
    #[arg(long, env = "TITILER_BASE_URL", default_value = DEFAULT_TILE_SERVICE_URL)]
    tile_service_url: String,

    /// Overlay bounding box "minlon,minlat,maxlon,maxlat" (default: HRRR CONUS)
    #[arg(long, env = "HRRR_BBOX")]
    bbox: Option<String>,

    /// IANA timezone for dates and hours (default: host timezone)
    #[arg(long, env = "HRRR_TIMEZONE")]
    timezone: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Number of most recent hours to wait for while warming
    #[arg(long, default_value = "5")]
    prefetch_gate: usize,

    /// Maximum warm-up wait in seconds
    #[arg(long, default_value = "5")]
    prefetch_timeout_secs: u64,

    /// Delay before a displayed image is released, in milliseconds
    #[arg(long, default_value = "1000")]
    release_delay_ms: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the image URL for a date, hour and layer
    Url {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Hour (0-23)
        #[arg(long, default_value = "0")]
        hour: u32,

        /// Layer key
        #[arg(short, long, default_value = DEFAULT_LAYER)]
        layer: String,

        /// Treat date and hour as UTC instead of local
        #[arg(long)]
        utc: bool,
    },

    /// Check which hours of a day have imagery
    Availability {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Layer key
        #[arg(short, long, default_value = DEFAULT_LAYER)]
        layer: String,

        /// Keep waiting after the gate until every request has finished
        #[arg(long)]
        wait_all: bool,
    },

    /// Fetch one frame and write it to a file
    Fetch {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Hour (0-23, default: most recent available)
        #[arg(long)]
        hour: Option<u32>,

        /// Layer key
        #[arg(short, long, default_value = DEFAULT_LAYER)]
        layer: String,

        /// Output PNG path
        #[arg(short, long, default_value = "hrrr.png")]
        output: PathBuf,
    },

    /// Interactive session reading commands from stdin
    Browse {
        /// Initial query string, e.g. "?date=2024-03-10&hour=5&layer=MASSDEN"
        #[arg(short, long, default_value = "")]
        query: String,

        /// File the current frame is written to
        #[arg(short, long, default_value = "hrrr.png")]
        output: PathBuf,
    },

    /// List available layers
    Layers,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    let bbox = match &args.bbox {
        Some(value) => BoundingBox::parse(value).context("Invalid --bbox")?,
        None => HRRR_CONUS_BBOX,
    };

    let config = BrowserConfig {
        tile_service_url: args.tile_service_url.clone(),
        bbox,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        prefetch_gate: args.prefetch_gate,
        prefetch_timeout: Duration::from_secs(args.prefetch_timeout_secs),
        release_delay: Duration::from_millis(args.release_delay_ms),
        timezone: args.timezone.clone(),
        log_level: args.log_level.clone(),
    };
    config.validate().context("Invalid configuration")?;

    match args.command {
        Commands::Url {
            date,
            hour,
            layer,
            utc,
        } => print_url(&config, date, hour, &layer, utc),
        Commands::Availability {
            date,
            layer,
            wait_all,
        } => check_availability(&config, date, &layer, wait_all).await,
        Commands::Fetch {
            date,
            hour,
            layer,
            output,
        } => fetch_frame(&config, date, hour, &layer, output).await,
        Commands::Browse { query, output } => browse(&config, &query, output).await,
        Commands::Layers => {
            list_layers();
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn http_source(config: &BrowserConfig) -> Result<Arc<dyn ImageSource>> {
    Ok(Arc::new(HttpImageSource::new(config.request_timeout)?))
}

fn resolve_date(config: &BrowserConfig, date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(d) => Ok(parse_local_date(&d)?),
        None => Ok(config.converter()?.today()),
    }
}

fn print_url(
    config: &BrowserConfig,
    date: Option<String>,
    hour: u32,
    layer: &str,
    utc: bool,
) -> Result<()> {
    let date = resolve_date(config, date)?;
    let converter = config.converter()?;
    let slot = if utc {
        hrrr_common::UtcSlot::new(date, hour)?
    } else {
        converter.local_to_utc(date, hour)?
    };

    let builder = config.url_builder(Arc::new(LayerRegistry::builtin().clone()));
    let url = builder
        .for_slot(&slot, layer)
        .context("Could not generate image URL")?;

    info!(slot = %slot, layer = %layer, "Built image URL");
    println!("{}", url);
    Ok(())
}

async fn check_availability(
    config: &BrowserConfig,
    date: Option<String>,
    layer: &str,
    wait_all: bool,
) -> Result<()> {
    let date = resolve_date(config, date)?;
    let converter = config.converter()?;
    let layers = Arc::new(LayerRegistry::builtin().clone());
    let layer = layers.resolve(layer).id.clone();

    let builder = config.url_builder(layers);
    let cache = AvailabilityCache::new(config.warm_config());
    let scope = CacheScope::new(date, layer.clone());

    let report = cache
        .warm(http_source(config)?, &builder, &converter, scope)
        .await;
    println!(
        "{} {}: {} hours after {} ms (gate {})",
        format_local_date(date),
        layer,
        report.available.len(),
        report.elapsed.as_millis(),
        if report.gate_completed { "completed" } else { "timed out" }
    );

    if wait_all {
        // detached requests finish within the request timeout
        tokio::time::sleep(config.request_timeout).await;
    }

    for hour in cache.hours().await {
        let slot = converter.local_to_utc(date, hour)?;
        println!(
            "  {} {}  <-  {}",
            format_local_hour(hour),
            converter.abbreviation(),
            slot
        );
    }
    Ok(())
}

async fn fetch_frame(
    config: &BrowserConfig,
    date: Option<String>,
    hour: Option<u32>,
    layer: &str,
    output: PathBuf,
) -> Result<()> {
    let date = resolve_date(config, date)?;
    let mut query = format!(
        "?date={}&layer={}",
        format_local_date(date),
        urlencoding::encode(layer)
    );
    if let Some(hour) = hour {
        query.push_str(&format!("&hour={}", hour));
    }

    let mut app = BrowserApp::new(
        config,
        http_source(config)?,
        Box::new(FileOverlay::new(&output)),
        Box::new(NavigationHistory::new()),
    )?;
    app.start(&query).await;

    match app.settle().await {
        Some(outcome) if outcome.is_applied() => {
            println!("{} -> {}", describe(&app), output.display());
            Ok(())
        }
        Some(DisplayOutcome::Failed(e)) => Err(e).context("Failed to fetch frame"),
        other => anyhow::bail!("No frame written: {:?}", other),
    }
}

async fn browse(config: &BrowserConfig, query: &str, output: PathBuf) -> Result<()> {
    let mut app = BrowserApp::new(
        config,
        http_source(config)?,
        Box::new(FileOverlay::new(&output)),
        Box::new(NavigationHistory::new()),
    )?;

    app.start(query).await;
    report(&mut app).await;
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let arg = parts.next();

        match (command, arg) {
            ("quit" | "exit" | "q", _) => break,
            ("help" | "?", _) => print_help(),
            ("date", Some(value)) => match parse_local_date(value) {
                Ok(date) => app.handle(UiEvent::DateChanged(date)).await,
                Err(e) => println!("{}", e),
            },
            ("hour", Some(value)) => match value.parse::<u32>() {
                Ok(hour) if hour <= 23 => app.handle(UiEvent::HourChanged(hour)).await,
                _ => println!("hour must be 0-23"),
            },
            ("layer", Some(value)) => app.handle(UiEvent::LayerChanged(value.to_string())).await,
            ("refresh", _) => app.handle(UiEvent::Refresh).await,
            ("back", _) => {
                if !app.go_back().await {
                    println!("no earlier entry");
                    continue;
                }
            }
            ("forward", _) => {
                if !app.go_forward().await {
                    println!("no later entry");
                    continue;
                }
            }
            ("hours", _) => {
                println!("{:?}", app.available_hours().await);
                continue;
            }
            ("url", _) => {
                println!("{}", app.image_url().unwrap_or_default());
                continue;
            }
            ("legend", _) => {
                print_legend(app.legend());
                continue;
            }
            ("status", _) => {
                println!("{}  [{}]", describe(&app), app.history().current().unwrap_or(""));
                continue;
            }
            _ => {
                println!("unknown command: {}", line.trim());
                continue;
            }
        }
        report(&mut app).await;
    }

    Ok(())
}

async fn report(app: &mut BrowserApp) {
    let outcome = app.settle().await;
    match app.status() {
        Status::Error(message) => println!("{}", message),
        Status::Loading(message) => println!("{}", message),
        Status::Idle => match outcome {
            Some(outcome) if outcome.is_applied() => println!("{}", describe(app)),
            _ => println!("{} (not displayed)", describe(app)),
        },
    }
}

fn describe(app: &BrowserApp) -> String {
    let selection: &Selection = app.selection();
    let slot = app
        .current_slot()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| "-".to_string());
    format!(
        "{} {} {} {} ({})",
        format_local_date(selection.date),
        format_local_hour(selection.hour),
        app.converter().abbreviation(),
        selection.layer,
        slot
    )
}

fn print_help() {
    println!("commands: date YYYY-MM-DD | hour N | layer KEY | refresh | back | forward");
    println!("          hours | url | legend | status | help | quit");
}

fn list_layers() {
    for layer in LayerRegistry::builtin().iter() {
        println!("{:<14} band {:<3} {}", layer.id, layer.band, layer.name);
        print_legend(LegendConfig::for_layer(layer).as_ref());
    }
}

fn print_legend(legend: Option<&LegendConfig>) {
    if let Some(legend) = legend {
        println!(
            "  {} {}  [{} .. {}]",
            legend.title, legend.units, legend.min_label, legend.max_label
        );
        println!("  {}", legend.css_gradient());
    }
}
