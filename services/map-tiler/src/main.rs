//! Map tiler.
//!
//! Serves map renders through the zoom-level tile cache and writes them as
//! PNG files. Runs either over a georeferenced PNG or a synthetic gradient,
//! and can repeat the same requests to show cache behaviour.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use image::RgbaImage;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use map_cache::{CachingMapSource, MapCacheConfig, MapRequest, MapSource, MapsRequest};
use map_common::time::parse_iso8601;
use map_common::{BoundingBox, CrsCode};
use map_tiler::{GradientSource, ImageFileSource};

#[derive(Parser, Debug)]
#[command(name = "map-tiler")]
#[command(about = "Render maps through the zoom-level tile cache")]
struct Args {
    /// Georeferenced PNG to serve (synthetic gradient when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Extent of the source data as "minx,miny,maxx,maxy"
    #[arg(long, default_value = "-20037508.342789244,-20037508.342789244,20037508.342789244,20037508.342789244")]
    extent: String,

    /// Requested bounding box (defaults to the full extent)
    #[arg(short, long)]
    bbox: Option<String>,

    /// Requested CRS
    #[arg(long, default_value = "EPSG:3857")]
    crs: String,

    /// Output width in pixels
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Valid time of the data (RFC 3339)
    #[arg(long, default_value = "2024-03-01T00:00:00Z")]
    time: String,

    /// Number of hourly time steps to render (synthetic source only)
    #[arg(long, default_value_t = 1)]
    steps: u32,

    /// Render the same request this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Directory for rendered PNG files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Cached tile width in pixels (overrides MAP_CACHE_IMAGE_WIDTH)
    #[arg(long)]
    tile_width: Option<u32>,

    /// Number of cached zoom levels (overrides MAP_CACHE_ZOOM_LEVELS)
    #[arg(long)]
    zoom_levels: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Tokio worker threads
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        info!("Configuring tokio runtime with {} worker threads", threads);
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads_str) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads_str.parse::<usize>() {
            info!("Configuring tokio runtime with {} worker threads (from env)", threads);
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if args.json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    let mut config = MapCacheConfig::from_env();
    if let Some(width) = args.tile_width {
        config.cached_image_width = width;
    }
    if let Some(levels) = args.zoom_levels {
        config.number_of_cached_zoom_levels = levels;
    }
    config.validate().map_err(|e| anyhow!("invalid cache config: {}", e))?;

    let extent = BoundingBox::from_wms_string(&args.extent).context("invalid --extent")?;
    let bbox = match &args.bbox {
        Some(s) => BoundingBox::from_wms_string(s).context("invalid --bbox")?,
        None => extent,
    };
    let crs = CrsCode::from_wms_string(&args.crs)?;
    let time = parse_iso8601(&args.time)?;

    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("creating {}", args.output.display()))?;

    info!(
        extent = %extent,
        bbox = %bbox,
        width = args.width,
        height = args.height,
        tile_width = config.cached_image_width,
        zoom_levels = config.number_of_cached_zoom_levels,
        "Starting map tiler"
    );

    match &args.input {
        Some(path) => {
            let source = ImageFileSource::new(path, extent, time);
            let source_id = path.display().to_string();
            let maps = CachingMapSource::new(source, config)?;
            let request = MapRequest::new(source_id, time, bbox, args.width, args.height).with_crs(crs);
            render_repeated(&maps, &request, &args).await?;
            report(&maps);
        }
        None => {
            let source = GradientSource::new(extent, time, args.steps.max(1));
            let maps = CachingMapSource::new(source, config)?;
            if args.steps > 1 {
                render_time_series(&maps, bbox, &args).await?;
            } else {
                let request =
                    MapRequest::new("synthetic", time, bbox, args.width, args.height).with_crs(crs);
                render_repeated(&maps, &request, &args).await?;
            }
            report(&maps);
        }
    }

    Ok(())
}

async fn render_repeated<S: MapSource>(
    maps: &CachingMapSource<S>,
    request: &MapRequest,
    args: &Args,
) -> Result<()> {
    for pass in 0..args.repeat.max(1) {
        let started = std::time::Instant::now();
        let image = maps.get_map(request).await?;
        info!(
            pass = pass,
            elapsed_ms = started.elapsed().as_millis() as u64,
            renders = maps.stats().renders,
            "Rendered map"
        );

        if pass == 0 {
            save_png(image, &args.output.join("map.png")).await?;
        }
    }
    Ok(())
}

async fn render_time_series<S: MapSource>(
    maps: &CachingMapSource<S>,
    bbox: BoundingBox,
    args: &Args,
) -> Result<()> {
    let times = maps.get_date_times("synthetic").await?;
    let time_steps: BTreeMap<DateTime<Utc>, String> = times
        .into_iter()
        .map(|t| (t, "synthetic".to_string()))
        .collect();

    let started = std::time::Instant::now();
    let images = maps
        .get_maps(&MapsRequest {
            style: String::new(),
            bbox,
            width: args.width,
            height: args.height,
            time_steps,
            item: None,
            parameters: BTreeMap::new(),
        })
        .await?;

    info!(
        steps = images.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Rendered time series"
    );

    for (time, image) in images {
        let name = format!("map_{}.png", time.format("%Y%m%dT%H%MZ"));
        save_png(image, &args.output.join(name)).await?;
    }
    Ok(())
}

async fn save_png(image: RgbaImage, path: &Path) -> Result<()> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || image.save(&target))
        .await?
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Wrote map");
    Ok(())
}

fn report<S: MapSource>(maps: &CachingMapSource<S>) {
    let stats = maps.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        coalesced = stats.coalesced,
        renders = stats.renders,
        discarded = stats.discarded,
        entries = stats.entry_count,
        hit_rate = stats.hit_rate(),
        "Tile cache statistics"
    );

    if let Ok(json) = serde_json::to_string_pretty(&stats) {
        println!("{}", json);
    }
}
