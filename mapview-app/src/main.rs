use anyhow::Context;
use clap::Parser;
use mapview::prelude::*;
use std::path::PathBuf;

const LOAD_DEADLINE: Duration = Duration::from_secs(20);

/// Headless map viewer: loads the grid around the configured center, pans
/// and zooms once and logs what it fetched.
#[derive(Parser, Debug)]
#[command(name = "mapview-app", about = "Load, pan and zoom a tile map without a window")]
struct Args {
    /// JSON configuration file (defaults are used when omitted)
    config: Option<PathBuf>,

    /// View-port width in pixels
    #[arg(long, default_value = "800")]
    width: u32,

    /// View-port height in pixels
    #[arg(long, default_value = "600")]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MapViewConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => MapViewConfig::default(),
    };

    let mut map = MapImage::with_http(config).context("creating map")?;
    let repaint = map.repaint_receiver();
    map.set_viewport(args.width, args.height);
    wait_until_loaded(&map, &repaint);
    log_summary("initial", &map);

    let center = map.rects().center();
    map.begin_pan(center);
    map.drag_to(Point::new(center.x - 300.0, center.y + 120.0));
    map.end_interaction();
    wait_until_loaded(&map, &repaint);
    log_summary("after pan", &map);

    map.wheel_zoom(center, 4.0);
    wait_until_loaded(&map, &repaint);
    log_summary("after zoom", &map);

    if let Some(fault) = map.loader_fault() {
        anyhow::bail!("tile loader faulted: {}", fault);
    }
    Ok(())
}

fn wait_until_loaded(map: &MapImage, repaint: &RepaintReceiver) {
    let deadline = Instant::now() + LOAD_DEADLINE;
    while !map.is_fully_loaded() {
        let now = Instant::now();
        if now >= deadline {
            log::warn!("Gave up waiting for tiles after {:?}", LOAD_DEADLINE);
            return;
        }
        repaint.wait(deadline - now);
    }
}

fn log_summary(stage: &str, map: &MapImage) {
    let tiles = map.snapshot_tiles();
    let loaded = tiles.iter().filter(|t| t.bitmap().is_some()).count();
    let empty = tiles.iter().filter(|t| t.is_empty_placeholder()).count();
    let center = map
        .map_center()
        .map(|c| c.formatted())
        .unwrap_or_else(|| "-".to_string());

    log::info!(
        "{}: zoom {} center {} | {} tiles, {} with image, {} outside the world, loader {}",
        stage,
        map.zoom_level(),
        center,
        tiles.len(),
        loaded,
        empty,
        map.loader_state()
    );
    for tile in tiles.iter().filter(|t| !t.is_valid()) {
        log::debug!("Missing {}", tile);
    }
}
