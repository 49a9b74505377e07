//! Headless map viewer.
//!
//! Opens a virtual window on a location, replays a scripted sequence of pans
//! and zooms against a live tile layer, redraws whenever the layer
//! invalidates and writes the last frame to a PNG.

use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::{Rgba, RgbaImage};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tilelook::{LatLng, MapError, MapLayer, TileLayer, TileLoadingConfig, Viewport};

const BACKGROUND: Rgba<u8> = Rgba([230, 230, 230, 255]);

/// One scripted user gesture
#[derive(Debug, Clone, Copy)]
enum Step {
    /// Drag by this many pixels
    Pan(f64, f64),
    /// Wheel notches, positive zooms in
    Zoom(i32),
    /// New window size
    Resize(u32, u32),
}

fn parse_step(arg: &str) -> Result<Step, String> {
    let (kind, value) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected KIND:VALUE, got '{}'", arg))?;
    let pair = |value: &str| -> Result<(String, String), String> {
        value
            .split_once(',')
            .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
            .ok_or_else(|| format!("expected two comma separated numbers, got '{}'", value))
    };
    match kind {
        "pan" => {
            let (dx, dy) = pair(value)?;
            Ok(Step::Pan(
                dx.parse().map_err(|e| format!("bad pan dx: {}", e))?,
                dy.parse().map_err(|e| format!("bad pan dy: {}", e))?,
            ))
        }
        "zoom" => Ok(Step::Zoom(
            value.trim().parse().map_err(|e| format!("bad zoom steps: {}", e))?,
        )),
        "resize" => {
            let (w, h) = pair(value)?;
            Ok(Step::Resize(
                w.parse().map_err(|e| format!("bad width: {}", e))?,
                h.parse().map_err(|e| format!("bad height: {}", e))?,
            ))
        }
        other => Err(format!("unknown step '{}', use pan, zoom or resize", other)),
    }
}

#[derive(Parser)]
#[command(name = "tilelook-app")]
#[command(about = "Render an OpenStreetMap view to a PNG", long_about = None)]
struct Args {
    /// Latitude of the window center in decimal degrees
    #[arg(long, default_value = "44.6436", allow_hyphen_values = true)]
    lat: f64,

    /// Longitude of the window center in decimal degrees
    #[arg(long, default_value = "-63.6009", allow_hyphen_values = true)]
    lon: f64,

    /// Initial zoom level (0-19)
    #[arg(long, default_value = "14")]
    zoom: u8,

    /// Window width in pixels
    #[arg(long, default_value = "600")]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value = "600")]
    height: u32,

    /// Where to write the final frame
    #[arg(long, default_value = "tilelook.png")]
    output: String,

    /// JSON file with tile loading settings
    #[arg(long)]
    config: Option<String>,

    /// Gesture to replay, e.g. `pan:120,-40`, `zoom:1`, `resize:800,600`.
    /// Repeatable; runs in order after the initial view is shown.
    #[arg(long = "step", value_parser = parse_step, allow_hyphen_values = true)]
    steps: Vec<Step>,

    /// Pause between gestures in milliseconds
    #[arg(long, default_value = "250")]
    step_delay_ms: u64,

    /// Give up waiting for tiles after this many seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

/// Draws every cached visible tile of `layer` at its offset.
fn compose(layer: &TileLayer, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    for tile in layer.placed_tiles(width, height) {
        if let Some(image) = &tile.image {
            image::imageops::overlay(
                &mut canvas,
                &**image,
                tile.offset.0 as i64,
                tile.offset.1 as i64,
            );
        }
    }
    canvas
}

/// The viewer's event loop: redraws on every invalidation until `done`.
fn render_loop(
    layer: Arc<TileLayer>,
    redraws: Receiver<()>,
    done: Arc<AtomicBool>,
) -> (usize, RgbaImage) {
    let mut frames = 0;
    let size = |layer: &TileLayer| {
        layer
            .current_viewport()
            .map(|v| (v.width, v.height))
            .unwrap_or((0, 0))
    };
    loop {
        match redraws.recv_timeout(Duration::from_millis(100)) {
            Ok(()) => {
                // Drain the burst, then acknowledge before reading the cache
                while redraws.try_recv().is_ok() {}
                layer.acknowledge_invalidation();
                let (width, height) = size(&layer);
                let frame = compose(&layer, width, height);
                frames += 1;
                log::debug!("redraw #{} ({}x{})", frames, frame.width(), frame.height());
            }
            Err(RecvTimeoutError::Timeout) if done.load(Ordering::Acquire) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let (width, height) = size(&layer);
    (frames, compose(&layer, width, height))
}

fn load_config(path: Option<&str>) -> tilelook::Result<TileLoadingConfig> {
    match path {
        Some(path) => {
            log::info!("loading tile settings from {}", path);
            TileLoadingConfig::from_json(&std::fs::read_to_string(path)?)
        }
        None => Ok(TileLoadingConfig::default()),
    }
}

async fn wait_for_tiles(layer: &TileLayer, deadline: Instant) -> bool {
    while !layer.is_idle() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}

async fn run(args: Args) -> tilelook::Result<()> {
    if !LatLng::new(args.lat, args.lon).is_valid() {
        return Err(MapError::Config(format!(
            "{}, {} is not a valid location",
            args.lat, args.lon
        )));
    }

    let config = load_config(args.config.as_deref())?;
    let layer = Arc::new(TileLayer::builder().config(config).build()?);

    let (redraw_tx, redraw_rx) = crossbeam_channel::unbounded();
    layer.register_observer(Arc::new(move || {
        let _ = redraw_tx.send(());
    }));

    let done = Arc::new(AtomicBool::new(false));
    let renderer = {
        let layer = Arc::clone(&layer);
        let done = Arc::clone(&done);
        tokio::task::spawn_blocking(move || render_loop(layer, redraw_rx, done))
    };

    let mut viewport = Viewport::centered(
        LatLng::new(args.lat, args.lon),
        args.zoom,
        args.width,
        args.height,
    );
    log::info!(
        "showing {:.4}, {:.4} at zoom {} in a {}x{} window",
        args.lat,
        args.lon,
        viewport.zoom,
        args.width,
        args.height
    );
    layer.update_bounds(viewport);

    for step in &args.steps {
        tokio::time::sleep(Duration::from_millis(args.step_delay_ms)).await;
        viewport = match *step {
            Step::Pan(dx, dy) => viewport.panned_by(dx, dy),
            Step::Zoom(steps) => viewport.zoomed_by(steps),
            Step::Resize(width, height) => viewport.resized(width, height),
        };
        log::info!("{:?} -> zoom {} centered on {:?}", step, viewport.zoom, viewport.center());
        layer.update_bounds(viewport);
    }

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    tokio::select! {
        settled = wait_for_tiles(&layer, deadline) => {
            if !settled {
                log::warn!("gave up waiting for tiles after {}s", args.timeout_secs);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::warn!("interrupted, writing what is cached so far");
        }
    }

    done.store(true, Ordering::Release);
    let (frames, frame) = renderer
        .await
        .map_err(|e| MapError::Runtime(format!("render loop failed: {}", e)))?;

    frame.save(&args.output)?;

    let stats = layer.cache().stats();
    log::info!(
        "wrote {} after {} redraws ({} tiles cached, {} still loading)",
        args.output,
        frames,
        stats.ready,
        stats.pending
    );
    log::debug!("final viewport: {}", serde_json::to_string(&viewport)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    tilelook::init_logging();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
