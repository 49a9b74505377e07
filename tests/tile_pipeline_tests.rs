//! End-to-end behaviour of a tile layer against a scripted transport.

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tilelook::prelude::*;
use tilelook::MapError;
use tokio::sync::Semaphore;

const HALIFAX: (f64, f64) = (44.6436, -63.6009);

fn halifax(width: u32, height: u32) -> Viewport {
    Viewport::centered(LatLng::new(HALIFAX.0, HALIFAX.1), 14, width, height)
}

fn png_bytes(shade: u8) -> Vec<u8> {
    let tile = TileImage::from_pixel(256, 256, image::Rgba([shade, shade, shade, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(tile)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Transport that serves a fixed PNG, counts requests per URL and can be
/// held shut or switched to failing.
struct MockTransport {
    body: Vec<u8>,
    requests: Mutex<HashMap<String, usize>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    failing: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            body: png_bytes(200),
            requests: Mutex::new(HashMap::default()),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            gate: None,
        }
    }

    /// Every request waits for a permit on `gate` before answering
    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().values().sum()
    }

    fn max_requests_per_url(&self) -> usize {
        self.requests.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileTransport for MockTransport {
    async fn fetch(&self, url: &str) -> tilelook::Result<Vec<u8>> {
        *self
            .requests
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        } else {
            tokio::task::yield_now().await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            Err(MapError::HttpStatus {
                status: 503,
                url: url.to_string(),
            })
        } else {
            Ok(self.body.clone())
        }
    }
}

/// Source with one mirror so URLs map one-to-one to coordinates
fn single_mirror() -> Arc<dyn TileSource> {
    Arc::new(TemplateSource::new(
        "http://tiles.test/{z}/{x}/{y}.png",
        Vec::new(),
    ))
}

fn build_layer(transport: Arc<MockTransport>, config: TileLoadingConfig) -> TileLayer {
    TileLayer::builder()
        .config(config)
        .source(single_mirror())
        .transport(transport)
        .build()
        .unwrap()
}

fn counting_observer(layer: &TileLayer) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&count);
    layer.register_observer(Arc::new(move || {
        observed.fetch_add(1, Ordering::SeqCst);
    }));
    count
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_halifax_window_fetches_four_tiles() {
    let transport = Arc::new(MockTransport::new());
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());
    let invalidations = counting_observer(&layer);

    layer.on_viewport_changed(halifax(256, 256));
    wait_until("idle layer", || layer.is_idle()).await;

    assert_eq!(transport.total_requests(), 4);
    assert_eq!(transport.max_requests_per_url(), 1);
    assert!(invalidations.load(Ordering::SeqCst) >= 1);

    let tiles = layer.current_tiles_and_offsets(256, 256);
    assert_eq!(tiles.len(), 4);
    assert!(tiles.iter().all(|t| t.image.is_some()));
    let center = tiles
        .iter()
        .find(|t| t.coord == TileCoord::new(5297, 5916, 14))
        .unwrap();
    assert_eq!(center.offset, (12, -27));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submits_fetch_once() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(MockTransport::gated(Arc::clone(&gate)));
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());
    let loader = Arc::clone(layer.loader());
    let coord = TileCoord::new(5297, 5916, 14);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let loader = Arc::clone(&loader);
        tasks.push(tokio::spawn(async move { loader.submit_fetch(coord).is_some() }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    gate.add_permits(1);
    wait_until("tile ready", || layer.cache().lookup(&coord).is_ready()).await;
    assert_eq!(transport.total_requests(), 1);
    assert!(loader.submit_fetch(coord).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_fetch_is_retryable_and_silent() {
    let transport = Arc::new(MockTransport::new());
    transport.set_failing(true);
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());
    let invalidations = counting_observer(&layer);
    let viewport = halifax(256, 256);

    layer.on_viewport_changed(viewport);
    wait_until("idle layer", || layer.is_idle()).await;

    // The completed scan itself notifies once; failures add nothing
    assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    assert!(layer.cache().is_empty());
    assert!(layer
        .current_tiles_and_offsets(256, 256)
        .iter()
        .all(|t| t.image.is_none()));

    transport.set_failing(false);
    layer.acknowledge_invalidation();
    assert!(layer.update_viewport(viewport, true));
    wait_until("idle layer", || layer.is_idle()).await;

    assert_eq!(transport.total_requests(), 8);
    assert_eq!(layer.cache().stats().ready, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bound_is_respected() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(MockTransport::gated(Arc::clone(&gate)));
    let config = TileLoadingConfig {
        max_concurrent_fetches: 3,
        ..TileLoadingConfig::for_testing()
    };
    let layer = build_layer(Arc::clone(&transport), config);

    let viewport = halifax(1024, 1024);
    let expected = viewport.visible_tiles().len();
    assert!(expected > 3);
    layer.on_viewport_changed(viewport);

    wait_until("pool saturated", || transport.total_requests() == 3).await;
    wait_until("scan finished", || {
        layer.coordinator().state() == CoordinatorState::Idle
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.total_requests(), 3);
    assert_eq!(layer.loader().outstanding(), expected);

    gate.add_permits(expected);
    wait_until("idle layer", || layer.is_idle()).await;
    assert_eq!(transport.total_requests(), expected);
    assert!(transport.peak_running() <= 3);
    assert_eq!(layer.cache().stats().ready, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_latest_viewport_wins() {
    let transport = Arc::new(MockTransport::new());
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());

    let v1 = halifax(600, 600);
    let v2 = v1.panned_by(400.0, 0.0);
    let v3 = v2.zoomed_by(1);
    layer.on_viewport_changed(v1);
    layer.on_viewport_changed(v2);
    layer.on_viewport_changed(v3);

    assert_eq!(layer.current_viewport(), Some(v3));
    wait_until("idle layer", || layer.is_idle()).await;

    assert_eq!(layer.coordinator().last_completed_viewport(), Some(v3));
    assert_eq!(layer.coordinator().generation(), 3);
    for placement in v3.visible_tiles().iter() {
        assert!(layer.cache().lookup(&placement.coord).is_ready());
    }
    assert_eq!(transport.max_requests_per_url(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_pan_fetches_only_new_tiles() {
    let transport = Arc::new(MockTransport::new());
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());

    let first = halifax(600, 600);
    layer.on_viewport_changed(first);
    wait_until("idle layer", || layer.is_idle()).await;
    let after_first = transport.total_requests();

    let second = first.panned_by(256.0, 0.0);
    let new_tiles = second
        .visible_tiles()
        .coords()
        .filter(|c| !first.visible_tiles().coords().any(|f| f == *c))
        .count();
    layer.on_viewport_changed(second);
    wait_until("idle layer", || layer.is_idle()).await;

    assert_eq!(transport.total_requests(), after_first + new_tiles);
    assert_eq!(transport.max_requests_per_url(), 1);
    assert!(!layer.update_viewport(second, false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_viewport_change_can_cancel_queued_fetches() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(MockTransport::gated(Arc::clone(&gate)));
    let config = TileLoadingConfig {
        max_concurrent_fetches: 1,
        cancel_queued_fetches_on_viewport_change: true,
        ..TileLoadingConfig::for_testing()
    };
    let layer = build_layer(Arc::clone(&transport), config);

    let first = halifax(256, 256);
    layer.on_viewport_changed(first);
    wait_until("first fetch running", || transport.total_requests() == 1).await;
    wait_until("scan finished", || {
        layer.coordinator().state() == CoordinatorState::Idle
    })
    .await;

    // Far away, so nothing overlaps the first window
    let second = Viewport::centered(LatLng::new(0.0, 0.0), 14, 256, 256);
    layer.on_viewport_changed(second);

    gate.add_permits(64);
    wait_until("idle layer", || layer.is_idle()).await;

    let stats = layer.cache().stats();
    assert_eq!(stats.pending, 0);
    // The running fetch finished; the three queued ones were dropped
    assert_eq!(stats.ready, 1 + second.visible_tiles().len());
    assert_eq!(
        transport.total_requests(),
        1 + second.visible_tiles().len()
    );

    // Dropped tiles can be claimed again by a later scan
    layer.on_viewport_changed(first);
    wait_until("idle layer", || layer.is_idle()).await;
    for coord in first.visible_tiles().coords() {
        assert!(layer.cache().lookup(&coord).is_ready());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_decoder_releases_claim() {
    struct Exploding;
    impl TileDecoder for Exploding {
        fn decode(&self, _bytes: &[u8]) -> tilelook::Result<TileImage> {
            panic!("corrupt tile");
        }
    }

    let transport = Arc::new(MockTransport::new());
    let layer = TileLayer::builder()
        .config(TileLoadingConfig::for_testing())
        .source(single_mirror())
        .transport(transport)
        .decoder(Arc::new(Exploding))
        .build()
        .unwrap();

    let coord = TileCoord::new(5297, 5916, 14);
    assert!(layer.loader().submit_fetch(coord).is_some());
    wait_until("idle layer", || layer.is_idle()).await;
    assert!(layer.cache().lookup(&coord).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_observer_swap_and_acknowledge() {
    let transport = Arc::new(MockTransport::new());
    let layer = build_layer(transport, TileLoadingConfig::for_testing());

    let first = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&first);
    let first_id = layer.register_observer(Arc::new(move || {
        observed.fetch_add(1, Ordering::SeqCst);
    }));
    let second = counting_observer(&layer);
    assert!(!layer.unregister_observer(first_id));

    layer.on_viewport_changed(halifax(256, 256));
    wait_until("idle layer", || layer.is_idle()).await;

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert!(second.load(Ordering::SeqCst) >= 1);
    assert!(layer.acknowledge_invalidation());
    assert!(!layer.acknowledge_invalidation());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_superseded_scan_keeps_its_fetches() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(MockTransport::gated(Arc::clone(&gate)));
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());

    // A scan for the first window that a newer viewport cuts short after
    // three tiles
    let first = halifax(600, 600);
    let checks = AtomicUsize::new(0);
    let outcome = tilelook::layers::coordinator::scan_viewport(layer.loader(), &first, || {
        checks.fetch_add(1, Ordering::SeqCst) < 3
    });
    assert_eq!(
        outcome,
        tilelook::layers::coordinator::ScanOutcome::Superseded { submitted: 3 }
    );
    let submitted: Vec<TileCoord> = first.visible_tiles().coords().take(3).collect();

    // Far away, so the second window shares no tile with the first
    let second = Viewport::centered(LatLng::new(0.0, 0.0), 14, 256, 256);
    layer.on_viewport_changed(second);
    wait_until("second scan finished", || {
        layer.coordinator().state() == CoordinatorState::Idle
    })
    .await;
    for coord in &submitted {
        assert!(layer.cache().lookup(coord).is_pending());
    }

    gate.add_permits(64);
    wait_until("idle layer", || layer.is_idle()).await;

    for coord in &submitted {
        assert!(layer.cache().lookup(coord).is_ready(), "{} never landed", coord);
    }
    assert_eq!(transport.max_requests_per_url(), 1);
    assert_eq!(
        transport.total_requests(),
        submitted.len() + second.visible_tiles().len()
    );
    assert_eq!(layer.cache().stats().pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_changes_finish_every_submitted_fetch() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(MockTransport::gated(Arc::clone(&gate)));
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());

    let v1 = halifax(600, 600);
    let v2 = v1.panned_by(-700.0, 300.0);
    let v3 = v2.zoomed_by(2);
    layer.on_viewport_changed(v1);
    layer.on_viewport_changed(v2);
    layer.on_viewport_changed(v3);
    wait_until("scans finished", || {
        layer.coordinator().state() == CoordinatorState::Idle
    })
    .await;

    gate.add_permits(256);
    wait_until("idle layer", || layer.is_idle()).await;

    // Whatever the superseded scans submitted ran to completion
    let stats = layer.cache().stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.ready, transport.total_requests());
    assert_eq!(transport.max_requests_per_url(), 1);
    assert_eq!(layer.coordinator().last_completed_viewport(), Some(v3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_out_of_range_zoom_does_not_stall_the_layer() {
    let transport = Arc::new(MockTransport::new());
    let layer = build_layer(Arc::clone(&transport), TileLoadingConfig::for_testing());

    let broken = Viewport {
        zoom: 64,
        ..halifax(256, 256)
    };
    layer.on_viewport_changed(broken);
    wait_until("idle layer", || layer.is_idle()).await;
    assert_eq!(transport.total_requests(), 0);

    let viewport = halifax(256, 256);
    layer.on_viewport_changed(viewport);
    wait_until("idle layer", || layer.is_idle()).await;

    assert_eq!(layer.coordinator().last_completed_viewport(), Some(viewport));
    assert_eq!(transport.total_requests(), 4);
    assert_eq!(layer.cache().stats().ready, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_source_releases_claim() {
    struct Exploding;
    impl TileSource for Exploding {
        fn url(&self, _coord: TileCoord) -> String {
            panic!("no url for this tile");
        }
    }

    let transport = Arc::new(MockTransport::new());
    let layer = TileLayer::builder()
        .config(TileLoadingConfig::for_testing())
        .source(Arc::new(Exploding))
        .transport(Arc::clone(&transport) as Arc<dyn TileTransport>)
        .build()
        .unwrap();

    let coord = TileCoord::new(5297, 5916, 14);
    assert!(layer.loader().submit_fetch(coord).is_some());
    wait_until("idle layer", || layer.is_idle()).await;

    assert!(layer.cache().lookup(&coord).is_empty());
    assert_eq!(transport.total_requests(), 0);
    assert!(layer.loader().submit_fetch(coord).is_some());
}
