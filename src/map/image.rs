//! The grid/viewport manager.
//!
//! [`MapImage`] owns the camera, the viewport rectangles and the shared tile
//! map. Every camera change recomputes which grid cells must exist, creates
//! and evicts tiles accordingly and hands the invalid ones to the
//! [`TileLoader`] as one batch. Loader callbacks merge finished bitmaps back
//! into the shared map and raise the repaint signal.

use crate::core::bounds::Bounds;
use crate::core::config::MapViewConfig;
use crate::core::constants::{HALF_TILE_SIZE, TILE_SIZE};
use crate::core::geo::{GeoCoord, Point, TileNumber};
use crate::core::projection;
use crate::core::viewport::ViewportRects;
use crate::map::grid::{missing_edge_counts, TileGrid};
use crate::map::interaction::{wheel_zoom_factor, Interaction, InteractionState};
use crate::rendering::camera::Camera;
use crate::rendering::repaint::{repaint_channel, RepaintReceiver, RepaintSignal};
use crate::tiles::cache::TileCache;
use crate::tiles::fetch::{TileDecoder, TileFetcher};
use crate::tiles::loader::{FailReason, ListenerId, LoaderError, LoaderState, TileLoader, TileLoaderListener};
use crate::tiles::request::TileRequest;
use crate::tiles::tile::{Bitmap, Tile, TileId};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock(grid: &Mutex<TileGrid>) -> MutexGuard<'_, TileGrid> {
    grid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ties one grid cell to a tile number; every other cell's number follows
/// from its column/row distance to this cell.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    id: TileId,
    number: TileNumber,
}

impl Anchor {
    fn number_of(&self, id: TileId) -> TileNumber {
        self.number.offset(id.column - self.id.column, id.row - self.id.row)
    }
}

/// Brings a tile in line with its current tile number: outside the world it
/// is an empty placeholder, a cached bitmap makes it valid, anything else is
/// left for the loader.
fn classify(tile: &mut Tile, cache: &TileCache) {
    if !tile.tile_number.is_inside_world() {
        tile.mark_empty();
    } else if let Some(bitmap) = cache.get(&tile.tile_number) {
        tile.set_loaded(bitmap);
    } else {
        tile.invalidate();
    }
}

/// Loader listener merging outcomes into the shared tile map.
struct TileSink {
    grid: Arc<Mutex<TileGrid>>,
    cache: TileCache,
    repaint: RepaintSignal,
    log_tiles: bool,
}

impl TileSink {
    fn release(grid: &mut TileGrid, request: &TileRequest) {
        let current = grid
            .in_flight
            .get(&request.tile_id())
            .map_or(false, |r| std::ptr::eq(Arc::as_ptr(r), request));
        if current {
            grid.in_flight.remove(&request.tile_id());
        }
    }
}

impl TileLoaderListener for TileSink {
    fn on_started(&self, tile_id: TileId) {
        if self.log_tiles {
            log::debug!("Tile {} started", tile_id);
        }
    }

    fn on_request_complete(&self, request: &TileRequest, image: Bitmap) {
        let tile_number = request.tile_number();
        self.cache.put(&tile_number, image.clone());

        let applied = {
            let mut grid = lock(&self.grid);
            Self::release(&mut grid, request);
            match grid.tiles.get_mut(&request.tile_id()) {
                Some(tile) if tile.tile_number.approx_eq(&tile_number) => {
                    tile.set_loaded(image);
                    true
                }
                _ => false,
            }
        };

        if applied {
            if self.log_tiles {
                log::debug!("Tile {} loaded {}", request.tile_id(), tile_number);
            }
            self.repaint.request();
        } else if self.log_tiles {
            log::debug!("Ignoring stale image for tile {} {}", request.tile_id(), tile_number);
        }
    }

    fn on_request_failed(&self, request: &TileRequest, reason: FailReason, cause: &str) {
        Self::release(&mut lock(&self.grid), request);
        match reason {
            FailReason::Cancelled => {
                if self.log_tiles {
                    log::debug!("Tile {} cancelled", request.tile_id());
                }
            }
            FailReason::Error => {
                log::error!(
                    "Failed to load tile {} {}: {}",
                    request.tile_id(),
                    request.tile_number(),
                    cause
                );
            }
        }
    }
}

/// A pannable, zoomable map made of 256×256 tiles.
///
/// All mutation goes through `&mut self` on the caller's thread; the tile
/// map itself is shared with the loader's callbacks. Painters wait on
/// [`MapImage::repaint_receiver`] and draw [`MapImage::snapshot_tiles`].
pub struct MapImage {
    config: MapViewConfig,
    rects: ViewportRects,
    camera: Camera,
    initial_camera: Camera,
    zoom_level: u8,
    anchor: Anchor,
    start_center: GeoCoord,
    seeded: bool,
    grid: Arc<Mutex<TileGrid>>,
    loader: TileLoader,
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn TileDecoder>,
    cache: TileCache,
    repaint: RepaintSignal,
    repaint_rx: RepaintReceiver,
    interaction: Interaction,
    loader_fault: Option<LoaderError>,
    listener_id: ListenerId,
}

impl MapImage {
    /// Creates a map centered on `config.grid.center`. Nothing is fetched
    /// before the first [`MapImage::set_viewport`].
    pub fn new(
        config: MapViewConfig,
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn TileDecoder>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let loader = TileLoader::new(config.loader.clone(), config.debug.clone())?;
        let cache = TileCache::new(config.cache_capacity);
        let (repaint, repaint_rx) = repaint_channel();
        let grid = Arc::new(Mutex::new(TileGrid::new()));

        let listener_id = loader.add_listener(Arc::new(TileSink {
            grid: grid.clone(),
            cache: cache.clone(),
            repaint: repaint.clone(),
            log_tiles: config.debug.log_tiles,
        }));

        let zoom_level = config.grid.zoom_level;
        let start_center = config.grid.center;
        log::info!(
            "MapImage at {} zoom {} ({:?})",
            start_center.formatted(),
            zoom_level,
            config.provider.provider
        );

        Ok(Self {
            rects: ViewportRects::default(),
            camera: Camera::identity(),
            initial_camera: Camera::identity(),
            zoom_level,
            anchor: Anchor {
                id: TileId::new(0, 0),
                number: projection::geo_to_tile_number(start_center, zoom_level),
            },
            start_center,
            seeded: false,
            grid,
            loader,
            fetcher,
            decoder,
            cache,
            repaint,
            repaint_rx,
            interaction: Interaction::default(),
            loader_fault: None,
            listener_id,
            config,
        })
    }

    /// Map backed by the HTTP fetcher of `config.provider` and the default
    /// image decoder.
    #[cfg(feature = "http")]
    pub fn with_http(config: MapViewConfig) -> crate::Result<Self> {
        let fetcher =
            crate::tiles::fetch::HttpTileFetcher::new(&config.provider, config.loader.fetch_timeout())?;
        Self::new(
            config,
            Arc::new(fetcher),
            Arc::new(crate::tiles::fetch::ImageDecoder),
        )
    }

    /// Resizes the view port. The first call seeds the grid with one tile
    /// centered in the view.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let grid_config = &self.config.grid;
        self.rects = ViewportRects::new(
            width,
            height,
            grid_config.inner_extension_px,
            grid_config.outer_margin_px,
        );
        log::debug!("View port set to {}x{}", width, height);

        if !self.seeded {
            self.seed();
        }
        self.update_grid();
    }

    fn seed(&mut self) {
        let Some(center) = self.view_center_screen() else {
            log::warn!("Cannot seed tile grid: camera is not invertible");
            return;
        };
        let half = HALF_TILE_SIZE as f64;
        lock(&self.grid).set_origin((
            (center.x - half).round() as i32,
            (center.y - half).round() as i32,
        ));
        self.seeded = true;
        self.anchor_at(self.start_center);
    }

    /// Untransformed screen point under the view-port center.
    fn view_center_screen(&self) -> Option<Point> {
        self.camera.inverse_transform_point(self.rects.center())
    }

    /// Re-anchors the grid so that `geo` lies under the view-port center.
    fn anchor_at(&mut self, geo: GeoCoord) {
        let Some(center) = self.view_center_screen() else {
            return;
        };
        let (id, cell_center) = {
            let grid = lock(&self.grid);
            let id = grid.cell_at(center);
            (id, grid.cell_center(id))
        };

        let size = TILE_SIZE as f64;
        let world = projection::geo_to_world_pixel(geo, self.zoom_level);
        self.anchor = Anchor {
            id,
            number: TileNumber::new(
                (world.x - (center.x - cell_center.x)) / size,
                (world.y - (center.y - cell_center.y)) / size,
                self.zoom_level,
            ),
        };
        if self.config.debug.log_tiles {
            log::debug!("Anchored tile {} at {}", id, self.anchor.number);
        }
    }

    /// Fractional tile number under an untransformed screen point.
    fn tile_number_at(&self, screen: Point) -> TileNumber {
        let cell_center = lock(&self.grid).cell_center(self.anchor.id);
        let size = TILE_SIZE as f64;
        TileNumber::new(
            self.anchor.number.x + (screen.x - cell_center.x) / size,
            self.anchor.number.y + (screen.y - cell_center.y) / size,
            self.zoom_level,
        )
    }

    /// Recomputes the tile grid for the current camera and viewport and
    /// schedules the fetch of every tile that needs one.
    fn update_grid(&mut self) {
        if !self.seeded {
            return;
        }
        let Some(view_center) = self.view_center_screen() else {
            log::warn!("Skipping grid update: camera is not invertible");
            return;
        };

        let grid_arc = Arc::clone(&self.grid);
        let mut grid = lock(&grid_arc);
        let log_tiles = self.config.debug.log_tiles;

        let center_id = grid.cell_at(view_center);
        if center_id != self.anchor.id {
            self.anchor = Anchor {
                id: center_id,
                number: self.anchor.number_of(center_id),
            };
            if log_tiles {
                log::debug!("Center tile moved to {} {}", center_id, self.anchor.number);
            }
        }

        let anchor = self.anchor;
        let mut invalidated = 0;
        for tile in grid.tiles.values_mut() {
            let number = anchor.number_of(tile.id);
            if !tile.tile_number.approx_eq(&number) {
                tile.tile_number = number;
                classify(tile, &self.cache);
                invalidated += usize::from(!tile.is_valid());
            } else if !tile.is_valid() {
                if let Some(bitmap) = self.cache.get(&number) {
                    tile.set_loaded(bitmap);
                }
            }
        }

        // Each pass grows the grid by at most the rounded-down gap, so keep
        // going until nothing new fits.
        let inner = self.rects.inner_extended;
        let outer = grid.cells_covering(&self.camera, &self.rects.outer_extended);
        let mut created = 0;
        loop {
            let required = match grid.cell_range() {
                Some(existing) => {
                    let bounds = grid.bounds(&self.camera);
                    let counts = missing_edge_counts(&bounds, &inner, self.camera.scaled_tile_size());
                    if counts.is_zero() {
                        break;
                    }
                    Some(existing.grown(&counts))
                }
                None => grid.cells_covering(&self.camera, &inner),
            };
            // Cells beyond the outer region would be evicted right away.
            let Some(fill) = required
                .zip(outer)
                .and_then(|(required, outer)| required.intersect(&outer))
            else {
                break;
            };

            let before = created;
            for id in fill.cells() {
                let number = anchor.number_of(id);
                let cache = &self.cache;
                let inserted = grid.insert_cell(id, |x, y| {
                    let mut tile = Tile::new(id, x, y, number);
                    classify(&mut tile, cache);
                    tile
                });
                if inserted {
                    created += 1;
                    if log_tiles {
                        log::debug!("Created tile {} {}", id, number);
                    }
                }
            }
            if created == before {
                break;
            }
        }

        let evicted = grid.evict_outside(&self.camera, &self.rects.outer_extended, self.rects.center());
        for id in &evicted {
            grid.in_flight.remove(id);
            if log_tiles {
                log::debug!("Evicted tile {}", id);
            }
        }

        if created > 0 || !evicted.is_empty() || invalidated > 0 {
            log::debug!(
                "Tile grid: {} tiles ({} created, {} evicted, {} invalidated)",
                grid.len(),
                created,
                evicted.len(),
                invalidated
            );
        }
        drop(grid);

        self.submit_invalid();
        self.repaint.request();
    }

    /// Replaces the running batch with one request per invalid tile, unless
    /// every invalid tile is already being fetched.
    fn submit_invalid(&mut self) {
        if self.loader_fault.is_some() {
            return;
        }

        let requests: Vec<Arc<TileRequest>> = {
            let mut grid = lock(&self.grid);
            let wanted: Vec<(TileId, TileNumber)> = grid
                .tiles()
                .filter(|t| !t.is_valid())
                .map(|t| (t.id, t.tile_number))
                .collect();
            let all_in_flight = wanted.iter().all(|(id, number)| {
                grid.in_flight
                    .get(id)
                    .map_or(false, |r| r.tile_number().approx_eq(number))
            });
            if all_in_flight {
                return;
            }

            let max_retries = self.config.loader.max_retries;
            let retry_delay = self.config.loader.retry_delay();
            let requests: Vec<Arc<TileRequest>> = wanted
                .into_iter()
                .map(|(id, number)| {
                    Arc::new(
                        TileRequest::new(id, number, self.fetcher.clone(), self.decoder.clone())
                            .with_retry_policy(max_retries, retry_delay),
                    )
                })
                .collect();
            grid.in_flight = requests.iter().map(|r| (r.tile_id(), r.clone())).collect();
            requests
        };

        let count = requests.len();
        let result = self
            .loader
            .cancel_all()
            .and_then(|()| self.loader.submit_batch(requests));
        match result {
            Ok(()) => log::debug!("Requested {} tiles", count),
            Err(e) => {
                lock(&self.grid).in_flight.clear();
                match e {
                    LoaderError::Faulted(_) | LoaderError::TerminationTimeout { .. } => {
                        log::error!("Tile loader faulted, no more tiles are requested: {}", e);
                        self.loader_fault = Some(e);
                    }
                    other => log::error!("Unable to request {} tiles: {}", count, other),
                }
            }
        }
    }

    /// Folds an out-of-bounds camera scale into the zoom level. Returns
    /// `true` when the zoom level changed.
    fn check_zoom_fold(&mut self) -> bool {
        let grid_config = &self.config.grid;
        let scale = self.camera.scale();
        let (min_scale, max_scale) = (grid_config.min_scale, grid_config.max_scale);
        let (min_zoom, max_zoom) = (grid_config.min_zoom, grid_config.max_zoom);
        let pivot = self.rects.center();

        let new_zoom = if scale > max_scale {
            if self.zoom_level >= max_zoom {
                self.camera.zoom_about(pivot, max_scale / scale);
                return false;
            }
            self.zoom_level + 1
        } else if scale < min_scale {
            if self.zoom_level <= min_zoom {
                self.camera.zoom_about(pivot, min_scale / scale);
                return false;
            }
            self.zoom_level - 1
        } else {
            return false;
        };

        let Some(center) = self.view_center_screen() else {
            return false;
        };
        let center_geo = self.tile_number_at(center).center();

        self.camera.zoom_about(pivot, 1.0 / scale);
        log::info!("Zoom level {} -> {} at {}", self.zoom_level, new_zoom, center_geo.formatted());
        self.zoom_level = new_zoom;
        self.anchor_at(center_geo);
        true
    }

    /// Starts a pan drag. Ignored while another drag runs.
    pub fn begin_pan(&mut self, press: Point) {
        self.begin(InteractionState::Pan, press);
    }

    /// Starts a zoom drag pivoted at `press`. Ignored while another drag
    /// runs.
    pub fn begin_zoom(&mut self, press: Point) {
        self.begin(InteractionState::Zoom, press);
    }

    fn begin(&mut self, state: InteractionState, press: Point) {
        if self.interaction.state() == InteractionState::Normal {
            self.interaction.begin(state, press, &self.camera);
        }
    }

    /// Moves the running drag to `to`.
    pub fn drag_to(&mut self, to: Point) {
        let Some(camera) = self.interaction.drag(to) else {
            return;
        };
        self.camera = camera;
        if self.check_zoom_fold() {
            self.interaction.rebase(to, &self.camera);
        }
        self.update_grid();
    }

    pub fn end_interaction(&mut self) {
        if self.interaction.end() != InteractionState::Normal {
            self.repaint.request();
        }
    }

    /// Zooms by `1 + rotation / 10` around `at`.
    pub fn wheel_zoom(&mut self, at: Point, rotation: f64) {
        let factor = wheel_zoom_factor(rotation);
        if !(factor > 0.0 && factor.is_finite()) {
            log::warn!("Ignoring wheel rotation {}", rotation);
            return;
        }
        self.camera.zoom_about(at, factor);
        self.check_zoom_fold();
        self.update_grid();
    }

    /// Restores the camera the map started with.
    pub fn reset_view(&mut self) {
        self.camera = self.initial_camera;
        self.update_grid();
    }

    /// Re-requests every invalid tile, including those whose last request
    /// failed.
    pub fn refresh(&mut self) {
        lock(&self.grid).in_flight.clear();
        self.update_grid();
    }

    /// Switches to `zoom_level` (clamped to the configured range) keeping
    /// the map center. Returns the level now in use.
    pub fn set_zoom_level(&mut self, zoom_level: u8) -> u8 {
        let zoom_level = zoom_level.clamp(self.config.grid.min_zoom, self.config.grid.max_zoom);
        if zoom_level == self.zoom_level {
            return zoom_level;
        }
        let center_geo = match self.view_center_screen() {
            Some(center) if self.seeded => self.tile_number_at(center).center(),
            _ => self.start_center,
        };
        log::info!("Zoom level {} -> {}", self.zoom_level, zoom_level);
        self.zoom_level = zoom_level;
        self.recenter(center_geo);
        zoom_level
    }

    /// Moves the map so that `geo` is shown in the view-port center.
    pub fn center_on(&mut self, geo: GeoCoord) -> crate::Result<()> {
        if !geo.is_finite() {
            return Err(crate::MapError::InvalidCoordinates(geo.to_string()));
        }
        self.recenter(geo);
        Ok(())
    }

    fn recenter(&mut self, geo: GeoCoord) {
        if self.seeded {
            self.anchor_at(geo);
            self.update_grid();
        } else {
            self.start_center = geo;
            self.anchor.number = projection::geo_to_tile_number(geo, self.zoom_level);
        }
    }

    /// Applies the camera: untransformed screen space to view-port space.
    pub fn screen_to_viewport(&self, point: Point) -> Point {
        self.camera.transform_point(point)
    }

    /// Inverse of [`MapImage::screen_to_viewport`].
    pub fn viewport_to_screen(&self, point: Point) -> Option<Point> {
        let screen = self.camera.inverse_transform_point(point);
        if screen.is_none() {
            log::warn!("Camera is not invertible, cannot map {:?}", point);
        }
        screen
    }

    /// Snapshot of the tile under a view-port point.
    pub fn tile_at(&self, point: Point) -> Option<Tile> {
        let screen = self.viewport_to_screen(point)?;
        lock(&self.grid).tile_at_screen(screen).cloned()
    }

    /// Geographic coordinate under a view-port point, `None` where no tile
    /// is.
    pub fn geo_at(&self, point: Point) -> Option<GeoCoord> {
        let screen = self.viewport_to_screen(point)?;
        let grid = lock(&self.grid);
        let tile = grid.tile_at_screen(screen)?;
        let on_tile = Point::new(
            screen.x - tile.screen_x as f64,
            screen.y - tile.screen_y as f64,
        );
        Some(projection::image_pixel_to_geo(
            on_tile,
            tile.tile_number.center(),
            HALF_TILE_SIZE as f64,
            self.zoom_level,
        ))
    }

    pub fn map_center(&self) -> Option<GeoCoord> {
        self.geo_at(self.rects.center())
    }

    /// Clones every tile (ordered by row, then column) for painting.
    pub fn snapshot_tiles(&self) -> Vec<Tile> {
        lock(&self.grid).snapshot()
    }

    pub fn tile_count(&self) -> usize {
        lock(&self.grid).len()
    }

    /// `true` once the grid exists and every tile is valid.
    pub fn is_fully_loaded(&self) -> bool {
        let grid = lock(&self.grid);
        !grid.is_empty() && grid.tiles().all(Tile::is_valid)
    }

    /// Union of the camera-transformed tile bounds.
    pub fn tile_grid_bounds(&self) -> Bounds {
        lock(&self.grid).bounds(&self.camera)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn zoom_level(&self) -> u8 {
        self.zoom_level
    }

    pub fn rects(&self) -> &ViewportRects {
        &self.rects
    }

    pub fn config(&self) -> &MapViewConfig {
        &self.config
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.interaction.state()
    }

    pub fn loader_state(&self) -> LoaderState {
        self.loader.state()
    }

    /// The loader error that stopped tile requests, if any.
    pub fn loader_fault(&self) -> Option<LoaderError> {
        self.loader_fault.clone().or_else(|| self.loader.fault())
    }

    /// Resets a faulted loader and requests the invalid tiles again.
    pub fn reset_loader(&mut self) -> crate::Result<()> {
        self.loader.reset()?;
        self.loader_fault = None;
        lock(&self.grid).in_flight.clear();
        log::info!("Tile loader reset");
        self.update_grid();
        Ok(())
    }

    pub fn repaint_receiver(&self) -> RepaintReceiver {
        self.repaint_rx.clone()
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }
}

impl Drop for MapImage {
    fn drop(&mut self) {
        self.loader.remove_listener(self.listener_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::fetch::{DecodeError, FetchError};
    use image::RgbaImage;
    use std::time::{Duration, Instant};

    struct FailingFetcher;

    impl TileFetcher for FailingFetcher {
        fn fetch_tile_image(&self, _: GeoCoord, _: u8, _: u32, _: u32) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Io("offline".into()))
        }
    }

    struct SolidFetcher;

    impl TileFetcher for SolidFetcher {
        fn fetch_tile_image(&self, _: GeoCoord, _: u8, _: u32, _: u32) -> Result<Vec<u8>, FetchError> {
            Ok(vec![1])
        }
    }

    struct SolidDecoder;

    impl TileDecoder for SolidDecoder {
        fn decode(&self, _: &[u8]) -> Result<Bitmap, DecodeError> {
            Ok(Arc::new(RgbaImage::new(TILE_SIZE, TILE_SIZE)))
        }
    }

    fn map(fetcher: Arc<dyn TileFetcher>) -> MapImage {
        let mut map = MapImage::new(MapViewConfig::for_testing(), fetcher, Arc::new(SolidDecoder)).unwrap();
        map.set_viewport(800, 600);
        map
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_stale_completion_is_cached_but_not_applied() {
        let grid = Arc::new(Mutex::new(TileGrid::new()));
        let cache = TileCache::new(8);
        let (repaint, repaint_rx) = repaint_channel();
        let sink = TileSink {
            grid: grid.clone(),
            cache: cache.clone(),
            repaint,
            log_tiles: true,
        };

        let id = TileId::new(0, 0);
        let current = TileNumber::new(10.5, 20.5, 6);
        let stale = current.offset(1, 0);
        lock(&grid).insert_cell(id, |x, y| Tile::new(id, x, y, current));

        let old = Arc::new(TileRequest::new(id, stale, Arc::new(SolidFetcher), Arc::new(SolidDecoder)));
        let running = Arc::new(TileRequest::new(id, current, Arc::new(SolidFetcher), Arc::new(SolidDecoder)));
        lock(&grid).in_flight.insert(id, running.clone());

        let image: Bitmap = Arc::new(RgbaImage::new(TILE_SIZE, TILE_SIZE));
        sink.on_request_complete(&old, image.clone());
        {
            let grid = lock(&grid);
            assert!(!grid.get(&id).unwrap().is_valid());
            assert!(grid.in_flight.contains_key(&id), "only the running request releases the tile");
        }
        assert!(cache.contains(&stale));
        assert!(!repaint_rx.try_take());

        sink.on_request_complete(&running, image);
        let grid = lock(&grid);
        assert!(grid.get(&id).unwrap().is_valid());
        assert!(grid.in_flight.is_empty());
        assert!(repaint_rx.try_take());
    }

    #[test]
    fn test_failure_releases_in_flight_entry() {
        let grid = Arc::new(Mutex::new(TileGrid::new()));
        let (repaint, _repaint_rx) = repaint_channel();
        let sink = TileSink {
            grid: grid.clone(),
            cache: TileCache::new(8),
            repaint,
            log_tiles: false,
        };

        let id = TileId::new(3, 1);
        let request = Arc::new(TileRequest::new(
            id,
            TileNumber::new(1.5, 1.5, 2),
            Arc::new(FailingFetcher),
            Arc::new(SolidDecoder),
        ));
        lock(&grid).in_flight.insert(id, request.clone());

        sink.on_request_failed(&request, FailReason::Error, "Io: offline");
        assert!(lock(&grid).in_flight.is_empty());
    }

    #[test]
    fn test_initial_grid_covers_inner_region() {
        let map = map(Arc::new(FailingFetcher));
        assert_eq!(map.tile_count(), 25);
        assert!(map.tile_grid_bounds().contains_bounds(&map.rects().inner_extended));
        assert!(map.rects().is_nested());

        let center = map.tile_at(map.rects().center()).unwrap();
        assert_eq!(center.id, TileId::new(0, 0));
        let expected = projection::geo_to_tile_number(MapViewConfig::default().grid.center, 12);
        assert!(center.tile_number.approx_eq(&expected));
    }

    #[test]
    fn test_tiles_load_and_fill_cache() {
        let map = map(Arc::new(SolidFetcher));
        assert!(wait_for(|| map.is_fully_loaded()));
        assert_eq!(map.cache().len(), 25);
        assert!(map.repaint_receiver().try_take());
    }

    #[test]
    fn test_map_center_matches_configured_center() {
        let map = map(Arc::new(FailingFetcher));
        let center = map.map_center().unwrap();
        let expected = MapViewConfig::default().grid.center;
        assert!((center.latitude - expected.latitude).abs() < 1e-3);
        assert!((center.longitude - expected.longitude).abs() < 1e-3);
    }

    #[test]
    fn test_center_on_rejects_nan() {
        let mut map = map(Arc::new(FailingFetcher));
        assert!(map.center_on(GeoCoord::new(f64::NAN, 0.0)).is_err());
        map.center_on(GeoCoord::new(48.8566, 2.3522)).unwrap();
        let center = map.map_center().unwrap();
        assert!((center.latitude - 48.8566).abs() < 1e-3);
        assert!((center.longitude - 2.3522).abs() < 1e-3);
    }

    #[test]
    fn test_set_zoom_level_is_clamped() {
        let mut map = map(Arc::new(FailingFetcher));
        assert_eq!(map.set_zoom_level(40), 18);
        assert_eq!(map.zoom_level(), 18);
        assert!(map.snapshot_tiles().iter().all(|t| t.tile_number.zoom == 18));
    }

    #[test]
    fn test_wheel_zoom_folds_into_zoom_level() {
        let mut map = map(Arc::new(FailingFetcher));
        let center = map.rects().center();
        map.wheel_zoom(center, 4.0);
        assert_eq!(map.zoom_level(), 13);
        assert!((map.camera().scale() - 1.0).abs() < 1e-9);

        map.wheel_zoom(center, -4.0);
        assert_eq!(map.zoom_level(), 12);
        assert!(map.snapshot_tiles().iter().all(|t| t.tile_number.zoom == 12));
    }

    #[test]
    fn test_zoom_is_clamped_at_limits() {
        let mut config = MapViewConfig::for_testing();
        config.grid.zoom_level = 18;
        let mut map = MapImage::new(config, Arc::new(FailingFetcher), Arc::new(SolidDecoder)).unwrap();
        map.set_viewport(800, 600);

        map.wheel_zoom(map.rects().center(), 5.0);
        assert_eq!(map.zoom_level(), 18);
        assert!((map.camera().scale() - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_reset_view_restores_camera() {
        let mut map = map(Arc::new(FailingFetcher));
        map.begin_pan(Point::new(100.0, 100.0));
        map.drag_to(Point::new(180.0, 60.0));
        map.end_interaction();
        assert_ne!(*map.camera(), Camera::identity());

        map.reset_view();
        assert_eq!(*map.camera(), Camera::identity());
    }
}
