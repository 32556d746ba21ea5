use mapview::prelude::*;

/// Tile grid behaviour of `MapImage` under resize, pan and zoom
#[cfg(test)]
mod grid_tests {
    use super::*;
    use image::RgbaImage;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Offline;

    impl TileFetcher for Offline {
        fn fetch_tile_image(&self, _: GeoCoord, _: u8, _: u32, _: u32) -> std::result::Result<Vec<u8>, FetchError> {
            Err(FetchError::Io("offline".into()))
        }
    }

    struct Blank;

    impl TileFetcher for Blank {
        fn fetch_tile_image(&self, _: GeoCoord, _: u8, _: u32, _: u32) -> std::result::Result<Vec<u8>, FetchError> {
            Ok(vec![0])
        }
    }

    impl TileDecoder for Blank {
        fn decode(&self, _: &[u8]) -> std::result::Result<Bitmap, DecodeError> {
            Ok(Arc::new(RgbaImage::new(256, 256)))
        }
    }

    fn map_at(center: GeoCoord, zoom: u8, fetcher: Arc<dyn TileFetcher>) -> MapImage {
        init_logging();
        let mut config = MapViewConfig::for_testing();
        config.grid.center = center;
        config.grid.zoom_level = zoom;
        let mut map = MapImage::new(config, fetcher, Arc::new(Blank)).unwrap();
        map.set_viewport(800, 600);
        map
    }

    fn dresden(fetcher: Arc<dyn TileFetcher>) -> MapImage {
        map_at(GeoCoord::new(51.053631, 13.740810), 12, fetcher)
    }

    fn assert_covered(map: &MapImage) {
        let rects = map.rects();
        assert!(rects.is_nested(), "viewport rectangles must nest");
        assert!(map.tile_count() > 0, "tile map must never be empty");
        assert!(
            map.tile_grid_bounds().contains_bounds(&rects.inner_extended),
            "grid {:?} must cover {:?}",
            map.tile_grid_bounds(),
            rects.inner_extended
        );
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_grid_covers_inner_region_while_panning() {
        let mut map = dresden(Arc::new(Offline));
        assert_covered(&map);

        let drags = [(600.0, 300.0), (100.0, 550.0), (-900.0, -700.0), (400.0, 300.0)];
        map.begin_pan(Point::new(400.0, 300.0));
        for (x, y) in drags {
            map.drag_to(Point::new(x, y));
            assert_covered(&map);
        }
        map.end_interaction();
        assert_eq!(map.interaction_state(), InteractionState::Normal);

        // Every tile still touches the tolerance region.
        let outer = map.rects().outer_extended;
        for tile in map.snapshot_tiles() {
            let bounds = map.camera().transform_bounds(&tile.bounds());
            assert!(outer.intersects(&bounds), "tile {} should have been evicted", tile);
        }
    }

    #[test]
    fn test_single_long_pan_is_covered_in_one_update() {
        let mut map = dresden(Arc::new(Offline));

        // Three and a half tiles at once: each edge step rounds down, so the
        // gap only closes if the update keeps filling.
        map.begin_pan(Point::new(400.0, 300.0));
        map.drag_to(Point::new(400.0 - 896.0, 300.0 - 896.0));
        assert_covered(&map);
        map.end_interaction();

        let center = map.rects().center();
        map.begin_zoom(center);
        map.drag_to(Point::new(center.x, center.y + 10.0));
        assert!(map.camera().scale() < 1.0);
        assert_covered(&map);
    }

    #[test]
    fn test_resize_keeps_grid_covering() {
        let mut map = dresden(Arc::new(Offline));
        map.set_viewport(1600, 1000);
        assert_covered(&map);
        map.set_viewport(300, 200);
        assert_covered(&map);
    }

    #[test]
    fn test_scale_above_max_folds_into_next_zoom_level() {
        let mut map = dresden(Arc::new(Offline));
        let center = map.rects().center();

        // 25 px up with a divisor of 50 gives factor 1.5.
        map.begin_zoom(center);
        map.drag_to(Point::new(center.x, center.y - 25.0));

        assert_eq!(map.zoom_level(), 13);
        assert!((map.camera().scale() - 1.0).abs() < 1e-9);
        let tiles = map.snapshot_tiles();
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| !t.is_valid()), "every tile must be re-fetched");
        assert!(tiles.iter().all(|t| t.tile_number.zoom == 13));
        assert_covered(&map);

        let center_geo = map.map_center().unwrap();
        assert!((center_geo.latitude - 51.053631).abs() < 1e-3);
        assert!((center_geo.longitude - 13.740810).abs() < 1e-3);
    }

    #[test]
    fn test_scale_below_min_folds_into_previous_zoom_level() {
        let mut map = dresden(Arc::new(Offline));
        let center = map.rects().center();
        map.begin_zoom(center);
        map.drag_to(Point::new(center.x, center.y + 50.0));
        map.end_interaction();

        assert_eq!(map.zoom_level(), 11);
        assert!((map.camera().scale() - 1.0).abs() < 1e-9);
        assert_covered(&map);
    }

    #[test]
    fn test_pan_moves_map_center_by_pixel_delta() {
        let zoom = 3;
        let mut map = map_at(GeoCoord::new(0.0, 10.0), zoom, Arc::new(Offline));
        let before = map.map_center().unwrap();

        map.begin_pan(Point::new(400.0, 300.0));
        map.drag_to(Point::new(144.0, 300.0));
        map.end_interaction();

        let after = map.map_center().unwrap();
        let expected = 360.0 / projection::map_size_px(zoom) as f64 * 256.0;
        assert!(
            (after.longitude - before.longitude - expected).abs() < 1e-6,
            "moved {} instead of {}",
            after.longitude - before.longitude,
            expected
        );
        assert!((after.latitude - before.latitude).abs() < 1e-6);
    }

    #[test]
    fn test_hit_testing() {
        let map = dresden(Arc::new(Offline));
        let center = map.rects().center();

        let tile = map.tile_at(center).unwrap();
        assert_eq!(tile.id, TileId::new(0, 0));
        let right = map.tile_at(Point::new(center.x + 256.0, center.y)).unwrap();
        assert_eq!(right.id, TileId::new(1, 0));
        assert!(right.tile_number.approx_eq(&tile.tile_number.offset(1, 0)));

        assert!(map.tile_at(Point::new(-5000.0, 0.0)).is_none());
        assert!(map.geo_at(Point::new(-5000.0, 0.0)).is_none());

        // Going right means going east.
        let west = map.geo_at(Point::new(100.0, 300.0)).unwrap();
        let east = map.geo_at(Point::new(700.0, 300.0)).unwrap();
        assert!(east.longitude > west.longitude);
        assert!((east.latitude - west.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_tiles_beyond_the_poles_are_empty_placeholders() {
        let map = map_at(GeoCoord::new(84.0, 0.0), 1, Arc::new(Offline));
        let tiles = map.snapshot_tiles();

        let outside: Vec<_> = tiles.iter().filter(|t| !t.tile_number.is_inside_world()).collect();
        assert!(!outside.is_empty());
        assert!(outside.iter().all(|t| t.is_valid() && t.is_empty_placeholder()));
    }

    #[test]
    fn test_grid_loads_and_reuses_cache() {
        let mut map = dresden(Arc::new(Blank));
        assert!(wait_for(|| map.is_fully_loaded()), "grid should load");
        let cached = map.cache().len();
        assert!(cached >= map.tile_count());

        // Moving away and back again is served from the cache.
        map.set_zoom_level(13);
        map.set_zoom_level(12);
        let reused = map.snapshot_tiles().iter().filter(|t| t.is_valid()).count();
        assert!(reused > 0, "tiles at the old zoom level should come from the cache");
    }

    #[test]
    fn test_refresh_requests_failed_tiles_again() {
        let mut map = dresden(Arc::new(Offline));
        assert!(wait_for(|| map.loader_state() == LoaderState::Idle));
        map.refresh();
        assert!(map.snapshot_tiles().iter().all(|t| !t.is_valid()));
        assert!(map.loader_fault().is_none());
    }
}
