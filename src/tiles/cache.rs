use crate::core::geo::TileNumber;
use crate::core::projection::map_size_px;
use crate::core::constants::TILE_SIZE;
use crate::tiles::tile::Bitmap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Cache key: the tile-number position quantized to world pixels, with the
/// horizontal axis wrapped around the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub zoom: u8,
    pub px: i64,
    pub py: i64,
}

impl TileKey {
    pub fn from_tile_number(tile_number: &TileNumber) -> Self {
        let map_size = map_size_px(tile_number.zoom) as i64;
        let px = (tile_number.x * TILE_SIZE as f64).round() as i64;
        let py = (tile_number.y * TILE_SIZE as f64).round() as i64;
        Self {
            zoom: tile_number.zoom,
            px: px.rem_euclid(map_size),
            py,
        }
    }
}

/// In-memory bitmap cache using LRU eviction
#[derive(Debug)]
pub struct TileCache {
    cache: Arc<Mutex<LruCache<TileKey, Bitmap>>>,
}

impl TileCache {
    const DEFAULT_CAPACITY: usize = 512;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, tile_number: &TileNumber) -> Option<Bitmap> {
        let key = TileKey::from_tile_number(tile_number);
        self.cache.lock().ok()?.get(&key).cloned()
    }

    pub fn put(&self, tile_number: &TileNumber, bitmap: Bitmap) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(TileKey::from_tile_number(tile_number), bitmap);
        }
    }

    pub fn contains(&self, tile_number: &TileNumber) -> bool {
        let key = TileKey::from_tile_number(tile_number);
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.contains(&key))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().ok().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }
}

impl Clone for TileCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
