//! Configuration for the tile loader, the tile grid and the map provider.
//!
//! Every section deserializes with defaults, so a JSON file only needs to
//! name the values it changes:
//!
//! ```json
//! { "loader": { "worker_count": 4 }, "grid": { "zoom_level": 14 } }
//! ```

use crate::core::constants::{
    CANCEL_WAIT_ATTEMPTS, CANCEL_WAIT_MS, DEFAULT_CENTER, DEFAULT_WORKER_COUNT,
    DEFAULT_ZOOM_LEVEL, FETCH_TIMEOUT_MS, HALF_TILE_SIZE, MAX_RETRIES, MAX_ZOOM_LEVEL, TILE_SIZE,
};
use crate::core::geo::GeoCoord;
use crate::tiles::source::{MapProvider, MapType, Marker};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration of a map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapViewConfig {
    pub loader: TileLoaderConfig,
    pub grid: GridConfig,
    pub provider: ProviderConfig,
    /// Number of decoded tile bitmaps kept for reuse
    pub cache_capacity: usize,
    pub debug: DebugOptions,
}

impl Default for MapViewConfig {
    fn default() -> Self {
        Self {
            loader: TileLoaderConfig::default(),
            grid: GridConfig::default(),
            provider: ProviderConfig::default(),
            cache_capacity: 512,
            debug: DebugOptions::default(),
        }
    }
}

impl MapViewConfig {
    pub fn low_resource() -> Self {
        Self {
            loader: TileLoaderConfig::low_resource(),
            cache_capacity: 64,
            ..Self::default()
        }
    }

    /// Fast timings so tests do not sit in retry or cancel waits.
    pub fn for_testing() -> Self {
        Self {
            loader: TileLoaderConfig::for_testing(),
            cache_capacity: 32,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loader.validate()?;
        self.grid.validate()?;
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be > 0".into()));
        }
        Ok(())
    }
}

/// Worker pool, retry and cancellation timings of the tile loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoaderConfig {
    /// Fixed number of worker threads per batch
    pub worker_count: usize,
    /// Additional attempts after a failed fetch
    pub max_retries: u32,
    /// Connect and read timeout of one fetch
    pub fetch_timeout_ms: u64,
    /// Pause between two attempts of the same task
    pub retry_delay_ms: u64,
    /// Bounded waits for the pool to drain on cancel
    pub cancel_wait_attempts: u32,
    pub cancel_wait_ms: u64,
    /// Upper bound on how long the controller sleeps while tasks are running
    pub poll_interval_ms: u64,
}

impl Default for TileLoaderConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            max_retries: MAX_RETRIES,
            fetch_timeout_ms: FETCH_TIMEOUT_MS,
            retry_delay_ms: 100,
            cancel_wait_attempts: CANCEL_WAIT_ATTEMPTS,
            cancel_wait_ms: CANCEL_WAIT_MS,
            poll_interval_ms: 10,
        }
    }
}

/// Unified configuration presets for TileLoaderConfig
impl TileLoaderConfig {
    pub fn low_resource() -> Self {
        Self {
            worker_count: 2,
            max_retries: 1,
            retry_delay_ms: 250,
            poll_interval_ms: 25,
            ..Self::default()
        }
    }

    pub fn high_performance() -> Self {
        Self {
            worker_count: 32,
            max_retries: 3,
            retry_delay_ms: 25,
            poll_interval_ms: 5,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            worker_count: 4,
            max_retries: 2,
            fetch_timeout_ms: 200,
            retry_delay_ms: 1,
            cancel_wait_attempts: 2,
            cancel_wait_ms: 100,
            poll_interval_ms: 2,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cancel_wait(&self) -> Duration {
        Duration::from_millis(self.cancel_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("loader.worker_count must be > 0".into()));
        }
        if self.cancel_wait_attempts == 0 {
            return Err(ConfigError::Invalid(
                "loader.cancel_wait_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Camera limits, viewport extensions and the initial map position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Below this camera scale the zoom level is decremented
    pub min_scale: f64,
    /// Above this camera scale the zoom level is incremented
    pub max_scale: f64,
    /// Growth of the view port that must be covered with tiles
    pub inner_extension_px: f64,
    /// Growth of the inner region beyond which tiles are evicted
    pub outer_margin_px: f64,
    pub center: GeoCoord,
    pub zoom_level: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.7,
            max_scale: 1.3,
            inner_extension_px: HALF_TILE_SIZE as f64,
            outer_margin_px: TILE_SIZE as f64,
            center: GeoCoord::new(DEFAULT_CENTER.0, DEFAULT_CENTER.1),
            zoom_level: DEFAULT_ZOOM_LEVEL,
            min_zoom: 0,
            max_zoom: 18,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_scale > 0.0 && self.min_scale < 1.0 && self.max_scale > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "grid scale bounds must satisfy 0 < min_scale < 1 < max_scale (got {} / {})",
                self.min_scale, self.max_scale
            )));
        }
        if self.inner_extension_px < 0.0 || self.outer_margin_px < 0.0 {
            return Err(ConfigError::Invalid(
                "grid extensions must not be negative".into(),
            ));
        }
        if self.min_zoom > self.zoom_level
            || self.zoom_level > self.max_zoom
            || self.max_zoom > MAX_ZOOM_LEVEL
        {
            return Err(ConfigError::Invalid(format!(
                "zoom levels must satisfy min_zoom <= zoom_level <= max_zoom <= {}",
                MAX_ZOOM_LEVEL
            )));
        }
        if !self.center.is_finite() {
            return Err(ConfigError::Invalid("grid.center must be finite".into()));
        }
        Ok(())
    }
}

/// Which static-map service tiles are requested from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: MapProvider,
    pub map_type: MapType,
    pub markers: Vec<Marker>,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: MapProvider::default(),
            map_type: MapType::default(),
            markers: Vec::new(),
            base_url: None,
            user_agent: concat!("mapview/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Diagnostics switches, passed explicitly instead of living in globals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    /// Log every tile creation, eviction and re-anchoring
    pub log_tiles: bool,
    /// Log every loader event and state transition
    pub log_loader_events: bool,
}
