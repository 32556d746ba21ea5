//! # mapview
//!
//! A tile-based map view: a pannable, zoomable grid of 256×256 raster tiles
//! fetched from a static-map image provider.
//!
//! The crate is split into three layers:
//!
//! - [`core`]: geographic types, the Web Mercator projection, viewport
//!   rectangles and configuration.
//! - [`tiles`]: the tile record, the fetch/decode capabilities and the
//!   asynchronous, cancellable [`TileLoader`].
//! - [`map`]: the grid/viewport manager ([`MapImage`]) that keeps the shared
//!   tile map in sync with the camera.
//!
//! Painting is left to the embedding application, which consumes
//! [`MapImage::snapshot_tiles`] after a repaint signal.

pub mod core;
pub mod map;
pub mod prelude;
pub mod rendering;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    config::{DebugOptions, GridConfig, MapViewConfig, ProviderConfig, TileLoaderConfig},
    geo::{GeoCoord, Point, TileNumber},
    viewport::ViewportRects,
};

pub use tiles::{
    fetch::{DecodeError, FetchError, ImageDecoder, TileDecoder, TileFetcher},
    loader::{FailReason, LoaderError, LoaderState, TileLoader, TileLoaderListener},
    request::TileRequest,
    tile::{Bitmap, Tile, TileId},
};

#[cfg(feature = "http")]
pub use tiles::fetch::HttpTileFetcher;

pub use map::{image::MapImage, interaction::InteractionState};

pub use rendering::{
    camera::Camera,
    repaint::{RepaintReceiver, RepaintSignal},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::core::config::ConfigError),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Error type alias for convenience
pub type Error = MapError;
