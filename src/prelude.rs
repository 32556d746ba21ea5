//! Prelude module for common mapview types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mapview::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{DebugOptions, GridConfig, MapViewConfig, ProviderConfig, TileLoaderConfig},
    geo::{GeoCoord, Point, TileNumber},
    projection,
    viewport::ViewportRects,
};

pub use crate::tiles::{
    cache::TileCache,
    fetch::{DecodeError, FetchError, ImageDecoder, TileDecoder, TileFetcher},
    loader::{FailReason, ListenerId, LoaderError, LoaderState, TileLoader, TileLoaderListener},
    pool::CancelToken,
    request::TileRequest,
    source::{MapProvider, MapType, Marker, UrlBuilder},
    tile::{Bitmap, Tile, TileId},
};

#[cfg(feature = "http")]
pub use crate::tiles::fetch::HttpTileFetcher;

pub use crate::map::{image::MapImage, interaction::InteractionState};

pub use crate::rendering::{
    camera::Camera,
    repaint::{repaint_channel, RepaintReceiver, RepaintSignal},
};

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
