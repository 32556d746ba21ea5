use crate::core::bounds::Bounds;
use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileNumber;
use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Decoded tile image, shared between the tile map, the cache and snapshots.
pub type Bitmap = Arc<RgbaImage>;

/// Light-gray image painted for tiles that have no bitmap yet.
pub static PLACEHOLDER_BITMAP: Lazy<Bitmap> = Lazy::new(|| {
    Arc::new(RgbaImage::from_pixel(
        TILE_SIZE,
        TILE_SIZE,
        Rgba([192, 192, 192, 255]),
    ))
});

/// Grid position of a tile, the key of the shared tile map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub column: i32,
    pub row: i32,
}

impl TileId {
    pub fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.column, self.row)
    }
}

impl FromStr for TileId {
    type Err = crate::MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, row) = s
            .split_once(',')
            .ok_or_else(|| crate::MapError::ParseError(format!("tile id without ',': {}", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<i32>()
                .map_err(|e| crate::MapError::ParseError(format!("tile id {}: {}", s, e)))
        };
        Ok(Self::new(parse(column)?, parse(row)?))
    }
}

/// One cell of the tile grid.
///
/// `(screen_x, screen_y)` is the top-left corner in untransformed screen
/// space; the camera is applied on top. A valid tile always has a bitmap or
/// is an empty placeholder.
#[derive(Debug, Clone)]
pub struct Tile {
    pub id: TileId,
    pub screen_x: i32,
    pub screen_y: i32,
    pub tile_number: TileNumber,
    valid: bool,
    empty_placeholder: bool,
    bitmap: Option<Bitmap>,
}

impl Tile {
    pub fn new(id: TileId, screen_x: i32, screen_y: i32, tile_number: TileNumber) -> Self {
        Self {
            id,
            screen_x,
            screen_y,
            tile_number,
            valid: false,
            empty_placeholder: false,
            bitmap: None,
        }
    }

    pub fn column(&self) -> i32 {
        self.id.column
    }

    pub fn row(&self) -> i32 {
        self.id.row
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_empty_placeholder(&self) -> bool {
        self.empty_placeholder
    }

    /// The fetched bitmap, possibly stale while the tile is invalid.
    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    /// What a painter should draw: the bitmap or the placeholder.
    pub fn display_bitmap(&self) -> Bitmap {
        self.bitmap
            .clone()
            .unwrap_or_else(|| Arc::clone(&PLACEHOLDER_BITMAP))
    }

    pub fn set_loaded(&mut self, bitmap: Bitmap) {
        self.bitmap = Some(bitmap);
        self.empty_placeholder = false;
        self.valid = true;
    }

    /// Marks a tile outside the world: valid, nothing to fetch.
    pub fn mark_empty(&mut self) {
        self.bitmap = None;
        self.empty_placeholder = true;
        self.valid = true;
    }

    /// Requests a re-fetch. The old bitmap stays as a preview.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.empty_placeholder = false;
    }

    /// Tile rectangle in untransformed screen space.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_origin_and_size(
            self.screen_x as f64,
            self.screen_y as f64,
            TILE_SIZE as f64,
            TILE_SIZE as f64,
        )
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}|{},{}|{}|{}]",
            self.id,
            self.screen_x,
            self.screen_y,
            self.tile_number,
            self.tile_number.center().formatted()
        )
    }
}
