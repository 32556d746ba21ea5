//! The shared tile map and the pure geometry of the tile lattice.
//!
//! Every tile sits on a fixed lattice in untransformed screen space: cell
//! `(column, row)` has its top-left corner at `origin + 256 * (column, row)`.

use crate::core::bounds::Bounds;
use crate::core::constants::TILE_SIZE;
use crate::core::geo::Point;
use crate::rendering::camera::Camera;
use crate::tiles::request::TileRequest;
use crate::tiles::tile::{Tile, TileId};
use fxhash::FxHashMap;
use std::sync::Arc;

/// Number of columns/rows missing on each edge of the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeCounts {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl EdgeCounts {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Columns/rows to add so the transformed grid grows towards `required`. A
/// gap of up to one scaled tile needs one tile, larger gaps
/// `floor(gap / tile)`; callers repeat until no gap is left.
pub fn missing_edge_counts(grid: &Bounds, required: &Bounds, scaled_tile_size: f64) -> EdgeCounts {
    if scaled_tile_size <= 0.0 || !scaled_tile_size.is_finite() {
        return EdgeCounts::default();
    }
    let count = |gap: f64| -> i32 {
        if gap <= 0.0 {
            0
        } else if gap <= scaled_tile_size {
            1
        } else {
            (gap / scaled_tile_size).floor() as i32
        }
    };

    EdgeCounts {
        left: count(grid.min.x - required.min.x),
        top: count(grid.min.y - required.min.y),
        right: count(required.max.x - grid.max.x),
        bottom: count(required.max.y - grid.max.y),
    }
}

/// Inclusive column/row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min_column: i32,
    pub min_row: i32,
    pub max_column: i32,
    pub max_row: i32,
}

impl CellRange {
    /// Smallest range containing both cells.
    pub fn spanning(a: TileId, b: TileId) -> CellRange {
        CellRange {
            min_column: a.column.min(b.column),
            min_row: a.row.min(b.row),
            max_column: a.column.max(b.column),
            max_row: a.row.max(b.row),
        }
    }

    pub fn intersect(&self, other: &CellRange) -> Option<CellRange> {
        let range = CellRange {
            min_column: self.min_column.max(other.min_column),
            min_row: self.min_row.max(other.min_row),
            max_column: self.max_column.min(other.max_column),
            max_row: self.max_row.min(other.max_row),
        };
        (range.min_column <= range.max_column && range.min_row <= range.max_row).then_some(range)
    }

    pub fn grown(&self, counts: &EdgeCounts) -> CellRange {
        CellRange {
            min_column: self.min_column - counts.left,
            min_row: self.min_row - counts.top,
            max_column: self.max_column + counts.right,
            max_row: self.max_row + counts.bottom,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = TileId> + '_ {
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_column..=self.max_column).map(move |column| TileId::new(column, row))
        })
    }
}

/// Tiles keyed by grid position plus the requests currently in flight.
///
/// Lives behind one mutex shared by the grid manager and the loader
/// callbacks.
#[derive(Debug, Default)]
pub struct TileGrid {
    pub(crate) tiles: FxHashMap<TileId, Tile>,
    pub(crate) in_flight: FxHashMap<TileId, Arc<TileRequest>>,
    origin: (i32, i32),
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, id: &TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Places cell `(0, 0)` with its top-left corner at `origin`.
    pub fn set_origin(&mut self, origin: (i32, i32)) {
        self.origin = origin;
    }

    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    /// Top-left corner of a cell in screen space.
    pub fn cell_position(&self, id: TileId) -> (i32, i32) {
        let size = TILE_SIZE as i32;
        (
            self.origin.0 + id.column * size,
            self.origin.1 + id.row * size,
        )
    }

    /// Center of a cell in screen space.
    pub fn cell_center(&self, id: TileId) -> Point {
        let (x, y) = self.cell_position(id);
        let half = TILE_SIZE as f64 / 2.0;
        Point::new(x as f64 + half, y as f64 + half)
    }

    /// Cell containing a screen-space point; the cell need not exist.
    pub fn cell_at(&self, screen: Point) -> TileId {
        let size = TILE_SIZE as f64;
        TileId::new(
            ((screen.x - self.origin.0 as f64) / size).floor() as i32,
            ((screen.y - self.origin.1 as f64) / size).floor() as i32,
        )
    }

    /// Cells touched by a camera-space region, `None` if the camera cannot
    /// be inverted.
    pub fn cells_covering(&self, camera: &Camera, region: &Bounds) -> Option<CellRange> {
        let min = camera.inverse_transform_point(region.min)?;
        let max = camera.inverse_transform_point(region.max)?;
        Some(CellRange::spanning(self.cell_at(min), self.cell_at(max)))
    }

    /// The tile with the smallest row, then the smallest column.
    pub fn top_left(&self) -> Option<&Tile> {
        self.tiles.values().min_by_key(|t| (t.row(), t.column()))
    }

    /// Existing tile under a screen-space point, derived from the offset to
    /// the top-left tile.
    pub fn tile_at_screen(&self, screen: Point) -> Option<&Tile> {
        let top_left = self.top_left()?;
        let size = TILE_SIZE as f64;
        let column = top_left.column()
            + ((screen.x - top_left.screen_x as f64) / size).floor() as i32;
        let row = top_left.row() + ((screen.y - top_left.screen_y as f64) / size).floor() as i32;
        self.tiles.get(&TileId::new(column, row))
    }

    pub fn cell_range(&self) -> Option<CellRange> {
        let mut tiles = self.tiles.keys();
        let first = tiles.next()?;
        let mut range = CellRange {
            min_column: first.column,
            min_row: first.row,
            max_column: first.column,
            max_row: first.row,
        };
        for id in tiles {
            range.min_column = range.min_column.min(id.column);
            range.min_row = range.min_row.min(id.row);
            range.max_column = range.max_column.max(id.column);
            range.max_row = range.max_row.max(id.row);
        }
        Some(range)
    }

    /// Union of all camera-transformed tile bounds; empty without tiles.
    pub fn bounds(&self, camera: &Camera) -> Bounds {
        let mut bounds = Bounds::empty();
        for tile in self.tiles.values() {
            bounds.extend_bounds(&camera.transform_bounds(&tile.bounds()));
        }
        bounds
    }

    /// Inserts an invalid tile at its lattice position unless present.
    /// Returns `true` when a tile was created.
    pub fn insert_cell(&mut self, id: TileId, make: impl FnOnce(i32, i32) -> Tile) -> bool {
        if self.tiles.contains_key(&id) {
            return false;
        }
        let (x, y) = self.cell_position(id);
        self.tiles.insert(id, make(x, y));
        true
    }

    /// Removes tiles whose transformed bounds miss `keep_region`. The last
    /// tile (the one nearest `anchor`) always survives.
    pub fn evict_outside(&mut self, camera: &Camera, keep_region: &Bounds, anchor: Point) -> Vec<TileId> {
        let mut evict: Vec<TileId> = self
            .tiles
            .values()
            .filter(|t| !keep_region.intersects(&camera.transform_bounds(&t.bounds())))
            .map(|t| t.id)
            .collect();

        if evict.len() == self.tiles.len() {
            let nearest = self
                .tiles
                .values()
                .map(|t| {
                    let center = camera.transform_bounds(&t.bounds()).center();
                    (t.id, center.distance_to(&anchor))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id);
            evict.retain(|id| Some(*id) != nearest);
        }

        for id in &evict {
            self.tiles.remove(id);
        }
        evict
    }

    /// Clones every tile, ordered by row then column.
    pub fn snapshot(&self) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self.tiles.values().cloned().collect();
        tiles.sort_by_key(|t| (t.row(), t.column()));
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileNumber;

    fn grid_with(cells: &[(i32, i32)]) -> TileGrid {
        let mut grid = TileGrid::new();
        grid.set_origin((272, 172));
        for &(c, r) in cells {
            grid.insert_cell(TileId::new(c, r), |x, y| {
                Tile::new(TileId::new(c, r), x, y, TileNumber::new(0.5, 0.5, 1))
            });
        }
        grid
    }

    #[test]
    fn test_missing_edge_counts_round_down_larger_gaps() {
        let required = Bounds::from_coords(0.0, 0.0, 640.0, 640.0);

        let one_and_a_half = Bounds::from_coords(384.0, 0.0, 640.0, 640.0);
        assert_eq!(missing_edge_counts(&one_and_a_half, &required, 256.0).left, 1);

        let exactly_one = Bounds::from_coords(256.0, 0.0, 640.0, 640.0);
        assert_eq!(missing_edge_counts(&exactly_one, &required, 256.0).left, 1);

        let two_and_a_bit = Bounds::from_coords(600.0, 0.0, 640.0, 640.0);
        assert_eq!(missing_edge_counts(&two_and_a_bit, &required, 256.0).left, 2);

        // Scaled tiles shrink the step.
        assert_eq!(missing_edge_counts(&one_and_a_half, &required, 128.0).left, 3);
    }

    #[test]
    fn test_missing_edge_counts() {
        let required = Bounds::from_coords(-128.0, -128.0, 928.0, 728.0);
        let grid = Bounds::from_coords(272.0, 172.0, 528.0, 428.0);
        let counts = missing_edge_counts(&grid, &required, 256.0);
        assert_eq!(
            counts,
            EdgeCounts {
                left: 1,
                top: 1,
                right: 1,
                bottom: 1
            }
        );

        let small_gap = Bounds::from_coords(-100.0, -128.0, 928.0, 728.0);
        let counts = missing_edge_counts(&small_gap, &required, 256.0);
        assert_eq!(counts.left, 1);
        assert_eq!(counts.right, 0);

        let covered = missing_edge_counts(&required.expanded(1.0), &required, 256.0);
        assert!(covered.is_zero());
    }

    #[test]
    fn test_lattice_positions() {
        let grid = grid_with(&[(0, 0)]);
        assert_eq!(grid.cell_position(TileId::new(-1, 2)), (16, 684));
        assert_eq!(grid.cell_at(Point::new(271.0, 172.0)), TileId::new(-1, 0));
        assert_eq!(grid.cell_at(Point::new(400.0, 300.0)), TileId::new(0, 0));
        assert_eq!(grid.cell_center(TileId::new(0, 0)), Point::new(400.0, 300.0));
    }

    #[test]
    fn test_cell_range_helpers() {
        let a = CellRange::spanning(TileId::new(2, -1), TileId::new(-2, 3));
        assert_eq!((a.min_column, a.min_row, a.max_column, a.max_row), (-2, -1, 2, 3));

        let b = CellRange::spanning(TileId::new(1, 1), TileId::new(5, 5));
        let both = a.intersect(&b).unwrap();
        assert_eq!((both.min_column, both.min_row, both.max_column, both.max_row), (1, 1, 2, 3));

        let far = CellRange::spanning(TileId::new(10, 10), TileId::new(11, 11));
        assert!(a.intersect(&far).is_none());

        let grid = grid_with(&[(0, 0)]);
        let view = Bounds::from_coords(-128.0, -128.0, 928.0, 728.0);
        let cells = grid.cells_covering(&Camera::identity(), &view).unwrap();
        assert_eq!((cells.min_column, cells.min_row, cells.max_column, cells.max_row), (-2, -2, 2, 2));
    }

    #[test]
    fn test_tile_at_screen_uses_top_left() {
        let grid = grid_with(&[(-1, -1), (0, -1), (-1, 0), (0, 0)]);
        assert_eq!(grid.top_left().unwrap().id, TileId::new(-1, -1));
        assert_eq!(
            grid.tile_at_screen(Point::new(300.0, 200.0)).unwrap().id,
            TileId::new(0, 0)
        );
        assert_eq!(
            grid.tile_at_screen(Point::new(100.0, 100.0)).unwrap().id,
            TileId::new(-1, -1)
        );
        assert!(grid.tile_at_screen(Point::new(900.0, 300.0)).is_none());
    }

    #[test]
    fn test_range_and_bounds() {
        let grid = grid_with(&[(-2, 1), (3, -1)]);
        let range = grid.cell_range().unwrap();
        assert_eq!((range.min_column, range.max_column), (-2, 3));
        assert_eq!((range.min_row, range.max_row), (-1, 1));
        assert_eq!(range.cells().count(), 18);

        let bounds = grid.bounds(&Camera::identity());
        assert_eq!(bounds.min, Point::new(272.0 - 512.0, 172.0 - 256.0));
        assert!(TileGrid::new().bounds(&Camera::identity()).is_empty());
    }

    #[test]
    fn test_eviction_keeps_last_tile() {
        let mut grid = grid_with(&[(0, 0), (10, 0)]);
        let keep = Bounds::from_coords(0.0, 0.0, 800.0, 600.0);
        let evicted = grid.evict_outside(&Camera::identity(), &keep, Point::new(400.0, 300.0));
        assert_eq!(evicted, vec![TileId::new(10, 0)]);

        let nowhere = Bounds::from_coords(-5000.0, -5000.0, -4000.0, -4000.0);
        grid.evict_outside(&Camera::identity(), &nowhere, Point::new(400.0, 300.0));
        assert_eq!(grid.len(), 1);
    }
}
