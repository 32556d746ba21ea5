pub mod grid;
pub mod image;
pub mod interaction;

pub use grid::{missing_edge_counts, CellRange, EdgeCounts, TileGrid};
pub use image::MapImage;
pub use interaction::InteractionState;
