pub mod cache;
pub mod fetch;
pub mod loader;
pub mod pool;
pub mod request;
pub mod source;
pub mod tile;

// Re-exports for convenience
pub use cache::TileCache;
pub use loader::{FailReason, ListenerId, LoaderError, LoaderState, TileLoader, TileLoaderListener};
pub use request::TileRequest;
pub use source::{MapProvider, MapType, Marker, UrlBuilder};
pub use tile::{Bitmap, Tile, TileId};
