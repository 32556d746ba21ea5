//! The two external capabilities a fetch task depends on: getting the raw
//! image bytes for a map center, and turning those bytes into a bitmap.

use crate::core::geo::GeoCoord;
use crate::tiles::tile::Bitmap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("provider returned an empty image")]
    EmptyResponse,

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("{0}")]
    Io(String),

    #[error("Cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short error class name used in terminal task causes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::EmptyResponse => "EmptyResponse",
            Self::Http { .. } => "Http",
            Self::Io(_) => "Io",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Fetches the encoded image of a `width_px` × `height_px` map centered on
/// `center`. Implementations must bound every blocking call.
pub trait TileFetcher: Send + Sync {
    fn fetch_tile_image(
        &self,
        center: GeoCoord,
        zoom: u8,
        width_px: u32,
        height_px: u32,
    ) -> Result<Vec<u8>, FetchError>;
}

impl<F: TileFetcher + ?Sized> TileFetcher for Arc<F> {
    fn fetch_tile_image(
        &self,
        center: GeoCoord,
        zoom: u8,
        width_px: u32,
        height_px: u32,
    ) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_tile_image(center, zoom, width_px, height_px)
    }
}

pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError>;
}

impl<D: TileDecoder + ?Sized> TileDecoder for Arc<D> {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError> {
        (**self).decode(bytes)
    }
}

/// Decodes PNG, JPEG or GIF bytes with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl TileDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError> {
        let image = image::load_from_memory(bytes).map_err(|e| DecodeError(e.to_string()))?;
        Ok(Arc::new(image.to_rgba8()))
    }
}

#[cfg(feature = "http")]
pub use http::HttpTileFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{FetchError, TileFetcher};
    use crate::core::config::ProviderConfig;
    use crate::core::geo::GeoCoord;
    use crate::tiles::source::UrlBuilder;
    use reqwest::blocking::Client;
    use std::time::Duration;

    /// Blocking HTTP fetcher for static-map providers.
    pub struct HttpTileFetcher {
        client: Client,
        urls: Box<dyn UrlBuilder>,
    }

    impl HttpTileFetcher {
        /// `timeout` bounds both connecting and reading the response.
        pub fn new(provider: &ProviderConfig, timeout: Duration) -> Result<Self, FetchError> {
            let client = Client::builder()
                .user_agent(provider.user_agent.clone())
                .connect_timeout(timeout)
                .timeout(timeout)
                .build()
                .map_err(|e| FetchError::Io(e.to_string()))?;

            let urls = provider.provider.url_builder(
                provider.map_type,
                provider.markers.clone(),
                provider.base_url.clone(),
            );

            Ok(Self { client, urls })
        }
    }

    impl TileFetcher for HttpTileFetcher {
        fn fetch_tile_image(
            &self,
            center: GeoCoord,
            zoom: u8,
            width_px: u32,
            height_px: u32,
        ) -> Result<Vec<u8>, FetchError> {
            if width_px == 0 || height_px == 0 {
                return Err(FetchError::InvalidArgument(format!(
                    "image size {}x{}",
                    width_px, height_px
                )));
            }

            let url = self.urls.build_url(center, zoom, width_px, height_px);
            log::debug!("fetch {}", url);

            let resp = self
                .client
                .get(&url)
                .send()
                .map_err(|e| FetchError::Io(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(FetchError::Http {
                    status: resp.status().as_u16(),
                });
            }

            let bytes = resp.bytes().map_err(|e| FetchError::Io(e.to_string()))?;
            if bytes.is_empty() {
                return Err(FetchError::EmptyResponse);
            }
            Ok(bytes.to_vec())
        }
    }
}
