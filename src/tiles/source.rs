use crate::core::geo::GeoCoord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static-map services a [`UrlBuilder`] can be created for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapProvider {
    #[default]
    OsmStaticMapLite,
    Google,
}

impl MapProvider {
    /// Builds the URL strategy for this provider.
    pub fn url_builder(
        &self,
        map_type: MapType,
        markers: Vec<Marker>,
        base_url: Option<String>,
    ) -> Box<dyn UrlBuilder> {
        match self {
            Self::OsmStaticMapLite => Box::new(OsmStaticMapLiteUrls {
                base_url: base_url.unwrap_or_else(|| OsmStaticMapLiteUrls::BASE_URL.to_string()),
                map_type,
                markers,
            }),
            Self::Google => Box::new(GoogleStaticMapUrls {
                base_url: base_url.unwrap_or_else(|| GoogleStaticMapUrls::BASE_URL.to_string()),
                map_type,
                markers,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapType {
    #[default]
    Roadmap,
    Satellite,
    Hybrid,
    Terrain,
}

impl MapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roadmap => "roadmap",
            Self::Satellite => "satellite",
            Self::Hybrid => "hybrid",
            Self::Terrain => "terrain",
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled pin rendered into the map image by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub position: GeoCoord,
    #[serde(default = "Marker::default_label")]
    pub label: char,
    /// RGB
    #[serde(default = "Marker::default_color")]
    pub color: [u8; 3],
}

impl Marker {
    pub fn new(position: GeoCoord) -> Self {
        Self {
            position,
            label: Self::default_label(),
            color: Self::default_color(),
        }
    }

    pub fn with_label(mut self, label: char) -> Self {
        self.label = label;
        self
    }

    pub fn with_color(mut self, r: u8, g: u8, b: u8) -> Self {
        self.color = [r, g, b];
        self
    }

    /// `0xRRGGBB`
    pub fn color_hex(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}", self.color[0], self.color[1], self.color[2])
    }

    fn default_label() -> char {
        'A'
    }

    fn default_color() -> [u8; 3] {
        [255, 0, 0]
    }
}

/// Trait representing anything that can produce a map-image URL for a
/// center, zoom level and image size.
pub trait UrlBuilder: Send + Sync {
    fn build_url(&self, center: GeoCoord, zoom: u8, width_px: u32, height_px: u32) -> String;

    fn provider(&self) -> MapProvider;
}

/// Ordered `key=value` pairs; empty values are skipped.
#[derive(Debug, Default)]
struct UrlQuery {
    params: Vec<(&'static str, String)>,
}

impl UrlQuery {
    fn add(&mut self, key: &'static str, value: impl ToString) -> &mut Self {
        self.params.push((key, value.to_string()));
        self
    }

    fn to_url(&self, base: &str) -> String {
        let query = self
            .params
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            base.to_string()
        } else {
            format!("{}?{}", base, query)
        }
    }
}

/// staticmap.openstreetmap.de style endpoint
#[derive(Debug, Clone)]
pub struct OsmStaticMapLiteUrls {
    pub base_url: String,
    pub map_type: MapType,
    pub markers: Vec<Marker>,
}

impl OsmStaticMapLiteUrls {
    pub const BASE_URL: &'static str = "http://staticmap.openstreetmap.de/staticmap.php";
}

impl UrlBuilder for OsmStaticMapLiteUrls {
    fn build_url(&self, center: GeoCoord, zoom: u8, width_px: u32, height_px: u32) -> String {
        let markers = self
            .markers
            .iter()
            .map(|m| format!("{},ol-marker", m.position))
            .collect::<Vec<_>>()
            .join("%7C");

        let mut query = UrlQuery::default();
        query
            .add("zoom", zoom)
            .add("center", center)
            .add("maptype", self.map_type)
            .add("size", format!("{}x{}", width_px, height_px))
            .add("markers", markers);
        query.to_url(&self.base_url)
    }

    fn provider(&self) -> MapProvider {
        MapProvider::OsmStaticMapLite
    }
}

/// Google static maps API endpoint
#[derive(Debug, Clone)]
pub struct GoogleStaticMapUrls {
    pub base_url: String,
    pub map_type: MapType,
    pub markers: Vec<Marker>,
}

impl GoogleStaticMapUrls {
    pub const BASE_URL: &'static str = "http://maps.google.com/maps/api/staticmap";
}

impl UrlBuilder for GoogleStaticMapUrls {
    fn build_url(&self, center: GeoCoord, zoom: u8, width_px: u32, height_px: u32) -> String {
        let mut query = UrlQuery::default();
        query
            .add("zoom", zoom)
            .add("center", center)
            .add("maptype", self.map_type)
            .add("size", format!("{}x{}", width_px, height_px));
        for marker in &self.markers {
            query.add(
                "markers",
                format!(
                    "color:{}%7Clabel:{}%7C{}",
                    marker.color_hex(),
                    marker.label,
                    marker.position
                ),
            );
        }
        query.add("sensor", false);
        query.to_url(&self.base_url)
    }

    fn provider(&self) -> MapProvider {
        MapProvider::Google
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_url() {
        let builder = MapProvider::OsmStaticMapLite.url_builder(MapType::Roadmap, vec![], None);
        let url = builder.build_url(GeoCoord::new(51.5, 13.25), 12, 256, 256);
        assert_eq!(
            url,
            "http://staticmap.openstreetmap.de/staticmap.php?zoom=12&center=51.5,13.25&maptype=roadmap&size=256x256"
        );
        assert_eq!(builder.provider(), MapProvider::OsmStaticMapLite);
    }

    #[test]
    fn test_google_url_with_marker() {
        let marker = Marker::new(GeoCoord::new(1.0, 2.0))
            .with_label('S')
            .with_color(0, 128, 255);
        let builder = MapProvider::Google.url_builder(
            MapType::Satellite,
            vec![marker],
            Some("http://localhost/static".into()),
        );
        let url = builder.build_url(GeoCoord::new(0.0, 0.0), 3, 256, 128);
        assert_eq!(
            url,
            "http://localhost/static?zoom=3&center=0,0&maptype=satellite&size=256x128\
             &markers=color:0x0080FF%7Clabel:S%7C1,2&sensor=false"
        );
    }

    #[test]
    fn test_marker_defaults() {
        let marker: Marker = serde_json::from_str(r#"{"position":{"latitude":1.0,"longitude":2.0}}"#).unwrap();
        assert_eq!(marker.label, 'A');
        assert_eq!(marker.color_hex(), "0xFF0000");
        assert_eq!(MapType::Terrain.to_string(), "terrain");
    }
}
