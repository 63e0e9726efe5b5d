//! Map documents: a basemap, a view, and a stack of vector and raster layers.
mod html;
mod vis;

pub use vis::VisParams;

use crate::geometry::{BoundingBox, Polygon};
use crate::raster::Image;
use bon::bon;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub const MIN_ZOOM: u8 = 1;
pub const MAX_ZOOM: u8 = 18;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Image layers need 1 or 3 bands, got {0}")]
    BandCount(usize),

    #[error("Image has no band named '{0}'")]
    MissingBand(String),

    #[error("Stretch range is empty: min {min} >= max {max}")]
    InvalidStretch { min: f32, max: f32 },

    #[error("Gamma must be positive, got {0}")]
    InvalidGamma(f32),

    #[error("Zoom {0} is outside {MIN_ZOOM}..={MAX_ZOOM}")]
    InvalidZoom(u8),

    #[error("Center ({lon}, {lat}) is not a valid coordinate")]
    InvalidCenter { lon: f64, lat: f64 },

    #[error("Unknown basemap '{0}'")]
    UnknownBasemap(String),

    #[error("Failed to serialise map document")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write map file")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Basemap {
    #[default]
    OpenStreetMap,
    Satellite,
    Terrain,
}

impl Basemap {
    pub fn tile_url(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            Self::Satellite => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
            Self::Terrain => "https://tile.opentopomap.org/{z}/{x}/{y}.png",
        }
    }

    pub fn attribution(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "&copy; OpenStreetMap contributors",
            Self::Satellite => "Tiles &copy; Esri",
            Self::Terrain => "&copy; OpenStreetMap contributors, SRTM | &copy; OpenTopoMap",
        }
    }
}

impl fmt::Display for Basemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenStreetMap => "openstreetmap",
            Self::Satellite => "satellite",
            Self::Terrain => "terrain",
        })
    }
}

impl FromStr for Basemap {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openstreetmap" | "osm" | "roadmap" => Ok(Self::OpenStreetMap),
            "satellite" | "hybrid" => Ok(Self::Satellite),
            "terrain" => Ok(Self::Terrain),
            _ => Err(RenderError::UnknownBasemap(s.to_string())),
        }
    }
}

/// What a layer draws.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LayerSource {
    /// An outline, `(lon, lat)` pairs.
    Vector { ring: Vec<(f64, f64)> },
    /// Row-major RGBA pixels covering `bounds`.
    Raster {
        width: usize,
        height: usize,
        bounds: BoundingBox,
        rgba: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub label: String,
    pub color: String,
    pub source: LayerSource,
}

/// Anything that can be placed on a map.
pub trait Renderable {
    fn bounds(&self) -> BoundingBox;

    fn to_layer_source(&self, vis: &VisParams) -> Result<LayerSource, RenderError>;
}

impl Renderable for Polygon {
    fn bounds(&self) -> BoundingBox {
        Polygon::bounds(self)
    }

    fn to_layer_source(&self, _vis: &VisParams) -> Result<LayerSource, RenderError> {
        Ok(LayerSource::Vector {
            ring: self.vertices().to_vec(),
        })
    }
}

impl Renderable for Image {
    fn bounds(&self) -> BoundingBox {
        Image::bounds(self)
    }

    fn to_layer_source(&self, vis: &VisParams) -> Result<LayerSource, RenderError> {
        let (height, width) = self.dim();
        Ok(LayerSource::Raster {
            width,
            height,
            bounds: Image::bounds(self),
            rgba: vis.to_rgba(self)?,
        })
    }
}

/// Zoom level at which an extent of `extent_deg` degrees roughly fills the view.
pub fn zoom_for_extent(extent_deg: f64) -> u8 {
    if !extent_deg.is_finite() || extent_deg <= 0.0 {
        return MAX_ZOOM;
    }
    let zoom = (360.0 / extent_deg).log2().floor();
    zoom.clamp(f64::from(MIN_ZOOM), f64::from(MAX_ZOOM)) as u8
}

/// A map with a view and an ordered stack of layers, drawn bottom to top.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "MapFields", into = "MapFields")]
pub struct MapHandle {
    center: (f64, f64),
    zoom: u8,
    basemap: Basemap,
    layers: Vec<Layer>,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct MapFields {
    center: (f64, f64),
    zoom: u8,
    #[serde(default)]
    basemap: Basemap,
    #[serde(default)]
    layers: Vec<Layer>,
}

impl TryFrom<MapFields> for MapHandle {
    type Error = RenderError;

    fn try_from(fields: MapFields) -> Result<Self, Self::Error> {
        let mut map = MapHandle::builder()
            .center(fields.center)
            .zoom(fields.zoom)
            .basemap(fields.basemap)
            .build()?;
        map.layers = fields.layers;
        Ok(map)
    }
}

impl From<MapHandle> for MapFields {
    fn from(map: MapHandle) -> Self {
        Self {
            center: map.center,
            zoom: map.zoom,
            basemap: map.basemap,
            layers: map.layers,
        }
    }
}

#[bon]
impl MapHandle {
    /// Creates an empty map.
    ///
    /// # Builder Arguments
    ///
    /// * `center: (f64, f64)` - (Default: `(0.0, 0.0)`) Initial view centre as `(lon, lat)`.
    /// * `zoom: u8` - (Default: `2`) Initial zoom level, `1..=18`.
    /// * `basemap: Basemap` - (Default: `OpenStreetMap`) Background tiles.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidZoom`] or [`RenderError::InvalidCenter`] for an
    /// impossible view.
    #[builder]
    pub fn new(
        #[builder(default = (0.0, 0.0))] center: (f64, f64),
        #[builder(default = 2)] zoom: u8,
        #[builder(default)] basemap: Basemap,
    ) -> Result<Self, RenderError> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
            return Err(RenderError::InvalidZoom(zoom));
        }
        let (lon, lat) = center;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(RenderError::InvalidCenter { lon, lat });
        }
        Ok(Self {
            center,
            zoom,
            basemap,
            layers: Vec::new(),
        })
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn basemap(&self) -> Basemap {
        self.basemap
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Draws `entity` on top of the existing layers.
    pub fn add_layer(
        &mut self,
        entity: &impl Renderable,
        vis: &VisParams,
        label: impl Into<String>,
    ) -> Result<&mut Self, RenderError> {
        let label = label.into();
        let source = entity.to_layer_source(vis)?;
        info!("Adding layer '{}' to map", label);
        self.layers.push(Layer {
            label,
            color: vis.color().to_string(),
            source,
        });
        Ok(self)
    }

    /// Centres the view on `entity` and zooms so that it fits.
    pub fn center_on(&mut self, entity: &impl Renderable) -> &mut Self {
        let bounds = entity.bounds();
        self.center = bounds.center();
        self.zoom = zoom_for_extent(bounds.width().max(bounds.height()));
        self
    }

    pub fn to_json(&self) -> Result<String, RenderError> {
        Ok(serde_json::to_string(self)?)
    }

    /// A self-contained Leaflet page showing the map.
    pub fn to_html(&self) -> Result<String, RenderError> {
        html::render_page(self)
    }

    pub fn write_html(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_html()?)?;
        info!("Wrote map with {} layers to {}", self.layers.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Band, GeoTransform};
    use ndarray::array;
    use serde_json::Map;

    fn aoi() -> Polygon {
        Polygon::new(vec![(5.0, 52.0), (5.2, 52.0), (5.2, 52.1), (5.0, 52.1)]).unwrap()
    }

    fn rgb_image() -> Image {
        let transform = GeoTransform {
            origin_lon: 5.0,
            origin_lat: 52.1,
            pixel_width: 0.1,
            pixel_height: 0.1,
        };
        let footprint = Polygon::from_bounds(transform.bounds(1, 2)).unwrap();
        Image::new(
            vec![
                Band::new("B4", array![[0.0, 0.3]]),
                Band::new("B3", array![[0.5, 0.3]]),
                Band::with_mask("B2", array![[1.0, 0.0]], array![[true, false]]).unwrap(),
            ],
            transform,
            footprint,
            Map::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_builder_defaults_and_validation() {
        let map = MapHandle::builder().build().unwrap();
        assert_eq!(map.center(), (0.0, 0.0));
        assert_eq!(map.zoom(), 2);
        assert_eq!(map.basemap(), Basemap::OpenStreetMap);

        assert!(matches!(
            MapHandle::builder().zoom(0).build(),
            Err(RenderError::InvalidZoom(0))
        ));
        assert!(matches!(
            MapHandle::builder().center((0.0, 95.0)).build(),
            Err(RenderError::InvalidCenter { .. })
        ));
    }

    #[test]
    fn test_center_on_fits_extent() {
        let mut map = MapHandle::builder().build().unwrap();
        map.center_on(&aoi());
        let (lon, lat) = map.center();
        assert!((lon - 5.1).abs() < 1e-9);
        assert!((lat - 52.05).abs() < 1e-9);
        // 360 / 0.2 = 1800 -> log2 ~ 10.8
        assert_eq!(map.zoom(), 10);
    }

    #[test]
    fn test_zoom_for_extent_clamps() {
        assert_eq!(zoom_for_extent(360.0), MIN_ZOOM);
        assert_eq!(zoom_for_extent(1e-9), MAX_ZOOM);
        assert_eq!(zoom_for_extent(0.0), MAX_ZOOM);
        assert_eq!(zoom_for_extent(1.0), 8);
    }

    #[test]
    fn test_layers_stack_in_order() {
        let mut map = MapHandle::builder().basemap(Basemap::Satellite).build().unwrap();
        let vis = VisParams::builder()
            .bands(vec!["B4".into(), "B3".into(), "B2".into()])
            .build()
            .unwrap();
        map.add_layer(&rgb_image(), &vis, "RGB")
            .unwrap()
            .add_layer(&aoi(), &VisParams::default(), "AOI")
            .unwrap();

        let labels: Vec<&str> = map.layers().iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["RGB", "AOI"]);
        match &map.layers()[0].source {
            LayerSource::Raster { width, height, rgba, .. } => {
                assert_eq!((*width, *height), (2, 1));
                assert_eq!(&rgba[..4], &[0, 128, 255, 255]);
                assert_eq!(rgba[7], 0, "masked pixel is transparent");
            }
            other => panic!("expected a raster layer, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_band_is_reported() {
        let mut map = MapHandle::builder().build().unwrap();
        let vis = VisParams::builder()
            .bands(vec!["B8".into()])
            .build()
            .unwrap();
        assert!(matches!(
            map.add_layer(&rgb_image(), &vis, "NIR"),
            Err(RenderError::MissingBand(b)) if b == "B8"
        ));
        assert!(map.layers().is_empty());
    }

    #[test]
    fn test_basemap_parse() {
        assert_eq!("HYBRID".parse::<Basemap>().unwrap(), Basemap::Satellite);
        assert!("moon".parse::<Basemap>().is_err());
    }

    #[test]
    fn test_deserialize_rejects_invalid_view() {
        assert!(serde_json::from_str::<MapHandle>(r#"{"center":[5.0,52.0],"zoom":30}"#).is_err());
        assert!(serde_json::from_str::<MapHandle>(r#"{"center":[5.0,95.0],"zoom":3}"#).is_err());
        let map: MapHandle = serde_json::from_str(r#"{"center":[5.0,52.0],"zoom":3}"#).unwrap();
        assert_eq!(map.zoom(), 3);
        assert!(map.layers().is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut map = MapHandle::builder().build().unwrap();
        map.add_layer(&aoi(), &VisParams::default(), "AOI").unwrap();
        let parsed: MapHandle = serde_json::from_str(&map.to_json().unwrap()).unwrap();
        assert_eq!(parsed, map);
    }
}
