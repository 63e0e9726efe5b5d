//! In-memory raster images: named bands on a shared pixel grid plus a property map.

use crate::geometry::{BoundingBox, Polygon};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Milliseconds since the Unix epoch at which the scene was acquired.
pub const TIME_START: &str = "system:time_start";
/// Milliseconds since the Unix epoch of the last contributing scene.
pub const TIME_END: &str = "system:time_end";
/// The scene identifier, e.g. `20190503T105031_20190503T105347_T31UFU`.
pub const SYSTEM_INDEX: &str = "system:index";

#[derive(Error, Debug, PartialEq)]
pub enum RasterError {
    #[error("Band '{band}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        band: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Image has no band named '{0}'")]
    MissingBand(String),

    #[error("Band '{0}' is listed more than once")]
    DuplicateBand(String),

    #[error("An image needs at least one band")]
    NoBands,
}

/// Maps pixel indices to geographic coordinates.
///
/// `origin_lon`/`origin_lat` is the top-left corner of the top-left pixel; rows grow
/// southwards and columns eastwards.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoTransform {
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_lon + (col as f64 + 0.5) * self.pixel_width,
            self.origin_lat - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    pub fn bounds(&self, height: usize, width: usize) -> BoundingBox {
        BoundingBox {
            west: self.origin_lon,
            south: self.origin_lat - height as f64 * self.pixel_height,
            east: self.origin_lon + width as f64 * self.pixel_width,
            north: self.origin_lat,
        }
    }
}

/// A single raster band with its validity mask. `mask[[r, c]] == false` means no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub data: Array2<f32>,
    pub mask: Array2<bool>,
}

impl Band {
    /// A band where every pixel is valid.
    pub fn new(name: impl Into<String>, data: Array2<f32>) -> Self {
        let mask = Array2::from_elem(data.dim(), true);
        Self {
            name: name.into(),
            data,
            mask,
        }
    }

    pub fn with_mask(
        name: impl Into<String>,
        data: Array2<f32>,
        mask: Array2<bool>,
    ) -> Result<Self, RasterError> {
        let name = name.into();
        if mask.dim() != data.dim() {
            return Err(RasterError::ShapeMismatch {
                band: name,
                expected: data.dim(),
                found: mask.dim(),
            });
        }
        Ok(Self { name, data, mask })
    }

    /// The pixel value, or `None` for no-data.
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        match self.mask.get((row, col)) {
            Some(true) => self.data.get((row, col)).copied(),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&valid| valid).count()
    }

    /// ANDs `mask` into the band's own mask.
    pub(crate) fn update_mask(&mut self, mask: &Array2<bool>) {
        Zip::from(&mut self.mask)
            .and(mask)
            .for_each(|own, &other| *own = *own && other);
    }
}

/// A multi-band image on a single pixel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    bands: Vec<Band>,
    transform: GeoTransform,
    footprint: Polygon,
    properties: Map<String, Value>,
}

impl Image {
    /// # Errors
    ///
    /// * [`RasterError::NoBands`] if `bands` is empty.
    /// * [`RasterError::ShapeMismatch`] if the bands do not share one shape.
    /// * [`RasterError::DuplicateBand`] if two bands have the same name.
    pub fn new(
        bands: Vec<Band>,
        transform: GeoTransform,
        footprint: Polygon,
        properties: Map<String, Value>,
    ) -> Result<Self, RasterError> {
        let first = bands.first().ok_or(RasterError::NoBands)?;
        let expected = first.data.dim();
        for (i, band) in bands.iter().enumerate() {
            if band.data.dim() != expected {
                return Err(RasterError::ShapeMismatch {
                    band: band.name.clone(),
                    expected,
                    found: band.data.dim(),
                });
            }
            if bands[..i].iter().any(|b| b.name == band.name) {
                return Err(RasterError::DuplicateBand(band.name.clone()));
            }
        }
        Ok(Self {
            bands,
            transform,
            footprint,
            properties,
        })
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// `(height, width)` in pixels.
    pub fn dim(&self) -> (usize, usize) {
        self.bands[0].data.dim()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn footprint(&self) -> &Polygon {
        &self.footprint
    }

    pub fn bounds(&self) -> BoundingBox {
        let (height, width) = self.dim();
        self.transform.bounds(height, width)
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn id(&self) -> Option<&str> {
        self.property(SYSTEM_INDEX).and_then(Value::as_str)
    }

    pub fn time_start(&self) -> Option<i64> {
        self.property(TIME_START).and_then(Value::as_i64)
    }

    /// True when both images share shape and geotransform, so pixels line up one to one.
    pub fn same_grid(&self, other: &Image) -> bool {
        self.dim() == other.dim() && self.transform == other.transform
    }

    /// Keeps only the listed bands, in the listed order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Image, RasterError> {
        let mut bands = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let band = self
                .band(name)
                .ok_or_else(|| RasterError::MissingBand(name.to_string()))?;
            bands.push(band.clone());
        }
        Image::new(
            bands,
            self.transform,
            self.footprint.clone(),
            self.properties.clone(),
        )
    }

    /// Adds a band, replacing an existing band of the same name.
    pub fn add_band(&mut self, band: Band) -> Result<(), RasterError> {
        if band.data.dim() != self.dim() {
            return Err(RasterError::ShapeMismatch {
                band: band.name,
                expected: self.dim(),
                found: band.data.dim(),
            });
        }
        match self.bands.iter_mut().find(|b| b.name == band.name) {
            Some(existing) => *existing = band,
            None => self.bands.push(band),
        }
        Ok(())
    }

    /// ANDs `mask` into every band.
    pub fn update_mask(&mut self, mask: &Array2<bool>) -> Result<(), RasterError> {
        if mask.dim() != self.dim() {
            return Err(RasterError::ShapeMismatch {
                band: "<mask>".to_string(),
                expected: self.dim(),
                found: mask.dim(),
            });
        }
        for band in &mut self.bands {
            band.update_mask(mask);
        }
        Ok(())
    }

    /// Masks every pixel whose centre lies outside `aoi`.
    ///
    /// The grid is unchanged; clipping only removes data.
    pub fn clip(&self, aoi: &Polygon) -> Image {
        let (height, width) = self.dim();
        let inside = Array2::from_shape_fn((height, width), |(row, col)| {
            let (lon, lat) = self.transform.pixel_center(row, col);
            aoi.contains(lon, lat)
        });
        let mut clipped = self.clone();
        for band in &mut clipped.bands {
            band.update_mask(&inside);
        }
        clipped
    }

    /// Applies `f` to every band value, keeping masks.
    pub(crate) fn map_values(&mut self, f: impl Fn(f32) -> f32) {
        for band in &mut self.bands {
            band.data.mapv_inplace(&f);
        }
    }

    /// Drops every property not listed in `keys`.
    pub(crate) fn retain_properties(&mut self, keys: &[&str]) {
        self.properties.retain(|key, _| keys.contains(&key.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn transform() -> GeoTransform {
        GeoTransform {
            origin_lon: 0.0,
            origin_lat: 2.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
        }
    }

    fn image() -> Image {
        let footprint = Polygon::from_bounds(transform().bounds(2, 2)).unwrap();
        let mut properties = Map::new();
        properties.insert(TIME_START.to_string(), Value::from(1_556_880_631_000_i64));
        properties.insert("CLOUDY_PIXEL_PERCENTAGE".to_string(), Value::from(12.5));
        Image::new(
            vec![
                Band::new("B2", array![[1.0, 2.0], [3.0, 4.0]]),
                Band::new("B3", array![[5.0, 6.0], [7.0, 8.0]]),
            ],
            transform(),
            footprint,
            properties,
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_center_and_bounds() {
        let t = transform();
        assert_eq!(t.pixel_center(0, 0), (0.5, 1.5));
        assert_eq!(t.pixel_center(1, 1), (1.5, 0.5));
        let bounds = t.bounds(2, 2);
        assert_eq!((bounds.west, bounds.south, bounds.east, bounds.north), (0.0, 0.0, 2.0, 2.0));
    }

    #[test]
    fn test_rejects_mismatched_band_shapes() {
        let footprint = Polygon::from_bounds(transform().bounds(2, 2)).unwrap();
        let result = Image::new(
            vec![
                Band::new("B2", array![[1.0, 2.0], [3.0, 4.0]]),
                Band::new("B3", array![[1.0, 2.0]]),
            ],
            transform(),
            footprint,
            Map::new(),
        );
        assert!(matches!(result, Err(RasterError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_duplicate_bands() {
        let footprint = Polygon::from_bounds(transform().bounds(1, 1)).unwrap();
        let result = Image::new(
            vec![Band::new("B2", array![[1.0]]), Band::new("B2", array![[2.0]])],
            transform(),
            footprint,
            Map::new(),
        );
        assert_eq!(result, Err(RasterError::DuplicateBand("B2".to_string())));
    }

    #[test]
    fn test_select_orders_and_validates() {
        let img = image();
        let selected = img.select(&["B3", "B2"]).unwrap();
        assert_eq!(selected.band_names(), vec!["B3", "B2"]);
        assert_eq!(selected.time_start(), Some(1_556_880_631_000));
        assert_eq!(
            img.select(&["SCL"]),
            Err(RasterError::MissingBand("SCL".to_string()))
        );
    }

    #[test]
    fn test_clip_masks_outside_pixels() {
        let img = image();
        // Left column only.
        let aoi = Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 2.0), (0.0, 2.0)]).unwrap();
        let clipped = img.clip(&aoi);
        let b2 = clipped.band("B2").unwrap();
        assert_eq!(b2.value(0, 0), Some(1.0));
        assert_eq!(b2.value(0, 1), None);
        assert_eq!(b2.value(1, 0), Some(3.0));
        assert_eq!(b2.valid_count(), 2);
        assert_eq!(clipped.dim(), img.dim());
    }

    #[test]
    fn test_add_band_replaces_same_name() {
        let mut img = image();
        img.add_band(Band::new("B2", array![[0.0, 0.0], [0.0, 0.0]]))
            .unwrap();
        assert_eq!(img.bands().len(), 2);
        assert_eq!(img.band("B2").unwrap().value(1, 1), Some(0.0));

        let wrong = img.add_band(Band::new("NDVI", array![[0.0]]));
        assert!(matches!(wrong, Err(RasterError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_retain_properties() {
        let mut img = image();
        img.retain_properties(&[TIME_START]);
        assert_eq!(img.properties().len(), 1);
        assert!(img.property("CLOUDY_PIXEL_PERCENTAGE").is_none());
    }
}
