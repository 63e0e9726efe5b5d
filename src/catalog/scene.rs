use super::error::ServiceError;
use crate::geometry::Polygon;
use crate::raster::{Band, GeoTransform, Image, SYSTEM_INDEX, TIME_START};
use crate::time::timestamp_from_product_id;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One band of a scene file, row-major integer digital numbers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BandRecord {
    pub name: String,
    pub values: Vec<u16>,
}

/// The on-disk form of one scene in a snapshot directory.
///
/// ```json
/// {
///   "id": "20190503T105031_20190503T105347_T31UFU",
///   "collection": "COPERNICUS/S2_SR",
///   "properties": { "CLOUDY_PIXEL_PERCENTAGE": 12.3 },
///   "transform": { "originLon": 5.0, "originLat": 52.2, "pixelWidth": 0.01, "pixelHeight": 0.01 },
///   "width": 20,
///   "height": 20,
///   "bands": [ { "name": "B4", "values": [ ... ] }, { "name": "SCL", "values": [ ... ] } ]
/// }
/// ```
///
/// `footprint` is optional and defaults to the grid extent. When `properties` has no
/// `system:time_start`, it is derived from the sensing time encoded in `id`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRecord {
    pub id: String,
    pub collection: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<Polygon>,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<BandRecord>,
}

impl SceneRecord {
    pub fn read(path: &Path) -> Result<Self, ServiceError> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|source| ServiceError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ServiceError::Json {
            path: display,
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), ServiceError> {
        let display = path.display().to_string();
        let file = File::create(path).map_err(|source| ServiceError::Io {
            path: display.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|source| ServiceError::Json {
            path: display.clone(),
            source,
        })?;
        writer.flush().map_err(|source| ServiceError::Io {
            path: display,
            source,
        })
    }

    /// Captures an image as a scene record. Masked pixels are written as 0.
    pub fn from_image(id: impl Into<String>, collection: impl Into<String>, image: &Image) -> Self {
        let (height, width) = image.dim();
        let bands = image
            .bands()
            .iter()
            .map(|band| BandRecord {
                name: band.name.clone(),
                values: band
                    .data
                    .iter()
                    .zip(band.mask.iter())
                    .map(|(&v, &valid)| {
                        if valid {
                            v.round().clamp(0.0, 65535.0) as u16
                        } else {
                            0
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            id: id.into(),
            collection: collection.into(),
            properties: image.properties().clone(),
            footprint: Some(image.footprint().clone()),
            transform: *image.transform(),
            width,
            height,
            bands,
        }
    }

    /// Builds the in-memory image, filling `system:index` and `system:time_start` when absent.
    pub fn into_image(self) -> Result<Image, ServiceError> {
        let invalid = |reason: String| ServiceError::InvalidScene {
            scene: self.id.clone(),
            reason,
        };

        let pixels = self.width.checked_mul(self.height).ok_or_else(|| {
            invalid(format!(
                "grid of {}x{} pixels is too large",
                self.width, self.height
            ))
        })?;

        let mut bands = Vec::with_capacity(self.bands.len());
        for record in &self.bands {
            if record.values.len() != pixels {
                return Err(invalid(format!(
                    "band {} has {} values, expected {}x{}",
                    record.name,
                    record.values.len(),
                    self.width,
                    self.height
                )));
            }
            let data = Array2::from_shape_vec(
                (self.height, self.width),
                record.values.iter().map(|&v| f32::from(v)).collect(),
            )
            .map_err(|e| invalid(e.to_string()))?;
            bands.push(Band::new(record.name.clone(), data));
        }

        let mut properties = self.properties.clone();
        properties
            .entry(SYSTEM_INDEX)
            .or_insert_with(|| Value::from(self.id.clone()));
        if !properties.contains_key(TIME_START) {
            if let Some(time) = timestamp_from_product_id(&self.id) {
                properties.insert(TIME_START.to_string(), time.timestamp_millis().into());
            }
        }

        let footprint = match &self.footprint {
            Some(footprint) => footprint.clone(),
            None => Polygon::from_bounds(self.transform.bounds(self.height, self.width))
                .map_err(|e| invalid(e.to_string()))?,
        };

        Image::new(bands, self.transform, footprint, properties).map_err(|e| invalid(e.to_string()))
    }
}
