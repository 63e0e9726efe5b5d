//! Spectral index bands (NDVI, EVI, kNDVI) computed per pixel.

use crate::processing::error::SpectralError;
use crate::raster::{Band, Image};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SpectralIndex {
    #[serde(rename = "NDVI")]
    Ndvi,
    #[serde(rename = "EVI")]
    Evi,
    #[serde(rename = "kNDVI")]
    Kndvi,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 3] = [Self::Ndvi, Self::Evi, Self::Kndvi];

    /// The band name the index is stored under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Evi => "EVI",
            Self::Kndvi => "kNDVI",
        }
    }

    pub fn formula(&self) -> &'static str {
        match self {
            Self::Ndvi => "(NIR - RED) / (NIR + RED)",
            Self::Evi => "2.5 * (NIR - RED) / (NIR + 6*RED - 7.5*BLUE + 1)",
            Self::Kndvi => "tanh(((NIR - RED) / (2 * sigma)) ** 2)",
        }
    }

    pub fn reference(&self) -> &'static str {
        match self {
            Self::Ndvi => "https://doi.org/10.1016/S0176-1617(11)81633-0",
            Self::Evi => "https://doi.org/10.1016/S0034-4257(96)00112-5",
            Self::Kndvi => "https://doi.org/10.1126/sciadv.abc7447",
        }
    }

    /// Generic band names used by the formula.
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            Self::Ndvi | Self::Kndvi => &["NIR", "RED"],
            Self::Evi => &["NIR", "RED", "BLUE"],
        }
    }

    fn default_params(&self) -> &'static [(&'static str, f32)] {
        match self {
            Self::Kndvi => &[("sigma", 0.5)],
            Self::Ndvi | Self::Evi => &[],
        }
    }

    fn evaluate(&self, inputs: &[f32], params: &HashMap<&str, f32>) -> f32 {
        let nir = inputs[0];
        let red = inputs[1];
        match self {
            Self::Ndvi => (nir - red) / (nir + red),
            Self::Evi => {
                let blue = inputs[2];
                2.5 * (nir - red) / (nir + 6.0 * red - 7.5 * blue + 1.0)
            }
            Self::Kndvi => {
                let sigma = params.get("sigma").copied().unwrap_or(0.5);
                ((nir - red) / (2.0 * sigma)).powi(2).tanh()
            }
        }
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpectralIndex {
    type Err = SpectralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|index| index.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SpectralError::UnknownIndex(s.to_string()))
    }
}

/// Adds spectral index bands to images.
///
/// Generic band names (`NIR`, `RED`, `BLUE`) are resolved through a band map; a name
/// missing from the map is looked up as is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectralIndexCalculator {
    band_map: HashMap<String, String>,
}

impl SpectralIndexCalculator {
    pub fn new(band_map: HashMap<String, String>) -> Self {
        Self { band_map }
    }

    /// Sentinel-2 band names: `NIR` → `B8`, `RED` → `B4`, `BLUE` → `B2`.
    pub fn sentinel2() -> Self {
        Self::new(
            [("NIR", "B8"), ("RED", "B4"), ("BLUE", "B2")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Replaces or adds the given generic-name mappings and keeps the rest.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.band_map.extend(overrides);
        self
    }

    pub fn resolve<'a>(&'a self, generic: &'a str) -> &'a str {
        self.band_map.get(generic).map_or(generic, String::as_str)
    }

    /// Computes one index as a new band.
    ///
    /// The band is valid where every input is valid and the result is finite
    /// (a zero denominator gives no-data). `params` override the index defaults.
    pub fn compute_index(
        &self,
        image: &Image,
        index: SpectralIndex,
        params: &HashMap<String, f32>,
    ) -> Result<Band, SpectralError> {
        let inputs = index
            .inputs()
            .iter()
            .map(|generic| {
                let band_name = self.resolve(generic);
                image
                    .band(band_name)
                    .ok_or_else(|| SpectralError::MissingBand {
                        index: index.name().to_string(),
                        band: band_name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut merged: HashMap<&str, f32> = index.default_params().iter().copied().collect();
        merged.extend(params.iter().map(|(k, v)| (k.as_str(), *v)));

        let dim = image.dim();
        let mut data = Array2::<f32>::from_elem(dim, f32::NAN);
        let mut mask = Array2::<bool>::from_elem(dim, false);
        let mut values = Vec::with_capacity(inputs.len());
        Zip::indexed(&mut data)
            .and(&mut mask)
            .for_each(|(row, col), value, valid| {
                values.clear();
                values.extend(inputs.iter().filter_map(|band| band.value(row, col)));
                if values.len() == inputs.len() {
                    let result = index.evaluate(&values, &merged);
                    if result.is_finite() {
                        *value = result;
                        *valid = true;
                    }
                }
            });

        Ok(Band::with_mask(index.name(), data, mask)?)
    }

    /// Adds every listed index to a copy of `image`.
    pub fn add_indices(
        &self,
        image: &Image,
        indices: &[SpectralIndex],
        params: &HashMap<String, f32>,
    ) -> Result<Image, SpectralError> {
        let mut result = image.clone();
        for &index in indices {
            let band = self.compute_index(&result, index, params)?;
            result.add_band(band)?;
        }
        Ok(result)
    }
}

impl Image {
    /// Adds index bands using the Sentinel-2 band names.
    pub fn add_indices(&self, indices: &[SpectralIndex]) -> Result<Image, SpectralError> {
        SpectralIndexCalculator::sentinel2().add_indices(self, indices, &HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::array;
    use serde_json::Map;

    fn image() -> Image {
        let transform = GeoTransform {
            origin_lon: 0.0,
            origin_lat: 1.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
        };
        let footprint = Polygon::from_bounds(transform.bounds(1, 3)).unwrap();
        Image::new(
            vec![
                Band::new("B2", array![[0.05, 0.05, 0.0]]),
                Band::new("B4", array![[0.1, 0.2, 0.0]]),
                Band::with_mask("B8", array![[0.5, 0.3, 0.0]], array![[true, false, true]])
                    .unwrap(),
            ],
            transform,
            footprint,
            Map::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_ndvi() {
        let result = image().add_indices(&[SpectralIndex::Ndvi]).unwrap();
        let ndvi = result.band("NDVI").unwrap();
        assert_relative_eq!(ndvi.value(0, 0).unwrap(), 0.4 / 0.6, epsilon = 1e-6);
        // NIR masked
        assert_eq!(ndvi.value(0, 1), None);
        // 0 / 0
        assert_eq!(ndvi.value(0, 2), None);
    }

    #[test]
    fn test_evi_and_kndvi() {
        let result = image()
            .add_indices(&[SpectralIndex::Evi, SpectralIndex::Kndvi])
            .unwrap();
        let evi = result.band("EVI").unwrap().value(0, 0).unwrap();
        assert_relative_eq!(evi, 2.5 * 0.4 / (0.5 + 0.6 - 0.375 + 1.0), epsilon = 1e-6);

        let kndvi = result.band("kNDVI").unwrap().value(0, 0).unwrap();
        assert_relative_eq!(kndvi, (0.4f32 / 1.0).powi(2).tanh(), epsilon = 1e-6);
        assert_eq!(result.band_names(), vec!["B2", "B4", "B8", "EVI", "kNDVI"]);
    }

    #[test]
    fn test_params_override_defaults() {
        let calculator = SpectralIndexCalculator::sentinel2();
        let params = HashMap::from([("sigma".to_string(), 0.2)]);
        let band = calculator
            .compute_index(&image(), SpectralIndex::Kndvi, &params)
            .unwrap();
        assert_relative_eq!(
            band.value(0, 0).unwrap(),
            (0.4f32 / 0.4).powi(2).tanh(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_partial_overrides_keep_defaults() {
        let calculator = SpectralIndexCalculator::sentinel2()
            .with_overrides(HashMap::from([("NIR".to_string(), "B4".to_string())]));
        assert_eq!(calculator.resolve("NIR"), "B4");
        assert_eq!(calculator.resolve("RED"), "B4");
        assert_eq!(calculator.resolve("BLUE"), "B2");
    }

    #[test]
    fn test_unmapped_names_fall_back_to_generic() {
        let calculator = SpectralIndexCalculator::default();
        assert_eq!(calculator.resolve("NIR"), "NIR");
        let err = calculator
            .compute_index(&image(), SpectralIndex::Ndvi, &HashMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            SpectralError::MissingBand {
                index: "NDVI".to_string(),
                band: "NIR".to_string()
            }
        );
    }

    #[test]
    fn test_parse_index_names() {
        assert_eq!("ndvi".parse::<SpectralIndex>(), Ok(SpectralIndex::Ndvi));
        assert_eq!("kNDVI".parse::<SpectralIndex>(), Ok(SpectralIndex::Kndvi));
        assert_eq!(
            "SAVI".parse::<SpectralIndex>(),
            Err(SpectralError::UnknownIndex("SAVI".to_string()))
        );
    }
}
