use crate::geometry::Polygon;
use crate::processing::error::CompositeError;
use crate::raster::{Band, Image, TIME_END, TIME_START};
use ndarray::{Array2, Zip};
use serde_json::Map;
use tracing::debug;

/// Number of scenes that contributed to a composite.
pub const COMPOSITE_COUNT: &str = "composite:count";

/// Median of `values`, averaging the two middle values for an even count.
/// `NaN` entries are ignored. Returns `None` when nothing is left.
pub fn median(values: &mut Vec<f32>) -> Option<f32> {
    values.retain(|v| !v.is_nan());
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Reduces a stack of aligned images to their per-band, per-pixel median.
///
/// Each pixel's median only uses the images where that band is valid at that pixel.
/// A pixel with no valid contributor is no-data in the output (masked, value `NaN`),
/// never zero. Rows are reduced in parallel.
///
/// The composite keeps the first image's grid and band order and carries
/// `system:time_start` (earliest input), `system:time_end` (latest input) and
/// `composite:count`.
///
/// # Errors
///
/// * [`CompositeError::EmptyCollection`] if `images` is empty.
/// * [`CompositeError::GridMismatch`] if an image is on a different pixel grid.
/// * [`CompositeError::BandMismatch`] if an image has different band names or order.
pub fn median_composite(images: &[Image]) -> Result<Image, CompositeError> {
    let first = images.first().ok_or(CompositeError::EmptyCollection)?;
    let expected: Vec<String> = first.band_names().iter().map(|s| s.to_string()).collect();

    for (index, image) in images.iter().enumerate().skip(1) {
        if !image.same_grid(first) {
            return Err(CompositeError::GridMismatch { index });
        }
        let found: Vec<String> = image.band_names().iter().map(|s| s.to_string()).collect();
        if found != expected {
            return Err(CompositeError::BandMismatch {
                index,
                expected,
                found,
            });
        }
    }

    let dim = first.dim();
    debug!(
        "Reducing {} images of {}x{} pixels over bands {:?}",
        images.len(),
        dim.0,
        dim.1,
        expected
    );

    let bands = (0..expected.len())
        .map(|band_index| reduce_band(images, band_index, dim, &expected[band_index]))
        .collect::<Result<Vec<_>, _>>()?;

    let mut properties = Map::new();
    let times = images.iter().filter_map(Image::time_start);
    if let Some(start) = times.clone().min() {
        properties.insert(TIME_START.to_string(), start.into());
    }
    if let Some(end) = times.max() {
        properties.insert(TIME_END.to_string(), end.into());
    }
    properties.insert(COMPOSITE_COUNT.to_string(), images.len().into());

    let footprint =
        Polygon::from_bounds(first.bounds()).unwrap_or_else(|_| first.footprint().clone());
    Ok(Image::new(bands, *first.transform(), footprint, properties)?)
}

fn reduce_band(
    images: &[Image],
    band_index: usize,
    dim: (usize, usize),
    name: &str,
) -> Result<Band, CompositeError> {
    let mut data = Array2::<f32>::from_elem(dim, f32::NAN);
    let mut mask = Array2::<bool>::from_elem(dim, false);

    Zip::indexed(&mut data)
        .and(&mut mask)
        .par_for_each(|(row, col), value, valid| {
            let mut stack: Vec<f32> = images
                .iter()
                .filter_map(|image| image.bands()[band_index].value(row, col))
                .collect();
            if let Some(m) = median(&mut stack) {
                *value = m;
                *valid = true;
            }
        });

    Ok(Band::with_mask(name, data, mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use ndarray::array;
    use serde_json::Value;

    fn transform() -> GeoTransform {
        GeoTransform {
            origin_lon: 5.0,
            origin_lat: 52.0,
            pixel_width: 0.1,
            pixel_height: 0.1,
        }
    }

    fn image(time: i64, data: Array2<f32>, mask: Array2<bool>) -> Image {
        let footprint = Polygon::from_bounds(transform().bounds(1, 3)).unwrap();
        let mut properties = Map::new();
        properties.insert(TIME_START.to_string(), Value::from(time));
        Image::new(
            vec![Band::with_mask("B4", data, mask).unwrap()],
            transform(),
            footprint,
            properties,
        )
        .unwrap()
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut vec![f32::NAN, 5.0]), Some(5.0));
        assert_eq!(median(&mut vec![]), None);
    }

    #[test]
    fn test_composite_ignores_invalid_pixels() {
        let images = vec![
            image(3, array![[0.1, 0.9, 0.5]], array![[true, false, false]]),
            image(1, array![[0.3, 0.2, 0.5]], array![[true, true, false]]),
            image(2, array![[0.2, 0.4, 0.5]], array![[true, true, false]]),
        ];
        let composite = median_composite(&images).unwrap();
        let b4 = composite.band("B4").unwrap();

        assert_eq!(b4.value(0, 0), Some(0.2));
        // 0.9 is masked out, so the median of 0.2 and 0.4
        assert!((b4.value(0, 1).unwrap() - 0.3).abs() < 1e-6);
        // No valid contributor at all
        assert_eq!(b4.value(0, 2), None);
        assert!(b4.data[[0, 2]].is_nan(), "no-data must not be zero");
    }

    #[test]
    fn test_composite_properties() {
        let images = vec![
            image(30, array![[1.0, 1.0, 1.0]], array![[true, true, true]]),
            image(10, array![[1.0, 1.0, 1.0]], array![[true, true, true]]),
        ];
        let composite = median_composite(&images).unwrap();
        assert_eq!(composite.time_start(), Some(10));
        assert_eq!(composite.property(TIME_END).and_then(Value::as_i64), Some(30));
        assert_eq!(
            composite.property(COMPOSITE_COUNT).and_then(Value::as_u64),
            Some(2)
        );
    }

    #[test]
    fn test_empty_stack_is_an_error() {
        assert_eq!(median_composite(&[]), Err(CompositeError::EmptyCollection));
    }

    #[test]
    fn test_grid_and_band_mismatch() {
        let a = image(1, array![[1.0, 1.0, 1.0]], array![[true, true, true]]);
        let mut b = a.clone();
        b.add_band(Band::new("B3", array![[1.0, 1.0, 1.0]])).unwrap();
        assert!(matches!(
            median_composite(&[a.clone(), b]),
            Err(CompositeError::BandMismatch { index: 1, .. })
        ));

        let footprint = Polygon::from_bounds(transform().bounds(1, 2)).unwrap();
        let narrow = Image::new(
            vec![Band::new("B4", array![[1.0, 1.0]])],
            transform(),
            footprint,
            Map::new(),
        )
        .unwrap();
        assert_eq!(
            median_composite(&[a, narrow]),
            Err(CompositeError::GridMismatch { index: 1 })
        );
    }
}
