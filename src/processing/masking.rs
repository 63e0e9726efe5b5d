use crate::processing::error::MaskError;
use crate::raster::{Image, SYSTEM_INDEX, TIME_START};
use bon::bon;
use ndarray::Zip;

/// Name of the Sentinel-2 L2A scene classification band.
pub const SCL_BAND: &str = "SCL";
/// Surface reflectance is stored as integers scaled by this factor.
pub const REFLECTANCE_SCALE: f32 = 10_000.0;

/// Whether a scene classification code marks a usable surface pixel.
///
/// Codes 4 (vegetation), 5 (not vegetated), 6 (water) and 7 (unclassified) are kept.
/// Everything else is dropped: 0 no data, 1 saturated or defective, 2 dark area,
/// 3 cloud shadow, 8 and 9 cloud, 10 thin cirrus, 11 snow.
pub fn is_valid_scl(code: i64) -> bool {
    code > 3 && code < 8
}

fn is_valid_scl_value(value: f32) -> bool {
    value.fract() == 0.0 && is_valid_scl(value as i64)
}

/// Settings for [`mask_and_scale`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOptions {
    scl_band: String,
    scale: f32,
    copy_properties: Vec<String>,
}

#[bon]
impl MaskOptions {
    /// # Builder Arguments
    ///
    /// * `scl_band: String` - (Default: `"SCL"`) The classification band the mask is derived from.
    /// * `scale: f32` - (Default: `10000.0`) Every band value is divided by this.
    /// * `copy_properties: Vec<String>` - (Default: `system:time_start`, `system:index`) The
    ///   properties carried over to the masked image. All others are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::InvalidScale`] when `scale` is zero, negative or not finite.
    #[builder]
    pub fn new(
        #[builder(into, default = SCL_BAND.to_string())] scl_band: String,
        #[builder(default = REFLECTANCE_SCALE)] scale: f32,
        #[builder(default = vec![TIME_START.to_string(), SYSTEM_INDEX.to_string()])]
        copy_properties: Vec<String>,
    ) -> Result<Self, MaskError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(MaskError::InvalidScale(scale));
        }
        Ok(Self {
            scl_band,
            scale,
            copy_properties,
        })
    }

    pub fn scl_band(&self) -> &str {
        &self.scl_band
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            scl_band: SCL_BAND.to_string(),
            scale: REFLECTANCE_SCALE,
            copy_properties: vec![TIME_START.to_string(), SYSTEM_INDEX.to_string()],
        }
    }
}

/// Masks clouds, shadows and snow in one scene and rescales it to reflectance.
///
/// A pixel stays valid only when its classification code passes [`is_valid_scl`] and the
/// classification pixel itself is valid (a clipped-away classification pixel masks every
/// band). All bands, the classification band included, are divided by the scale.
/// Only the properties listed in the options survive.
///
/// # Errors
///
/// Returns [`MaskError::MissingClassificationBand`] when the scene has no classification band.
pub fn mask_and_scale(image: &Image, options: &MaskOptions) -> Result<Image, MaskError> {
    let scl = image
        .band(&options.scl_band)
        .ok_or_else(|| MaskError::MissingClassificationBand {
            scene: image.id().unwrap_or("<unnamed>").to_string(),
            band: options.scl_band.clone(),
        })?;

    let validity = Zip::from(&scl.data)
        .and(&scl.mask)
        .map_collect(|&code, &valid| valid && is_valid_scl_value(code));

    let mut masked = image.clone();
    masked.update_mask(&validity)?;
    let scale = options.scale;
    masked.map_values(|v| v / scale);

    let keep: Vec<&str> = options.copy_properties.iter().map(String::as_str).collect();
    masked.retain_properties(&keep);
    Ok(masked)
}
