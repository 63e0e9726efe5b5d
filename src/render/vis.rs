use super::RenderError;
use crate::raster::{Band, Image};
use bon::bon;
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// How band values map to display colours.
///
/// Values are stretched linearly from `min..max` to `0..255`, clamped, then gamma
/// corrected. One band renders as greyscale, three as RGB. A pixel that is no-data in
/// any displayed band is transparent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "VisFields", into = "VisFields")]
pub struct VisParams {
    bands: Vec<String>,
    min: f32,
    max: f32,
    gamma: f32,
    color: String,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct VisFields {
    #[serde(default)]
    bands: Vec<String>,
    min: f32,
    max: f32,
    #[serde(default = "unit_gamma")]
    gamma: f32,
    color: String,
}

fn unit_gamma() -> f32 {
    1.0
}

impl TryFrom<VisFields> for VisParams {
    type Error = RenderError;

    fn try_from(fields: VisFields) -> Result<Self, Self::Error> {
        VisParams::builder()
            .bands(fields.bands)
            .min(fields.min)
            .max(fields.max)
            .gamma(fields.gamma)
            .color(fields.color)
            .build()
    }
}

impl From<VisParams> for VisFields {
    fn from(vis: VisParams) -> Self {
        Self {
            bands: vis.bands,
            min: vis.min,
            max: vis.max,
            gamma: vis.gamma,
            color: vis.color,
        }
    }
}

#[bon]
impl VisParams {
    /// # Builder Arguments
    ///
    /// * `bands: Vec<String>` - (Default: empty) Band names to display. Needed for images only.
    /// * `min: f32` - (Default: `0.0`) Value drawn as black.
    /// * `max: f32` - (Default: `1.0`) Value drawn as full intensity.
    /// * `gamma: f32` - (Default: `1.0`) Gamma correction.
    /// * `color: String` - (Default: `"#ff0000"`) Outline colour for vector layers.
    #[builder]
    pub fn new(
        #[builder(default)] bands: Vec<String>,
        #[builder(default = 0.0)] min: f32,
        #[builder(default = 1.0)] max: f32,
        #[builder(default = 1.0)] gamma: f32,
        #[builder(default = "#ff0000".to_string(), into)] color: String,
    ) -> Result<Self, RenderError> {
        if !(min < max) {
            return Err(RenderError::InvalidStretch { min, max });
        }
        if !(gamma > 0.0) || !gamma.is_finite() {
            return Err(RenderError::InvalidGamma(gamma));
        }
        if !bands.is_empty() && bands.len() != 1 && bands.len() != 3 {
            return Err(RenderError::BandCount(bands.len()));
        }
        Ok(Self {
            bands,
            min,
            max,
            gamma,
            color,
        })
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    fn stretch(&self, value: f32) -> u8 {
        let t = ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        let t = if self.gamma == 1.0 {
            t
        } else {
            t.powf(1.0 / self.gamma)
        };
        (t * 255.0).round() as u8
    }

    /// Row-major RGBA bytes for `image`.
    pub fn to_rgba(&self, image: &Image) -> Result<Vec<u8>, RenderError> {
        let bands: Vec<&Band> = self
            .bands
            .iter()
            .map(|name| {
                image
                    .band(name)
                    .ok_or_else(|| RenderError::MissingBand(name.clone()))
            })
            .collect::<Result<_, _>>()?;
        let (red, green, blue) = match bands.as_slice() {
            [grey] => (*grey, *grey, *grey),
            [r, g, b] => (*r, *g, *b),
            other => return Err(RenderError::BandCount(other.len())),
        };

        let (height, width) = image.dim();
        let mut rgba = Vec::with_capacity(height * width * 4);
        Zip::from(&red.data)
            .and(&red.mask)
            .and(&green.data)
            .and(&green.mask)
            .and(&blue.data)
            .and(&blue.mask)
            .for_each(|&r, &rm, &g, &gm, &b, &bm| {
                let visible = rm && gm && bm && r.is_finite() && g.is_finite() && b.is_finite();
                if visible {
                    rgba.extend([self.stretch(r), self.stretch(g), self.stretch(b), 255]);
                } else {
                    rgba.extend([0, 0, 0, 0]);
                }
            });
        Ok(rgba)
    }
}

impl Default for VisParams {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            min: 0.0,
            max: 1.0,
            gamma: 1.0,
            color: "#ff0000".to_string(),
        }
    }
}
