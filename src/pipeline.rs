//! The end-to-end Sentinel-2 query: filter, mask, select, sort, reduce, render.
use crate::S2CompositeError;
use crate::catalog::ImageryService;
use crate::collection::{Collection, FilterOp};
use crate::geometry::{GeometryError, Polygon};
use crate::processing::masking::MaskOptions;
use crate::raster::{Image, TIME_START};
use crate::render::{MapHandle, VisParams};
use crate::time::DateRange;
use bon::bon;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

pub const DEFAULT_COLLECTION: &str = "COPERNICUS/S2_SR";
pub const DEFAULT_CLOUD_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";
pub const DEFAULT_CLOUD_THRESHOLD: f64 = 30.0;
pub const DEFAULT_BANDS: [&str; 4] = ["B4", "B3", "B2", "B8"];
pub const RGB_BANDS: [&str; 3] = ["B4", "B3", "B2"];

/// The four corners of the default study area, `(lon, lat)`.
pub const DEFAULT_AOI: [(f64, f64); 4] = [
    (5.0376, 52.0542),
    (5.2254, 52.0542),
    (5.2254, 52.1323),
    (5.0376, 52.1323),
];

pub fn default_aoi() -> Result<Polygon, GeometryError> {
    Polygon::new(DEFAULT_AOI.to_vec())
}

/// A configured median-composite query over one area and period.
///
/// ```rust,no_run
/// # use s2_composite::{CompositePipeline, LocalCatalog, S2CompositeError};
/// # use s2_composite::pipeline::default_aoi;
/// # fn main() -> Result<(), S2CompositeError> {
/// # let catalog = LocalCatalog::new();
/// let pipeline = CompositePipeline::builder()
///     .aoi(default_aoi()?)
///     .cloud_threshold(20.0)
///     .build()?;
/// let report = pipeline.run(&catalog)?;
/// println!("{} scenes", report.filtered_count);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CompositePipeline {
    aoi: Polygon,
    collection: String,
    cloud_property: String,
    cloud_threshold: f64,
    bands: Vec<String>,
    date_range: DateRange,
    mask: MaskOptions,
}

#[bon]
impl CompositePipeline {
    /// # Builder Arguments
    ///
    /// * `aoi: Polygon` - The area of interest. Required.
    /// * `collection: String` - (Default: `"COPERNICUS/S2_SR"`) Collection to query.
    /// * `cloud_property: String` - (Default: `"CLOUDY_PIXEL_PERCENTAGE"`) Scene-level cloud cover property.
    /// * `cloud_threshold: f64` - (Default: `30.0`) Scenes need cloud cover strictly below this.
    /// * `bands: Vec<String>` - (Default: `B4, B3, B2, B8`) Bands kept after masking.
    /// * `start: NaiveDate` - (Default: `2019-05-01`) First day of the period.
    /// * `months: u32` - (Default: `5`) Length of the period in calendar months.
    /// * `mask: MaskOptions` - (Default: `SCL` band, scale `10000`) Cloud mask settings.
    ///
    /// # Errors
    ///
    /// Returns [`S2CompositeError::Time`] when the period is empty or out of range.
    #[builder]
    pub fn new(
        aoi: Polygon,
        #[builder(into, default = DEFAULT_COLLECTION.to_string())] collection: String,
        #[builder(into, default = DEFAULT_CLOUD_PROPERTY.to_string())] cloud_property: String,
        #[builder(default = DEFAULT_CLOUD_THRESHOLD)] cloud_threshold: f64,
        #[builder(default = DEFAULT_BANDS.iter().map(|b| b.to_string()).collect())]
        bands: Vec<String>,
        start: Option<NaiveDate>,
        #[builder(default = 5)] months: u32,
        #[builder(default)] mask: MaskOptions,
    ) -> Result<Self, S2CompositeError> {
        let date_range = match start {
            Some(start) => DateRange::starting_at(start, months)?,
            None => DateRange::from_ymd_plus_months(2019, 5, 1, months)?,
        };
        Ok(Self {
            aoi,
            collection,
            cloud_property,
            cloud_threshold,
            bands,
            date_range,
            mask,
        })
    }

    pub fn aoi(&self) -> &Polygon {
        &self.aoi
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    /// The collection restricted to the period, the AOI and the cloud threshold.
    pub fn filtered(&self, service: &impl ImageryService) -> Result<Collection, S2CompositeError> {
        Ok(service
            .collection(&self.collection)?
            .filter_date(self.date_range)
            .filter_bounds(&self.aoi)
            .filter_metadata(
                self.cloud_property.as_str(),
                FilterOp::LessThan,
                self.cloud_threshold,
            ))
    }

    /// [`CompositePipeline::filtered`], then clipped, cloud masked, reduced to the
    /// configured bands and sorted by acquisition time.
    pub fn prepared(&self, service: &impl ImageryService) -> Result<Collection, S2CompositeError> {
        Ok(self
            .filtered(service)?
            .clip(&self.aoi)
            .mask_clouds_with(self.mask.clone())
            .select(&self.bands)
            .sort(TIME_START, true))
    }

    pub fn composite(&self, service: &impl ImageryService) -> Result<Image, S2CompositeError> {
        self.prepared(service)?.reduce_median()
    }

    /// A map with the true-colour composite under the AOI outline, centred on the AOI.
    pub fn render(&self, service: &impl ImageryService) -> Result<MapHandle, S2CompositeError> {
        let composite = self.composite(service)?;
        self.render_composite(&composite)
    }

    fn render_composite(&self, composite: &Image) -> Result<MapHandle, S2CompositeError> {
        let rgb = VisParams::builder()
            .bands(RGB_BANDS.iter().map(|b| b.to_string()).collect())
            .min(0.0)
            .max(0.3)
            .build()?;
        let mut map = MapHandle::builder().build()?;
        map.add_layer(composite, &rgb, "RGB")?
            .add_layer(&self.aoi, &VisParams::default(), "AOI")?
            .center_on(&self.aoi);
        Ok(map)
    }

    /// Runs the whole query once and collects what it produced.
    pub fn run(&self, service: &impl ImageryService) -> Result<PipelineReport, S2CompositeError> {
        let filtered_count = self.filtered(service)?.size()?;
        info!(
            "{} scenes of {} match {} over the AOI",
            filtered_count, self.collection, self.date_range
        );
        let prepared = self.prepared(service)?;
        let fingerprint = prepared.describe().fingerprint()?;
        let composite = prepared.reduce_median()?;
        let map = self.render_composite(&composite)?;
        Ok(PipelineReport {
            filtered_count,
            date_range: self.date_range,
            fingerprint,
            composite,
            map,
        })
    }
}

/// The products of one [`CompositePipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub filtered_count: usize,
    pub date_range: DateRange,
    /// BLAKE3 of the prepared query description.
    pub fingerprint: String,
    pub composite: Image,
    pub map: MapHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandSummary {
    pub name: String,
    pub valid_pixels: usize,
    pub no_data_pixels: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f32>,
}

impl BandSummary {
    fn of(band: &crate::raster::Band) -> Self {
        let values: Vec<f32> = band
            .data
            .iter()
            .zip(band.mask.iter())
            .filter(|&(_, &valid)| valid)
            .map(|(&v, _)| v)
            .collect();
        let (min, max, mean) = if values.is_empty() {
            (None, None, None)
        } else {
            let min = values.iter().copied().fold(f32::INFINITY, f32::min);
            let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mean = values.iter().sum::<f32>() / values.len() as f32;
            (Some(min), Some(max), Some(mean))
        };
        Self {
            name: band.name.clone(),
            valid_pixels: values.len(),
            no_data_pixels: band.mask.len() - values.len(),
            min,
            max,
            mean,
        }
    }
}

/// The JSON form of a [`PipelineReport`], without pixel data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub filtered_count: usize,
    pub date_range: DateRange,
    pub fingerprint: String,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<BandSummary>,
    pub properties: Map<String, Value>,
}

impl PipelineReport {
    pub fn summary(&self) -> ReportSummary {
        let (height, width) = self.composite.dim();
        ReportSummary {
            filtered_count: self.filtered_count,
            date_range: self.date_range,
            fingerprint: self.fingerprint.clone(),
            width,
            height,
            bands: self.composite.bands().iter().map(BandSummary::of).collect(),
            properties: self.composite.properties().clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.summary())
    }
}
