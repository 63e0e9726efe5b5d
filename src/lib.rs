//! # S2 Composite
//!
//! Build cloud-masked Sentinel-2 median composites over an area of interest.
//!
//! The crate models a small, lazy query pipeline against an imagery service:
//! pick a collection, restrict it to a date range and an area of interest,
//! drop cloudy scenes, mask the remaining clouds, shadows and snow with the
//! scene classification band, then reduce the stack to a per-pixel median and
//! render it on a map.
//!
//! ## Key Features
//!
//! - **Lazy collections**: every chain call returns a new [`Collection`] handle; nothing is
//!   evaluated until a terminal operation such as [`Collection::size`] or
//!   [`Collection::reduce_median`] runs.
//! - **Cloud masking**: pixels are kept only when their scene classification code is 4, 5, 6 or 7.
//! - **Median compositing**: per-band, per-pixel median over valid pixels only. Pixels without
//!   any valid contributor stay no-data.
//! - **Spectral indices**: NDVI, EVI and kNDVI as extra bands.
//! - **Local service**: [`LocalCatalog`] evaluates queries over a frozen snapshot of scenes.
//! - **Map rendering**: [`MapHandle`] collects layers and writes a self-contained HTML page.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use s2_composite::{CompositePipeline, Credentials, ImageryService, LocalCatalog, Polygon};
//!
//! fn main() -> Result<(), s2_composite::S2CompositeError> {
//!     let mut catalog = LocalCatalog::from_dir("snapshots/s2_sr")?;
//!     catalog.authenticate(&Credentials::new("my-project"))?;
//!
//!     let aoi = Polygon::new(vec![
//!         (5.05, 52.05),
//!         (5.25, 52.05),
//!         (5.25, 52.15),
//!         (5.05, 52.15),
//!     ])?;
//!
//!     let pipeline = CompositePipeline::builder().aoi(aoi).build()?;
//!     println!("Scenes after filtering: {}", pipeline.filtered(&catalog)?.size()?);
//!
//!     let map = pipeline.render(&catalog)?;
//!     map.write_html("composite.html")?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod collection;
mod error;
pub mod geometry;
pub mod pipeline;
pub mod processing;
pub mod raster;
pub mod render;
pub mod time;

pub use catalog::{Credentials, ImageryService, LocalCatalog, SceneRecord};
pub use collection::{Collection, FilterOp, QueryDescription};
pub use error::S2CompositeError;
pub use geometry::{BoundingBox, Polygon};
pub use pipeline::{CompositePipeline, PipelineReport, ReportSummary};
pub use processing::composite::median_composite;
pub use processing::masking::{MaskOptions, is_valid_scl, mask_and_scale};
pub use processing::spectral::{SpectralIndex, SpectralIndexCalculator};
pub use raster::{Band, GeoTransform, Image};
pub use render::{Basemap, Layer, LayerSource, MapHandle, Renderable, VisParams};
pub use time::DateRange;
