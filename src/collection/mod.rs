//! Lazy, chainable image collections.
//!
//! A [`Collection`] is an immutable handle: every chain call returns a new handle with one
//! more pending operation, and nothing is evaluated until a terminal operation
//! ([`Collection::size`], [`Collection::images`], [`Collection::first`],
//! [`Collection::reduce_median`]) runs.
mod filter;
mod plan;

pub use filter::FilterOp;
pub use plan::{ImageFn, OperationDescription, QueryDescription, QueryError};

use crate::S2CompositeError;
use crate::geometry::Polygon;
use crate::processing::composite::median_composite;
use crate::processing::masking::{MaskOptions, mask_and_scale};
use crate::processing::spectral::{SpectralIndex, SpectralIndexCalculator};
use crate::raster::Image;
use crate::time::DateRange;
use filter::compare_values;
use plan::{Operation, validate};
use rayon::prelude::*;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Collection {
    id: String,
    scenes: Arc<[Arc<Image>]>,
    operations: Vec<Operation>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.id)
            .field("scenes", &self.scenes.len())
            .field("operations", &self.operations)
            .finish()
    }
}

impl Collection {
    /// A collection over in-memory scenes, with no pending operations.
    pub fn from_images(id: impl Into<String>, images: Vec<Image>) -> Self {
        Self::from_shared(id, images.into_iter().map(Arc::new).collect())
    }

    pub(crate) fn from_shared(id: impl Into<String>, scenes: Arc<[Arc<Image>]>) -> Self {
        Self {
            id: id.into(),
            scenes,
            operations: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn with(&self, operation: Operation) -> Self {
        let mut next = self.clone();
        next.operations.push(operation);
        next
    }

    /// Keeps scenes whose `system:time_start` lies in `range`.
    /// Scenes without an acquisition time are dropped.
    pub fn filter_date(&self, range: DateRange) -> Self {
        self.with(Operation::FilterDate(range))
    }

    /// Keeps scenes whose footprint intersects `aoi`.
    pub fn filter_bounds(&self, aoi: &Polygon) -> Self {
        self.with(Operation::FilterBounds(aoi.clone()))
    }

    /// Keeps scenes where `property <op> value` holds. Scenes missing the property are dropped.
    pub fn filter_metadata(
        &self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<Value>,
    ) -> Self {
        self.with(Operation::FilterMetadata {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    /// Masks every pixel outside `aoi`. Must come before [`Collection::mask_clouds`].
    pub fn clip(&self, aoi: &Polygon) -> Self {
        self.with(Operation::Clip(aoi.clone()))
    }

    /// Applies the classification-band cloud mask and reflectance scaling to every scene.
    pub fn mask_clouds(&self) -> Self {
        self.mask_clouds_with(MaskOptions::default())
    }

    pub fn mask_clouds_with(&self, options: MaskOptions) -> Self {
        self.with(Operation::MaskClouds(options))
    }

    /// Applies an arbitrary function to every scene. `name` identifies it in [`Collection::describe`].
    pub fn map<F>(&self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Image) -> Result<Image, S2CompositeError> + Send + Sync + 'static,
    {
        self.with(Operation::Map {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    /// Keeps only the listed bands, in order.
    pub fn select<S: AsRef<str>>(&self, bands: &[S]) -> Self {
        self.with(Operation::Select(
            bands.iter().map(|b| b.as_ref().to_string()).collect(),
        ))
    }

    /// Stable sort by a property. Every remaining scene must carry the property.
    pub fn sort(&self, field: impl Into<String>, ascending: bool) -> Self {
        self.with(Operation::Sort {
            field: field.into(),
            ascending,
        })
    }

    /// Adds spectral index bands to every scene.
    ///
    /// Generic names (`NIR`, `RED`, `BLUE`) resolve to the Sentinel-2 bands; entries in
    /// `band_map` override single names. `params` override index parameters such as `sigma`.
    pub fn spectral_indices(
        &self,
        indices: &[SpectralIndex],
        band_map: Option<HashMap<String, String>>,
        params: HashMap<String, f32>,
    ) -> Self {
        let calculator = match band_map {
            Some(overrides) => SpectralIndexCalculator::sentinel2().with_overrides(overrides),
            None => SpectralIndexCalculator::sentinel2(),
        };
        self.with(Operation::SpectralIndices {
            indices: indices.to_vec(),
            calculator,
            params,
        })
    }

    /// The serialisable query this handle stands for.
    pub fn describe(&self) -> QueryDescription {
        QueryDescription {
            collection: self.id.clone(),
            operations: self.operations.iter().map(Operation::describe).collect(),
        }
    }

    /// Number of scenes the query yields.
    ///
    /// When every pending operation is a filter, only the filter predicates run.
    /// Otherwise the whole chain is evaluated, since masking and `map` can change the
    /// properties a later filter reads. The ordering rules are checked either way.
    pub fn size(&self) -> Result<usize, S2CompositeError> {
        validate(&self.operations)?;
        let count = if self.operations.iter().all(Operation::is_filter) {
            self.scenes
                .iter()
                .filter(|scene| self.operations.iter().all(|op| keeps(op, scene)))
                .count()
        } else {
            self.evaluate()?.len()
        };
        info!("Collection {} holds {} scenes after filtering", self.id, count);
        Ok(count)
    }

    /// Evaluates every pending operation and returns the resulting scenes.
    pub fn images(&self) -> Result<Vec<Image>, S2CompositeError> {
        Ok(self
            .evaluate()?
            .into_iter()
            .map(Arc::unwrap_or_clone)
            .collect())
    }

    pub fn first(&self) -> Result<Option<Image>, S2CompositeError> {
        Ok(self.images()?.into_iter().next())
    }

    /// Evaluates the query and reduces it to a per-pixel median composite.
    pub fn reduce_median(&self) -> Result<Image, S2CompositeError> {
        let images = self.images()?;
        info!("Reducing {} scenes of {} to a median composite", images.len(), self.id);
        Ok(median_composite(&images)?)
    }

    fn evaluate(&self) -> Result<Vec<Arc<Image>>, S2CompositeError> {
        validate(&self.operations)?;
        let mut scenes: Vec<Arc<Image>> = self.scenes.to_vec();

        for operation in &self.operations {
            scenes = match operation {
                Operation::FilterDate(_)
                | Operation::FilterBounds(_)
                | Operation::FilterMetadata { .. } => scenes
                    .into_iter()
                    .filter(|s| keeps(operation, s))
                    .collect(),
                Operation::Clip(aoi) => scenes
                    .into_par_iter()
                    .map(|s| Arc::new(s.clip(aoi)))
                    .collect(),
                Operation::MaskClouds(options) => scenes
                    .into_par_iter()
                    .map(|s| Ok(Arc::new(mask_and_scale(&s, options)?)))
                    .collect::<Result<_, S2CompositeError>>()?,
                Operation::Map { func, .. } => scenes
                    .into_par_iter()
                    .map(|s| Ok(Arc::new(func(Arc::unwrap_or_clone(s))?)))
                    .collect::<Result<_, S2CompositeError>>()?,
                Operation::Select(bands) => scenes
                    .into_iter()
                    .map(|s| Ok(Arc::new(s.select(bands)?)))
                    .collect::<Result<_, S2CompositeError>>()?,
                Operation::Sort { field, ascending } => sort_scenes(scenes, field, *ascending)?,
                Operation::SpectralIndices {
                    indices,
                    calculator,
                    params,
                } => scenes
                    .into_par_iter()
                    .map(|s| Ok(Arc::new(calculator.add_indices(&s, indices, params)?)))
                    .collect::<Result<_, S2CompositeError>>()?,
            };
            debug!("{:?} -> {} scenes", operation, scenes.len());
        }
        Ok(scenes)
    }
}

fn keeps(operation: &Operation, scene: &Image) -> bool {
    match operation {
        Operation::FilterDate(range) => scene
            .time_start()
            .is_some_and(|t| range.contains_millis(t)),
        Operation::FilterBounds(aoi) => scene.footprint().intersects(aoi),
        Operation::FilterMetadata { field, op, value } => scene
            .property(field)
            .is_some_and(|property| op.matches(property, value)),
        _ => true,
    }
}

fn sort_scenes(
    mut scenes: Vec<Arc<Image>>,
    field: &str,
    ascending: bool,
) -> Result<Vec<Arc<Image>>, QueryError> {
    if let Some(missing) = scenes.iter().find(|s| s.property(field).is_none()) {
        return Err(QueryError::MissingSortProperty {
            field: field.to_string(),
            scene: missing.id().unwrap_or("<unnamed>").to_string(),
        });
    }
    scenes.sort_by(|a, b| {
        let ordering = match (a.property(field), b.property(field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        if ascending { ordering } else { ordering.reverse() }
    });
    Ok(scenes)
}
