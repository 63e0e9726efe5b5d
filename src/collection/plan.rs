//! Pending collection operations, their ordering rules and their serialisable description.

use super::filter::FilterOp;
use crate::S2CompositeError;
use crate::geometry::Polygon;
use crate::processing::masking::MaskOptions;
use crate::processing::spectral::{SpectralIndex, SpectralIndexCalculator};
use crate::raster::Image;
use crate::time::DateRange;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A per-image function applied by [`Collection::map`](super::Collection::map).
pub type ImageFn = Arc<dyn Fn(Image) -> Result<Image, S2CompositeError> + Send + Sync>;

#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error(
        "Cloud masking at step {step} needs band '{band}', but an earlier select kept only {kept:?}"
    )]
    MaskAfterSelect {
        step: usize,
        band: String,
        kept: Vec<String>,
    },

    #[error("Clipping at step {step} comes after cloud masking; clip before masking")]
    ClipAfterMask { step: usize },

    #[error("Cloud masking is applied twice (step {step}); scaling would be repeated")]
    MaskedTwice { step: usize },

    #[error("Cannot sort by '{field}': scene '{scene}' has no such property")]
    MissingSortProperty { field: String, scene: String },

    #[error("Unknown filter operator '{0}'")]
    UnknownOperator(String),
}

#[derive(Clone)]
pub(crate) enum Operation {
    FilterDate(DateRange),
    FilterBounds(Polygon),
    FilterMetadata {
        field: String,
        op: FilterOp,
        value: Value,
    },
    Clip(Polygon),
    MaskClouds(MaskOptions),
    Map {
        name: String,
        func: ImageFn,
    },
    Select(Vec<String>),
    Sort {
        field: String,
        ascending: bool,
    },
    SpectralIndices {
        indices: Vec<SpectralIndex>,
        calculator: SpectralIndexCalculator,
        params: HashMap<String, f32>,
    },
}

impl Operation {
    /// Filters only look at metadata and footprints; they never touch pixels.
    pub(crate) fn is_filter(&self) -> bool {
        matches!(
            self,
            Self::FilterDate(_) | Self::FilterBounds(_) | Self::FilterMetadata { .. }
        )
    }

    pub(crate) fn describe(&self) -> OperationDescription {
        match self {
            Self::FilterDate(range) => OperationDescription::FilterDate {
                start: range.start().to_string(),
                end: range.end().to_string(),
            },
            Self::FilterBounds(aoi) => OperationDescription::FilterBounds {
                aoi: aoi.vertices().to_vec(),
            },
            Self::FilterMetadata { field, op, value } => OperationDescription::FilterMetadata {
                field: field.clone(),
                op: *op,
                value: value.clone(),
            },
            Self::Clip(aoi) => OperationDescription::Clip {
                aoi: aoi.vertices().to_vec(),
            },
            Self::MaskClouds(options) => OperationDescription::MaskClouds {
                scl_band: options.scl_band().to_string(),
                scale: options.scale(),
            },
            Self::Map { name, .. } => OperationDescription::Map { name: name.clone() },
            Self::Select(bands) => OperationDescription::Select {
                bands: bands.clone(),
            },
            Self::Sort { field, ascending } => OperationDescription::Sort {
                field: field.clone(),
                ascending: *ascending,
            },
            Self::SpectralIndices {
                indices,
                calculator,
                params,
            } => OperationDescription::SpectralIndices {
                indices: indices.clone(),
                bands: indices
                    .iter()
                    .flat_map(|index| index.inputs().iter())
                    .map(|generic| (generic.to_string(), calculator.resolve(generic).to_string()))
                    .collect(),
                params: params.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            },
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.describe())
    }
}

/// Checks the ordering rules of a chain of operations.
///
/// * Cloud masking needs the classification band, so it may not follow a `select`
///   that dropped it.
/// * Clipping must happen before masking.
/// * Masking rescales values, so it may only run once.
pub(crate) fn validate(operations: &[Operation]) -> Result<(), QueryError> {
    let mut kept: Option<&[String]> = None;
    let mut masked = false;

    for (step, operation) in operations.iter().enumerate() {
        match operation {
            Operation::Select(bands) => kept = Some(bands.as_slice()),
            Operation::MaskClouds(options) => {
                if masked {
                    return Err(QueryError::MaskedTwice { step });
                }
                if let Some(bands) = kept {
                    if !bands.iter().any(|b| b == options.scl_band()) {
                        return Err(QueryError::MaskAfterSelect {
                            step,
                            band: options.scl_band().to_string(),
                            kept: bands.to_vec(),
                        });
                    }
                }
                masked = true;
            }
            Operation::Clip(_) if masked => return Err(QueryError::ClipAfterMask { step }),
            _ => {}
        }
    }
    Ok(())
}

/// Serialisable form of one operation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationDescription {
    FilterDate {
        start: String,
        end: String,
    },
    FilterBounds {
        aoi: Vec<(f64, f64)>,
    },
    FilterMetadata {
        field: String,
        op: FilterOp,
        value: Value,
    },
    Clip {
        aoi: Vec<(f64, f64)>,
    },
    MaskClouds {
        scl_band: String,
        scale: f32,
    },
    Map {
        name: String,
    },
    Select {
        bands: Vec<String>,
    },
    Sort {
        field: String,
        ascending: bool,
    },
    SpectralIndices {
        indices: Vec<SpectralIndex>,
        bands: BTreeMap<String, String>,
        params: BTreeMap<String, f32>,
    },
}

/// The full query a collection handle stands for: where it starts and what is applied.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescription {
    pub collection: String,
    pub operations: Vec<OperationDescription>,
}

impl QueryDescription {
    /// BLAKE3 hex digest of the JSON form. Equal queries give equal fingerprints.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, self)?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}
