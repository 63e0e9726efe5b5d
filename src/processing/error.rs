use crate::raster::RasterError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MaskError {
    #[error("Scene '{scene}' has no classification band '{band}'")]
    MissingClassificationBand { scene: String, band: String },

    #[error("Reflectance scale must be a positive finite number, got {0}")]
    InvalidScale(f32),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

#[derive(Error, Debug, PartialEq)]
pub enum CompositeError {
    #[error("Cannot reduce an empty collection")]
    EmptyCollection,

    #[error("Image {index} is not on the same pixel grid as the first image")]
    GridMismatch { index: usize },

    #[error("Image {index} has bands {found:?}, expected {expected:?}")]
    BandMismatch {
        index: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error(transparent)]
    Raster(#[from] RasterError),
}

#[derive(Error, Debug, PartialEq)]
pub enum SpectralError {
    #[error("Unknown spectral index '{0}'")]
    UnknownIndex(String),

    #[error("Index {index} needs band '{band}' which the image does not have")]
    MissingBand { index: String, band: String },

    #[error(transparent)]
    Raster(#[from] RasterError),
}
