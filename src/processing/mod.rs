//! Per-image and per-stack raster processing: cloud masking, median compositing and
//! spectral indices.
pub mod composite;
pub mod error;
pub mod masking;
pub mod spectral;
