use thiserror::Error;

/// The primary error type for the s2-composite crate.
#[derive(Error, Debug)]
pub enum S2CompositeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialisation failed: {0}")]
    Json(#[from] serde_json::Error),

    // --- Custom Module Errors ---
    #[error("Invalid geometry: {0}")]
    Geometry(#[from] crate::geometry::GeometryError),

    #[error("Invalid date range: {0}")]
    Time(#[from] crate::time::error::TimeError),

    #[error("Image construction failed: {0}")]
    Raster(#[from] crate::raster::RasterError),

    #[error("Cloud masking failed: {0}")]
    Mask(#[from] crate::processing::error::MaskError),

    #[error("Median composite failed: {0}")]
    Composite(#[from] crate::processing::error::CompositeError),

    #[error("Spectral index computation failed: {0}")]
    Spectral(#[from] crate::processing::error::SpectralError),

    #[error("Query rejected: {0}")]
    Query(#[from] crate::collection::QueryError),

    #[error("Imagery service call failed: {0}")]
    Service(#[from] crate::catalog::error::ServiceError),

    #[error("Map rendering failed: {0}")]
    Render(#[from] crate::render::RenderError),
}
