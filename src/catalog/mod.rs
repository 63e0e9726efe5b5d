//! The imagery service seam and its local, snapshot-backed implementation.
pub mod error;
mod local;
mod scene;

pub use local::LocalCatalog;
pub use scene::{BandRecord, SceneRecord};

use crate::collection::Collection;
use error::ServiceError;
use serde::{Deserialize, Serialize};

/// Identifies the caller to an imagery service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub project: String,
}

impl Credentials {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }
}

/// A service that hosts named image collections.
///
/// Requests are blocking. A service must be authenticated before it hands out collections.
pub trait ImageryService {
    /// Opens a session for `credentials`.
    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), ServiceError>;

    fn is_authenticated(&self) -> bool;

    /// A lazy handle on the named collection, e.g. `COPERNICUS/S2_SR`.
    fn collection(&self, id: &str) -> Result<Collection, ServiceError>;
}
