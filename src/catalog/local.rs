use super::error::ServiceError;
use super::scene::SceneRecord;
use super::{Credentials, ImageryService};
use crate::collection::Collection;
use crate::raster::Image;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// An imagery service backed by a frozen snapshot of scenes.
///
/// Scenes are grouped by their `collection` field. Within a collection they keep the
/// order they were loaded in; [`LocalCatalog::from_dir`] loads files sorted by name.
#[derive(Debug, Default)]
pub struct LocalCatalog {
    collections: BTreeMap<String, Vec<Arc<Image>>>,
    session: Option<Credentials>,
}

/// Checks if a directory entry is hidden (starts with '.').
fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.'))
}

fn is_scene_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl LocalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` scene file below `dir`, skipping hidden files and folders.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable directory, unreadable or malformed file, or
    /// scene whose bands do not match its declared size.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry?;
            if !is_scene_file(&entry) {
                continue;
            }
            debug!("Loading scene file {}", entry.path().display());
            catalog.insert_record(SceneRecord::read(entry.path())?)?;
        }

        for (id, scenes) in &catalog.collections {
            info!(
                "Loaded {} scenes for {} from {}",
                scenes.len(),
                id,
                dir.display()
            );
        }
        Ok(catalog)
    }

    pub fn from_records(records: Vec<SceneRecord>) -> Result<Self, ServiceError> {
        let mut catalog = Self::new();
        for record in records {
            catalog.insert_record(record)?;
        }
        Ok(catalog)
    }

    pub fn insert_record(&mut self, record: SceneRecord) -> Result<(), ServiceError> {
        let collection = record.collection.clone();
        let image = record.into_image()?;
        self.insert(collection, image);
        Ok(())
    }

    pub fn insert(&mut self, collection: impl Into<String>, image: Image) {
        self.collections
            .entry(collection.into())
            .or_default()
            .push(Arc::new(image));
    }

    pub fn collection_ids(&self) -> Vec<&str> {
        self.collections.keys().map(String::as_str).collect()
    }

    /// Writes each record as `<dir>/<id>.json`, creating `dir` when needed.
    pub fn write_snapshot(
        dir: impl AsRef<Path>,
        records: &[SceneRecord],
    ) -> Result<(), ServiceError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| ServiceError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        for record in records {
            record.write(&dir.join(format!("{}.json", record.id)))?;
        }
        Ok(())
    }
}

impl ImageryService for LocalCatalog {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), ServiceError> {
        if credentials.project.trim().is_empty() {
            return Err(ServiceError::InvalidCredentials(
                "project id must not be empty".to_string(),
            ));
        }
        info!("Authenticated local catalog for project {}", credentials.project);
        self.session = Some(credentials.clone());
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn collection(&self, id: &str) -> Result<Collection, ServiceError> {
        if !self.is_authenticated() {
            return Err(ServiceError::NotAuthenticated);
        }
        let scenes = self
            .collections
            .get(id)
            .ok_or_else(|| ServiceError::UnknownCollection(id.to_string()))?;
        Ok(Collection::from_shared(id, scenes.iter().cloned().collect()))
    }
}
