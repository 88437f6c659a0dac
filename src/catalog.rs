//! Image catalog
//!
//! Processed results and their sources can be stored in a catalog keyed by
//! generated ids. [`ImageCatalog`] is the storage seam; [`MemoryCatalog`]
//! keeps everything in process memory.

use crate::error::{BgRemovalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Role of a stored image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Original,
    Processed,
    Edited,
}

/// Metadata recorded for a stored image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub kind: ImageKind,
    pub parent_id: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Caller supplied metadata
    pub metadata: serde_json::Value,
}

/// Key-value store for image bytes
pub trait ImageCatalog: Send + Sync {
    /// Store `bytes` and return the generated id
    ///
    /// # Errors
    /// - Unknown `parent_id`
    /// - Storage failures
    fn put(
        &self,
        bytes: Vec<u8>,
        name: &str,
        kind: ImageKind,
        parent_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<String>;

    /// Stored bytes for `id`, `None` when unknown
    ///
    /// # Errors
    /// - Storage failures
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;
}

struct StoredImage {
    bytes: Vec<u8>,
    entry: CatalogEntry,
}

/// In-memory catalog with uuid v4 ids
#[derive(Default)]
pub struct MemoryCatalog {
    images: RwLock<HashMap<String, StoredImage>>,
}

impl std::fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCatalog").field("len", &self.len()).finish()
    }
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.read().map(|images| images.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata for `id`
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<CatalogEntry> {
        let images = self.images.read().ok()?;
        images.get(id).map(|stored| stored.entry.clone())
    }

    /// Entries filtered by kind and parent, newest first
    #[must_use]
    pub fn list(&self, kind: Option<ImageKind>, parent_id: Option<&str>) -> Vec<CatalogEntry> {
        let Ok(images) = self.images.read() else {
            return Vec::new();
        };
        let mut entries: Vec<CatalogEntry> = images
            .values()
            .map(|stored| &stored.entry)
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .filter(|entry| parent_id.map_or(true, |p| entry.parent_id.as_deref() == Some(p)))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Remove `id` and, when `with_children`, every image derived from it
    ///
    /// Returns the number of images removed.
    pub fn delete(&self, id: &str, with_children: bool) -> Result<usize> {
        let mut images = self
            .images
            .write()
            .map_err(|_| BgRemovalError::internal("Catalog lock poisoned"))?;
        if images.remove(id).is_none() {
            return Ok(0);
        }

        let mut removed = 1;
        if with_children {
            let children: Vec<String> = images
                .values()
                .filter(|stored| stored.entry.parent_id.as_deref() == Some(id))
                .map(|stored| stored.entry.id.clone())
                .collect();
            for child in children {
                images.remove(&child);
                removed += 1;
            }
        }
        log::info!("Deleted {removed} image(s) starting at {id}");
        Ok(removed)
    }
}

impl ImageCatalog for MemoryCatalog {
    fn put(
        &self,
        bytes: Vec<u8>,
        name: &str,
        kind: ImageKind,
        parent_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<String> {
        let mut images = self
            .images
            .write()
            .map_err(|_| BgRemovalError::internal("Catalog lock poisoned"))?;

        if let Some(parent) = parent_id {
            if !images.contains_key(parent) {
                return Err(BgRemovalError::invalid_input(format!(
                    "Parent image '{parent}' does not exist"
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        let entry = CatalogEntry {
            id: id.clone(),
            name: name.to_string(),
            kind,
            parent_id: parent_id.map(str::to_string),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
        };
        images.insert(id.clone(), StoredImage { bytes, entry });
        log::debug!("Stored image {id} ({kind:?})");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let images = self
            .images
            .read()
            .map_err(|_| BgRemovalError::internal("Catalog lock poisoned"))?;
        Ok(images.get(id).map(|stored| stored.bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let catalog = MemoryCatalog::new();
        let id = catalog
            .put(vec![1, 2, 3], "photo.jpg", ImageKind::Original, None, None)
            .unwrap();

        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(catalog.get(&id).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(catalog.get("missing").unwrap(), None);

        let entry = catalog.entry(&id).unwrap();
        assert_eq!(entry.size_bytes, 3);
        assert_eq!(entry.metadata, serde_json::json!({}));
    }

    #[test]
    fn test_parent_must_exist() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .put(vec![0], "result.png", ImageKind::Processed, Some("nope"), None)
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_list_and_delete_children() {
        let catalog = MemoryCatalog::new();
        let parent = catalog
            .put(vec![0; 10], "a.jpg", ImageKind::Original, None, None)
            .unwrap();
        let metadata = serde_json::json!({ "strategy": "u2net" });
        catalog
            .put(vec![0; 5], "a.png", ImageKind::Processed, Some(&parent), Some(metadata.clone()))
            .unwrap();
        catalog
            .put(vec![0; 4], "b.jpg", ImageKind::Original, None, None)
            .unwrap();

        let processed = catalog.list(Some(ImageKind::Processed), None);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].metadata, metadata);
        assert_eq!(catalog.list(None, Some(&parent)).len(), 1);
        assert_eq!(catalog.list(None, None).len(), 3);

        assert_eq!(catalog.delete(&parent, true).unwrap(), 2);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.delete(&parent, true).unwrap(), 0);
    }
}
