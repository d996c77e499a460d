//! In-memory registry binding identifiers to stored files

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::{RelayError, RelayResult};
use crate::store::BlobStore;

/// Metadata for one stored upload
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Generated identifier, immutable after registration
    pub id: String,
    /// Filesystem location of the persisted bytes
    pub stored_path: PathBuf,
    /// Filename supplied by the uploading client
    pub original_name: String,
}

/// Shared relay state: the identifier registry plus the blob store
///
/// The registry lives only in memory. It is created empty at startup and
/// discarded at process exit; stored bytes stay on disk regardless.
#[derive(Clone)]
pub struct RelayState {
    /// Registered files mapped by identifier
    records: Arc<RwLock<HashMap<String, FileRecord>>>,
    /// Byte persistence
    store: BlobStore,
    /// Base URL used when constructing public file URLs
    base_url: String,
}

impl RelayState {
    /// Create new relay state
    ///
    /// # Arguments
    /// * `store` - Blob store for byte persistence
    /// * `base_url` - Base URL for generated links (e.g. http://localhost:3000)
    pub fn new(store: BlobStore, base_url: String) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the blob store
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Insert a fully formed record under its identifier
    ///
    /// The record becomes visible to lookups only once the insert completes;
    /// no I/O happens under the lock.
    ///
    /// # Errors
    /// Returns `RelayError::Conflict` if the identifier is already taken,
    /// which signals a generator collision rather than a normal condition.
    pub fn register(&self, record: FileRecord) -> RelayResult<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&record.id) {
            return Err(RelayError::Conflict(format!(
                "identifier {} is already registered",
                record.id
            )));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Look up a retrieval token
    ///
    /// The token may be a bare identifier or carry a decorative extension
    /// (`abc1234567.png`). Everything from the first `.` onward is discarded;
    /// identifiers themselves never contain a dot.
    pub fn resolve(&self, token: &str) -> Option<FileRecord> {
        let id = token.split('.').next().unwrap_or(token);
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(id).cloned()
    }

    /// Public URL for a stored file, with `extension` carrying its leading dot
    pub fn file_url(&self, id: &str, extension: &str) -> String {
        format!("{}/file/{}{}", self.base_url, id, extension)
    }

    /// Get count of registered files
    pub fn record_count(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.len()
    }
}

/// Infer a MIME type from the original filename's extension
///
/// Best-effort lookup that never fails: unknown or absent extensions fall
/// back to `application/octet-stream`.
pub fn content_type_for(original_name: &str) -> String {
    mime_guess::from_path(original_name)
        .first_or_octet_stream()
        .to_string()
}
